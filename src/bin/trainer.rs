use anyhow::Result;
use clap::Parser;
use menurec::utils::category_diversity;
use menurec::{init_tracing, AppState, Config, RankOutcome, RecommendationResponse, UserId};
use tracing::{info, warn};

/// Builds a model snapshot once from Postgres and optionally ranks users.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "config/default.toml")]
    config: String,

    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Users to rank after training; results are printed as JSON.
    #[arg(short, long, value_delimiter = ',')]
    users: Vec<UserId>,

    /// Persist the generated rankings to the recommendation store.
    #[arg(long)]
    store: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    std::env::set_var("RUST_LOG", &args.log_level);
    init_tracing();

    info!("Starting menurec trainer");

    let config = Config::load_or_default(&args.config)?;
    info!("Training configuration: {:?}", config.training);

    let state = AppState::new(config).await?;
    let outcome = state.training_service.refresh_models().await?;
    info!("Snapshot version {} built", outcome.version());

    let summary = state.snapshots.current().summary();
    println!("{}", serde_json::to_string_pretty(&summary)?);

    for user_id in args.users {
        let ranked = if args.store {
            state.recommendation_service.generate_and_store(user_id).await?
        } else {
            state.recommendation_service.rank(user_id).await
        };

        match ranked {
            RankOutcome::Ranked(items) => {
                info!(
                    "User {}: {} items, category diversity {:.2}",
                    user_id,
                    items.len(),
                    category_diversity(&items)
                );
                let response = RecommendationResponse::new(user_id, items);
                println!("{}", serde_json::to_string_pretty(&response)?);
            }
            RankOutcome::Empty => warn!("User {}: no recommendations survived filtering", user_id),
            RankOutcome::Unavailable(reason) => warn!("User {}: {}", user_id, reason),
        }
    }

    Ok(())
}
