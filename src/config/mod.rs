use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub postgres: PostgresConfig,
    pub redis: RedisConfig,
    pub recommendation: RecommendationConfig,
    pub content: ContentConfig,
    pub training: TrainingConfig,
    pub business_rules: BusinessRuleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        // An unparsable host falls back to all interfaces rather than aborting startup
        let ip = self
            .host
            .parse::<IpAddr>()
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        SocketAddr::new(ip, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    pub ttl_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationConfig {
    pub top_n: usize,
    pub low_activity_threshold: f64,
    pub high_activity_threshold: f64,
    pub min_cf_weight: f64,
    pub max_cf_weight: f64,
    pub popularity_cap_quantile: f64,
    pub popularity_penalty_quantile: f64,
    pub popularity_penalty: f64,
    pub jitter: f64,
    pub max_per_category: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentConfig {
    pub max_df: f64,
    pub min_df: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteAggregation {
    Mean,
    Sum,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub latent_factors: usize,
    pub random_seed: u64,
    pub retrain_interval_secs: u64,
    pub rebuild_timeout_secs: u64,
    pub vote_aggregation: VoteAggregation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessRuleConfig {
    pub dietary_penalty: f64,
    pub promotion_boost: f64,
    pub low_stock_threshold: f64,
    pub low_stock_penalty: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 5000,
                workers: num_cpus::get(),
            },
            postgres: PostgresConfig {
                url: "postgresql://localhost:5432/menurec".to_string(),
                max_connections: 10,
            },
            redis: RedisConfig {
                url: "redis://localhost:6379".to_string(),
                ttl_seconds: 3600,
            },
            recommendation: RecommendationConfig::default(),
            content: ContentConfig::default(),
            training: TrainingConfig::default(),
            business_rules: BusinessRuleConfig::default(),
        }
    }
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            top_n: 10,
            low_activity_threshold: 5.0,
            high_activity_threshold: 20.0,
            min_cf_weight: 0.3,
            max_cf_weight: 0.7,
            popularity_cap_quantile: 0.8,
            popularity_penalty_quantile: 0.6,
            popularity_penalty: 0.7,
            jitter: 0.3,
            max_per_category: 2,
        }
    }
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            max_df: 0.8,
            min_df: 2,
        }
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            latent_factors: 50,
            random_seed: 42,
            retrain_interval_secs: 600,
            rebuild_timeout_secs: 300,
            vote_aggregation: VoteAggregation::Mean,
        }
    }
}

impl Default for BusinessRuleConfig {
    fn default() -> Self {
        Self {
            dietary_penalty: 0.5,
            promotion_boost: 1.0,
            low_stock_threshold: 5.0,
            low_stock_penalty: 0.5,
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let defaults = config::Config::try_from(&Config::default())?;
        let settings = config::Config::builder()
            .add_source(defaults)
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("MENUREC").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Loads `path` when it exists, otherwise the built-in defaults.
    pub fn load_or_default(path: &str) -> anyhow::Result<Self> {
        if std::path::Path::new(path).exists() {
            Self::from_file(path)
        } else {
            tracing::info!("Config file {} not found, using default configuration", path);
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_ranking_contract() {
        let config = Config::default();
        assert_eq!(config.recommendation.top_n, 10);
        assert!(config.server.workers >= 1);
        assert_eq!(config.training.random_seed, 42);
        assert_eq!(config.training.latent_factors, 50);
        assert_eq!(config.business_rules.low_stock_threshold, 5.0);
        assert_eq!(config.training.vote_aggregation, VoteAggregation::Mean);
    }

    #[test]
    fn test_socket_addr_falls_back_on_bad_host() {
        let server = ServerConfig {
            host: "not-an-ip".to_string(),
            port: 8080,
            workers: 1,
        };
        assert_eq!(server.socket_addr().port(), 8080);
        assert!(server.socket_addr().ip().is_unspecified());
    }
}
