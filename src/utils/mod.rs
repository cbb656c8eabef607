use crate::models::Recommendation;
use std::collections::HashSet;

pub mod validation;

/// Distinct category labels over list length; 0 for lists shorter than two.
pub fn category_diversity(recommendations: &[Recommendation]) -> f64 {
    if recommendations.len() <= 1 {
        return 0.0;
    }
    let categories: HashSet<&str> = recommendations.iter().map(|r| r.category.as_str()).collect();
    categories.len() as f64 / recommendations.len() as f64
}

pub async fn retry_with_backoff<F, Fut, T, E>(
    mut operation: F,
    max_retries: usize,
    initial_delay: std::time::Duration,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut delay = initial_delay;
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if attempt < max_retries => {
                attempt += 1;
                tracing::warn!("Operation failed (attempt {}), retrying in {:?}: {}", attempt, delay, e);
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(e) => return Err(e),
        }
    }
}
