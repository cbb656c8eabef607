pub mod business_rules;
pub mod cache;
pub mod feature_store;
pub mod recommendation;
pub mod snapshot;
pub mod training;
