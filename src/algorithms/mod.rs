pub mod content;
pub mod diversity;
pub mod factorization;
pub mod initializer;
pub mod interaction;
pub mod similarity;
pub mod tfidf;

pub use content::{build_documents, ContentDocument};
pub use factorization::LatentFactors;
pub use interaction::InteractionMatrix;
pub use similarity::ContentModel;
