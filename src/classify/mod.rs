mod classifier;
mod taxonomy;

pub use classifier::Classifier;
pub use taxonomy::{BucketRule, FallbackRule, Taxonomy, OTHER_BUCKET};
