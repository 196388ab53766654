mod excerpt;
mod extractor;
mod rules;

pub use excerpt::{collapse_whitespace, truncate_with_ellipsis};
pub use extractor::Extractor;
pub use rules::{parse_count, ExtractRules};
