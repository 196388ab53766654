//! Pattern set used by the extractor. Everything here is best effort and kept
//! as data so it can be revised when the forum's markup drifts.

use crate::config::ExtractConfig;

pub const IMPORT_PATH_FRAGMENT: &str = "/redirect/blueprint_import";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractRules {
    /// Path fragment identifying a blueprint import deep-link.
    pub import_path_fragment: String,
    /// Host that relative import links are resolved against.
    pub import_host: String,
    pub excerpt_max_len: usize,
    /// Regexes whose first capture group is a (possibly suffixed) usage count.
    pub uses_patterns: Vec<String>,
}

impl Default for ExtractRules {
    fn default() -> Self {
        Self::from_config(&ExtractConfig::default())
    }
}

impl ExtractRules {
    pub fn from_config(config: &ExtractConfig) -> Self {
        Self {
            import_path_fragment: IMPORT_PATH_FRAGMENT.to_string(),
            import_host: config.import_host.clone(),
            excerpt_max_len: config.excerpt_max_len,
            uses_patterns: vec![
                r#"(?i)data-users\s*=\s*["']?([0-9][0-9.,]*\s*[km]?)"#.to_string(),
                r#"(?i)class\s*=\s*["'][^"']*\b(?:install-count|import-count|users-count)\b[^"']*["'][^>]*>\s*([0-9][0-9.,]*\s*[km]?)\s*<"#.to_string(),
                r"(?i)\b([0-9][0-9.,]*\s*[km]?)\s+(?:users|uses|installs)\b".to_string(),
            ],
        }
    }
}

/// Parses counts like `1,234`, `1.2k` or `3M`. Returns `None` for anything else.
pub fn parse_count(raw: &str) -> Option<i64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',' && *c != '_')
        .collect::<String>()
        .to_ascii_lowercase();

    let (number, multiplier) = match cleaned.chars().last()? {
        'k' => (&cleaned[..cleaned.len() - 1], 1_000.0),
        'm' => (&cleaned[..cleaned.len() - 1], 1_000_000.0),
        _ => (cleaned.as_str(), 1.0),
    };

    let value: f64 = number.parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    Some((value * multiplier).round() as i64)
}
