use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{Extracted, TopicDetail};

use super::excerpt::{collapse_whitespace, truncate_with_ellipsis};
use super::rules::{parse_count, ExtractRules};

/// Pulls the import link, excerpt, author and usage badge out of a topic's
/// opening post.
pub struct Extractor {
    rules: ExtractRules,
    import_base: Url,
    anchor: Selector,
    bare_link: Regex,
    uses: Vec<Regex>,
}

impl Extractor {
    pub fn new(rules: ExtractRules) -> Result<Self> {
        let import_base = Url::parse(&rules.import_host)
            .map_err(|e| AppError::Config(format!("import host {:?}: {e}", rules.import_host)))?;
        let anchor = Selector::parse("a[href]").map_err(|e| AppError::Config(e.to_string()))?;
        let bare_link = Regex::new(&format!(
            r#"https?://[^\s"'<>)]*{}[^\s"'<>)]*"#,
            regex::escape(&rules.import_path_fragment)
        ))
        .map_err(|e| AppError::Config(e.to_string()))?;
        let uses = rules
            .uses_patterns
            .iter()
            .map(|p| Regex::new(p).map_err(|e| AppError::Config(format!("uses pattern {p:?}: {e}"))))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            rules,
            import_base,
            anchor,
            bare_link,
            uses,
        })
    }

    /// Returns `None` when the post carries no import link: such a topic is not a blueprint.
    pub fn extract(&self, detail: &TopicDetail) -> Option<Extracted> {
        let cooked = detail.cooked();
        let fragment = Html::parse_fragment(cooked);

        let text = fragment.root_element().text().collect::<Vec<_>>().join(" ");

        let links = self.import_links(&fragment, &text);
        let import_url = links.first()?.clone();

        let excerpt = truncate_with_ellipsis(&collapse_whitespace(&text), self.rules.excerpt_max_len);

        let author = detail
            .created_by()
            .or_else(|| detail.first_post().and_then(|p| p.username.as_deref()))
            .unwrap_or_default()
            .to_string();

        Some(Extracted {
            import_url,
            import_count: links.len(),
            excerpt,
            author,
            uses: self.scan_uses(cooked),
        })
    }

    /// Plain-text excerpt of arbitrary cooked HTML.
    pub fn excerpt(&self, cooked: &str) -> String {
        let fragment = Html::parse_fragment(cooked);
        let text = fragment.root_element().text().collect::<Vec<_>>().join(" ");
        truncate_with_ellipsis(&collapse_whitespace(&text), self.rules.excerpt_max_len)
    }

    /// Distinct import links in document order: anchors first, then bare URLs
    /// in the text that were never linkified.
    fn import_links(&self, fragment: &Html, text: &str) -> Vec<String> {
        let mut links: Vec<String> = Vec::new();
        let mut push = |link: String| {
            if !links.contains(&link) {
                links.push(link);
            }
        };

        for element in fragment.select(&self.anchor) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            if href.contains(&self.rules.import_path_fragment) {
                if let Some(resolved) = self.resolve(href) {
                    push(resolved);
                }
            }
        }
        for m in self.bare_link.find_iter(text) {
            push(m.as_str().to_string());
        }

        links
    }

    fn resolve(&self, href: &str) -> Option<String> {
        let href = href.trim();
        if href.starts_with("http://") || href.starts_with("https://") {
            return Some(href.to_string());
        }
        self.import_base.join(href).ok().map(|u| u.to_string())
    }

    fn scan_uses(&self, cooked: &str) -> Option<i64> {
        self.uses.iter().find_map(|re| {
            re.captures(cooked)
                .and_then(|cap| cap.get(1))
                .and_then(|m| parse_count(m.as_str()))
        })
    }
}
