//! Caption assembly: lead-in text, read-more link, and hashtags.

use itertools::Itertools;
use std::fmt;

/// Base vocabulary followed by one `#category` per feed category, in feed
/// order. Repeats are kept.
pub fn generate_hashtags(base: &[String], categories: &[String]) -> Vec<String> {
    base.iter()
        .cloned()
        .chain(categories.iter().map(|c| format!("#{c}")))
        .collect()
}

/// A post caption. Rendered with [`fmt::Display`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caption {
    pub lead: String,
    pub link: String,
    pub hashtags: Vec<String>,
}

impl Caption {
    pub fn new(lead: String, link: &str, base: &[String], categories: &[String]) -> Self {
        Self {
            lead,
            link: link.to_string(),
            hashtags: generate_hashtags(base, categories),
        }
    }
}

impl fmt::Display for Caption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\n\nRead more: {}\n\n{}",
            self.lead,
            self.link,
            self.hashtags.iter().join(" ")
        )
    }
}
