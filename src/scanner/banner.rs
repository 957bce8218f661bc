// Greeting parsing and the banner fast path
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::scanner::signatures::parse_lines;

const BUILTIN_BANNERS: &str = include_str!("../../data/banners.txt");
const SERVICE_READY: &str = "220";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Banner {
    pub raw: String,
    pub software: String,
    pub version: String,
}

impl Banner {
    /// Splits `220 <software> <version> ...` into its first two fields after
    /// the reply code. Wrapping `()` or `[]` around a field is dropped, so
    /// `220 (vsFTPd 3.0.3)` yields `vsFTPd` / `3.0.3`. Any other reply code
    /// leaves both tokens empty.
    pub fn parse(greeting: &str) -> Self {
        let mut fields = greeting.split_whitespace();
        let is_ready = fields.next() == Some(SERVICE_READY);

        let (software, version) = if is_ready {
            (
                fields.next().map(strip_brackets).unwrap_or_default(),
                fields.next().map(strip_brackets).unwrap_or_default(),
            )
        } else {
            (String::new(), String::new())
        };

        Self {
            raw: greeting.trim_end().to_string(),
            software,
            version,
        }
    }

    /// `software` and `version` concatenated without a separator.
    pub fn key(&self) -> String {
        format!("{}{}", self.software, self.version)
    }
}

fn strip_brackets(field: &str) -> String {
    field
        .trim_start_matches(|c| c == '(' || c == '[')
        .trim_end_matches(|c| c == ')' || c == ']')
        .to_string()
}

/// Known `software+version` banner strings.
#[derive(Debug, Clone)]
pub struct BannerMatcher {
    entries: Vec<String>,
}

impl BannerMatcher {
    pub fn new(entries: Vec<String>) -> Self {
        Self { entries }
    }

    pub fn builtin() -> Self {
        Self::new(parse_lines(BUILTIN_BANNERS))
    }

    /// Case-insensitive exact match of the banner key against the list.
    pub fn find(&self, banner: &Banner) -> Option<&str> {
        let key = banner.key();
        if key.is_empty() {
            return None;
        }
        debug!("matching banner key {}", key);
        let hit = self
            .entries
            .iter()
            .find(|entry| entry.eq_ignore_ascii_case(&key))
            .map(String::as_str);
        if let Some(entry) = hit {
            info!("FTP server running: {}", entry);
        }
        hit
    }
}
