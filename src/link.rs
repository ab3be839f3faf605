//! Shared-link extraction for chat messages.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::LazyLock;
use url::Url;

// Constant pattern; `test_url_pattern_compiles` forces it to build.
static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https?://\S+").expect("URL pattern is valid")
});

/// Characters that chat clients commonly leave glued to the end of a pasted link
const TRAILING_JUNK: &[char] = &['"', '\'', ',', '`', ' '];

/// Content platform a shared link points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Toutiao,
    Baijiahao,
    Unknown,
}

impl Platform {
    /// Classify by case-insensitive substring match on the URL
    pub fn classify(url: &str) -> Self {
        let url = url.to_ascii_lowercase();
        if url.contains("toutiao") {
            Self::Toutiao
        } else if url.contains("baidu.com") {
            Self::Baijiahao
        } else {
            Self::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Toutiao => "toutiao",
            Self::Baijiahao => "baijiahao",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// First http(s) URL in `text`, with trailing punctuation trimmed
pub fn extract_url(text: &str) -> Option<&str> {
    URL_PATTERN
        .find(text)
        .map(|m| m.as_str().trim_end_matches(TRAILING_JUNK))
        .filter(|url| !url.is_empty())
}

/// Keep scheme, host and path; drop the query string and fragment.
///
/// The kept part is returned exactly as written: no trailing slash is added
/// to an empty path and the host and percent-encoding are not rewritten.
/// Input that does not parse as a URL is returned unchanged.
pub fn strip_query(url: &str) -> String {
    if Url::parse(url).is_err() {
        return url.to_string();
    }
    match url.find(['?', '#']) {
        Some(end) => url[..end].to_string(),
        None => url.to_string(),
    }
}

/// A link found in a chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedLink {
    pub original: String,
    pub filtered: String,
    pub platform: Platform,
}

impl SharedLink {
    pub fn from_url(url: &str) -> Self {
        let filtered = strip_query(url);
        let platform = Platform::classify(&filtered);
        Self {
            original: url.to_string(),
            filtered,
            platform,
        }
    }

    pub fn from_text(text: &str) -> Option<Self> {
        extract_url(text).map(Self::from_url)
    }

    /// Link attached to an interactive message, from its `card_link.url`
    pub fn from_card_content(content: &Value) -> Option<Self> {
        content
            .pointer("/card_link/url")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(Self::from_url)
    }
}
