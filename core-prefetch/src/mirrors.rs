//! Page image mirrors.
//!
//! Templates contain a `{n}` placeholder for the page number. Each page is
//! tried against the primary mirror, then the secondary, then the primary
//! again with a `cb` query parameter that changes every minute so stale
//! intermediary caches are bypassed.

use serde::{Deserialize, Serialize};

pub const PAGE_PLACEHOLDER: &str = "{n}";

pub const DEFAULT_PRIMARY_MIRROR: &str =
    "https://cdn.jsdelivr.net/gh/assadig3/quran-pages@main/pages/page_{n}.webp";

pub const DEFAULT_SECONDARY_MIRROR: &str =
    "https://raw.githubusercontent.com/assadig3/quran-pages/main/pages/page_{n}.webp";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorSet {
    pub primary: String,

    #[serde(default)]
    pub secondary: Option<String>,

    /// Append a last attempt against the primary with `?cb=<unix minutes>`.
    #[serde(default = "default_cache_bust")]
    pub cache_bust: bool,
}

fn default_cache_bust() -> bool {
    true
}

impl Default for MirrorSet {
    fn default() -> Self {
        Self {
            primary: DEFAULT_PRIMARY_MIRROR.to_string(),
            secondary: Some(DEFAULT_SECONDARY_MIRROR.to_string()),
            cache_bust: true,
        }
    }
}

impl MirrorSet {
    pub fn new(primary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            secondary: None,
            cache_bust: true,
        }
    }

    pub fn with_secondary(mut self, template: impl Into<String>) -> Self {
        self.secondary = Some(template.into());
        self
    }

    pub fn with_cache_bust(mut self, enabled: bool) -> Self {
        self.cache_bust = enabled;
        self
    }

    /// URLs to try for `page`, in order.
    pub fn urls_for(&self, page: u32, unix_minutes: i64) -> Vec<String> {
        let primary = fill(&self.primary, page);

        let mut urls = Vec::with_capacity(3);
        urls.push(primary.clone());
        if let Some(secondary) = &self.secondary {
            urls.push(fill(secondary, page));
        }
        if self.cache_bust {
            let separator = if primary.contains('?') { '&' } else { '?' };
            urls.push(format!("{primary}{separator}cb={unix_minutes}"));
        }
        urls
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.primary.contains(PAGE_PLACEHOLDER) {
            return Err(format!(
                "primary mirror '{}' has no {PAGE_PLACEHOLDER} placeholder",
                self.primary
            ));
        }

        if let Some(secondary) = &self.secondary {
            if !secondary.contains(PAGE_PLACEHOLDER) {
                return Err(format!(
                    "secondary mirror '{secondary}' has no {PAGE_PLACEHOLDER} placeholder"
                ));
            }
        }

        Ok(())
    }
}

fn fill(template: &str, page: u32) -> String {
    template.replace(PAGE_PLACEHOLDER, &page.to_string())
}
