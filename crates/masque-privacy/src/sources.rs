//! Allowed-website matching for ingested documents.
//!
//! An entry is either a full URL (`https://example.com/docs`) or a bare
//! `domain[/path-prefix]` (`example.com/docs`). A source matches when its
//! authority equals the entry's and its path starts with the entry's path
//! prefix.

use url::Url;

/// One parsed `allowed_websites` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedSite {
    domain: String,
    path: String,
}

impl AllowedSite {
    /// Parse a single entry. Returns `None` for an empty entry or an
    /// unparseable URL.
    #[must_use]
    pub fn parse(entry: &str) -> Option<Self> {
        let entry = entry.trim();
        if entry.is_empty() {
            return None;
        }

        if entry.starts_with("http://") || entry.starts_with("https://") {
            let url = Url::parse(entry).ok()?;
            return Some(Self {
                domain: authority(&url)?,
                path: url.path().to_string(),
            });
        }

        let (domain, path) = match entry.split_once('/') {
            Some((domain, rest)) => (domain, format!("/{rest}")),
            None => (entry, String::new()),
        };
        if domain.is_empty() {
            return None;
        }
        Some(Self {
            domain: domain.to_ascii_lowercase(),
            path,
        })
    }

    /// Domain (with port, when explicit) the entry applies to.
    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Path prefix; empty matches every path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether `source` falls under this entry.
    #[must_use]
    pub fn matches(&self, source: &Url) -> bool {
        authority(source).is_some_and(|domain| domain == self.domain)
            && source.path().starts_with(&self.path)
    }
}

/// Parse every entry of a comma-separated list, skipping invalid ones.
#[must_use]
pub fn parse_allowed_sites<'a>(entries: impl IntoIterator<Item = &'a str>) -> Vec<AllowedSite> {
    entries
        .into_iter()
        .filter_map(|entry| {
            let site = AllowedSite::parse(entry);
            if site.is_none() {
                tracing::warn!(entry, "Ignoring invalid allowed website entry");
            }
            site
        })
        .collect()
}

/// Whether the document `source` is covered by any of `sites`.
///
/// Sources that are not absolute URLs with a host (file names, opaque ids)
/// never match.
#[must_use]
pub fn is_allowed_source(sites: &[AllowedSite], source: &str) -> bool {
    if sites.is_empty() || source.is_empty() {
        return false;
    }
    let Ok(url) = Url::parse(source) else {
        return false;
    };
    sites.iter().any(|site| site.matches(&url))
}

/// `host[:port]` of a URL.
fn authority(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}
