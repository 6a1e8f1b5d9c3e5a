use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::{Config, ProxySettings};
use crate::providers::http_errors::api_request_error;
use crate::providers::proxy::ProxyLease;
use crate::providers::{PaperEntry, PaperLink, PaperSource, ProviderFuture};

const SERVICE: &str = "arXiv API";
const URL_SETTING: &str = "ARXIV_API_URL";

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    #[serde(default)]
    title: Option<String>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: String,
    #[serde(rename = "@type", default)]
    content_type: Option<String>,
}

/// Search parameters for the single most relevant match of an id.
fn search_params(identifier: &str) -> Vec<(&'static str, String)> {
    vec![
        ("search_query", format!("id_list=\"{identifier}\"")),
        ("sortBy", "relevance".to_string()),
        ("sortOrder", "descending".to_string()),
        ("start", "0".to_string()),
        ("max_results", "1".to_string()),
    ]
}

fn parse_first_entry(feed_xml: &str) -> Result<Option<PaperEntry>> {
    let feed: AtomFeed =
        quick_xml::de::from_str(feed_xml).context("Failed to parse arXiv Atom feed")?;
    Ok(feed.entries.into_iter().next().map(|entry| PaperEntry {
        title: entry
            .title
            .map(|title| title.split_whitespace().collect::<Vec<_>>().join(" ")),
        links: entry
            .links
            .into_iter()
            .map(|link| PaperLink {
                href: link.href,
                content_type: link.content_type,
            })
            .collect(),
    }))
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

/// arXiv export API client. Every request runs inside its own proxy lease.
pub struct ArxivClient {
    api_url: String,
    proxy: ProxySettings,
    connect_timeout_secs: u64,
}

impl ArxivClient {
    pub fn new(api_url: impl Into<String>, proxy: ProxySettings, connect_timeout_secs: u64) -> Self {
        Self {
            api_url: api_url.into(),
            proxy,
            connect_timeout_secs,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(
            cfg.arxiv_api_url.clone(),
            cfg.proxy.clone(),
            cfg.model_connect_timeout_secs,
        )
    }

    async fn search(&self, identifier: &str) -> Result<Option<PaperEntry>> {
        let lease = ProxyLease::acquire(&self.proxy, self.connect_timeout_secs, "arxiv search")?;
        debug!(
            api_url = %self.api_url,
            arxiv_id = %identifier,
            proxied = lease.is_proxied(),
            "searching arXiv"
        );

        let response = lease
            .client()
            .get(&self.api_url)
            .query(&search_params(identifier))
            .send()
            .await
            .map_err(|err| {
                warn!(api_url = %self.api_url, error = %err, "arXiv search failed");
                api_request_error(
                    err,
                    SERVICE,
                    &self.api_url,
                    URL_SETTING,
                    self.connect_timeout_secs,
                )
            })?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(anyhow!("arXiv search failed with status {}", status));
        }

        let body = response
            .text()
            .await
            .context("Failed to read arXiv search response")?;
        let entry = parse_first_entry(&body)?;
        if entry.is_none() {
            info!(arxiv_id = %identifier, "arXiv search returned no entries");
        }
        Ok(entry)
    }

    async fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        let lease = ProxyLease::acquire(&self.proxy, self.connect_timeout_secs, "arxiv download")?;
        info!(url = %url, dest = %dest.display(), proxied = lease.is_proxied(), "downloading paper");

        let response = lease
            .client()
            .get(url)
            .send()
            .await
            .map_err(|err| {
                api_request_error(err, SERVICE, url, URL_SETTING, self.connect_timeout_secs)
            })?;
        if !response.status().is_success() {
            return Err(anyhow!(
                "Paper download from '{}' failed with status {}",
                url,
                response.status()
            ));
        }
        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("Failed to read paper body from '{url}'"))?;

        if let Some(dir) = dest.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create cache directory '{}'", dir.display()))?;
        }
        let partial = partial_path(dest);
        fs::write(&partial, &bytes)
            .with_context(|| format!("Failed to write '{}'", partial.display()))?;
        fs::rename(&partial, dest)
            .with_context(|| format!("Failed to move download into '{}'", dest.display()))?;

        debug!(dest = %dest.display(), size = bytes.len(), "paper downloaded");
        Ok(())
    }
}

impl PaperSource for ArxivClient {
    fn find_paper<'a>(&'a self, identifier: &'a str) -> ProviderFuture<'a, Option<PaperEntry>> {
        Box::pin(self.search(identifier))
    }

    fn download<'a>(&'a self, url: &'a str, dest: &'a Path) -> ProviderFuture<'a, ()> {
        Box::pin(self.fetch(url, dest))
    }
}
