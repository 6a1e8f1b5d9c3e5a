use anyhow::{Context, Result};
use reqwest::{Client, NoProxy, Proxy};
use std::time::Duration;
use tracing::debug;

use crate::config::ProxySettings;

/// HTTP client scoped to a single network operation.
///
/// When the proxy is enabled the client routes through the configured
/// proxies; otherwise it connects directly and ignores proxy variables from
/// the process environment. The lease is released when dropped, on success
/// and failure alike.
#[derive(Debug)]
pub struct ProxyLease {
    client: Client,
    operation: &'static str,
    proxied: bool,
}

impl ProxyLease {
    pub fn acquire(
        settings: &ProxySettings,
        connect_timeout_secs: u64,
        operation: &'static str,
    ) -> Result<Self> {
        let builder =
            Client::builder().connect_timeout(Duration::from_secs(connect_timeout_secs));
        let builder = if settings.enabled {
            debug!(
                operation,
                http_proxy = %settings.http_proxy,
                all_proxy = %settings.all_proxy,
                "acquiring proxy"
            );
            let no_proxy = NoProxy::from_string(&settings.no_proxy);
            builder
                .proxy(
                    Proxy::http(&settings.http_proxy)
                        .context("Invalid PROXY_HTTP")?
                        .no_proxy(no_proxy.clone()),
                )
                .proxy(
                    Proxy::https(&settings.http_proxy)
                        .context("Invalid PROXY_HTTP")?
                        .no_proxy(no_proxy.clone()),
                )
                .proxy(
                    Proxy::all(&settings.all_proxy)
                        .context("Invalid PROXY_ALL")?
                        .no_proxy(no_proxy),
                )
        } else {
            builder.no_proxy()
        };

        let client = builder
            .build()
            .context("Failed to initialize HTTP client")?;
        Ok(Self {
            client,
            operation,
            proxied: settings.enabled,
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn is_proxied(&self) -> bool {
        self.proxied
    }
}

impl Drop for ProxyLease {
    fn drop(&mut self) {
        if self.proxied {
            debug!(operation = self.operation, "releasing proxy");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ProxyLease;
    use crate::config::ProxySettings;

    #[test]
    fn direct_lease_is_not_proxied() {
        let lease =
            ProxyLease::acquire(&ProxySettings::default(), 5, "test").expect("lease should build");
        assert!(!lease.is_proxied());
    }

    #[test]
    fn enabled_lease_uses_proxy() {
        let settings = ProxySettings {
            enabled: true,
            ..ProxySettings::default()
        };
        let lease = ProxyLease::acquire(&settings, 5, "test").expect("lease should build");
        assert!(lease.is_proxied());
    }

    #[test]
    fn invalid_proxy_url_is_reported() {
        let settings = ProxySettings {
            enabled: true,
            http_proxy: "http://127.0.0.1:notaport".to_string(),
            ..ProxySettings::default()
        };
        let err = ProxyLease::acquire(&settings, 5, "test").expect_err("bad proxy should fail");
        assert!(format!("{err:#}").contains("PROXY_HTTP"));
    }
}
