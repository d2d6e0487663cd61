//! Public IP resolution policy
//!
//! The [`Resolver`] owns one [`IpSource`] per strategy and walks them in
//! the configured order. A failing strategy is logged and the next one is
//! tried; the caller sees an error only when every strategy failed.
//! `provider` is not a source: it only tells the engine that the vendor may
//! observe the address itself, so the resolver skips it.

use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::{IpStrategy, IpVersion};
use crate::error::{Error, Result};
use crate::traits::IpSource;

/// Ordered set of public IP sources
#[derive(Clone, Default)]
pub struct Resolver {
    sources: Vec<Arc<dyn IpSource>>,
}

impl Resolver {
    /// Create a resolver from sources; order is given per call
    pub fn new(sources: Vec<Arc<dyn IpSource>>) -> Self {
        Self { sources }
    }

    /// Add a source, replacing any source of the same strategy
    pub fn with_source(mut self, source: Arc<dyn IpSource>) -> Self {
        self.sources.retain(|s| s.strategy() != source.strategy());
        self.sources.push(source);
        self
    }

    /// Whether a source is available for `strategy`
    pub fn has(&self, strategy: IpStrategy) -> bool {
        self.source(strategy).is_some()
    }

    fn source(&self, strategy: IpStrategy) -> Option<&Arc<dyn IpSource>> {
        self.sources.iter().find(|s| s.strategy() == strategy)
    }

    /// Resolve the public IP for `version`, trying `order` front to back
    ///
    /// # Parameters
    ///
    /// - `version`: Requested family
    /// - `order`: Strategies to try; `provider` entries are skipped
    ///
    /// # Returns
    ///
    /// - `Ok(IpAddr)`: The first address of the requested family
    /// - `Err(Error::IpSource)`: Every strategy failed, with each failure listed
    pub async fn resolve(&self, version: IpVersion, order: &[IpStrategy]) -> Result<IpAddr> {
        let mut failures = Vec::new();

        for &strategy in order {
            if strategy == IpStrategy::Provider {
                continue;
            }
            let Some(source) = self.source(strategy) else {
                failures.push(format!("{strategy}: no source registered"));
                continue;
            };

            match source.fetch(version).await {
                Ok(ip) if version.accepts(ip) => {
                    debug!(%strategy, %ip, "Resolved public IP");
                    return Ok(ip);
                }
                Ok(ip) => {
                    warn!(%strategy, %ip, "Resolved address is not {}", version);
                    failures.push(format!("{strategy}: got {ip}, want {version}"));
                }
                Err(e) => {
                    warn!(%strategy, "Public IP strategy failed: {}", e);
                    failures.push(format!("{strategy}: {e}"));
                }
            }
        }

        if failures.is_empty() {
            return Err(Error::ip_source(format!(
                "no resolution strategy available for {version}"
            )));
        }
        Err(Error::ip_source(format!(
            "all strategies failed for {version}: {}",
            failures.join("; ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedSource {
        strategy: IpStrategy,
        answer: Option<IpAddr>,
        calls: AtomicUsize,
    }

    impl FixedSource {
        fn new(strategy: IpStrategy, answer: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                strategy,
                answer: answer.map(|a| a.parse().unwrap()),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl IpSource for FixedSource {
        async fn fetch(&self, _version: IpVersion) -> Result<IpAddr> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer
                .ok_or_else(|| Error::transport("connection reset"))
        }

        fn strategy(&self) -> IpStrategy {
            self.strategy
        }
    }

    #[tokio::test]
    async fn falls_through_to_the_next_strategy() {
        let dns = FixedSource::new(IpStrategy::Dns, None);
        let http = FixedSource::new(IpStrategy::Http, Some("203.0.113.7"));
        let resolver = Resolver::new(vec![dns.clone(), http.clone()]);

        let ip = resolver
            .resolve(IpVersion::V4, &[IpStrategy::Dns, IpStrategy::Http])
            .await
            .unwrap();
        assert_eq!(ip, "203.0.113.7".parse::<IpAddr>().unwrap());
        assert_eq!(dns.calls.load(Ordering::SeqCst), 1);
        assert_eq!(http.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stops_at_the_first_success() {
        let dns = FixedSource::new(IpStrategy::Dns, Some("203.0.113.7"));
        let http = FixedSource::new(IpStrategy::Http, Some("203.0.113.8"));
        let resolver = Resolver::new(vec![dns.clone(), http.clone()]);

        let ip = resolver
            .resolve(IpVersion::V4, &[IpStrategy::Dns, IpStrategy::Http])
            .await
            .unwrap();
        assert_eq!(ip, "203.0.113.7".parse::<IpAddr>().unwrap());
        assert_eq!(http.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn wrong_family_counts_as_failure() {
        let http = FixedSource::new(IpStrategy::Http, Some("2001:db8::1"));
        let resolver = Resolver::new(vec![http]);

        let err = resolver
            .resolve(IpVersion::V4, &[IpStrategy::Http])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Resolver);
    }

    #[tokio::test]
    async fn provider_strategy_is_not_a_source() {
        let resolver = Resolver::new(vec![]);
        let err = resolver
            .resolve(IpVersion::V4, &[IpStrategy::Provider])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no resolution strategy"));
    }
}
