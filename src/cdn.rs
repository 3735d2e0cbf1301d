//! CDN Resolver/Fetcher
//!
//! `get_package_url` is pure template substitution. `fetch_package` walks the
//! preferred provider then the remaining providers in configured order, caching
//! the first success under `specifier@version`.

use crate::cache::{CachedPackage, CdnStats, ResolutionCache};
use crate::config::{CdnProvider, CompilerConfig};
use crate::imports::split_specifier;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_VERSION: &str = "latest";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("request to {url} failed: {message}")]
    Http { url: String, message: String },
    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },
    #[error("request to {url} timed out after {timeout_ms}ms")]
    Timeout { url: String, timeout_ms: u64 },
    #[error("all providers failed for {specifier}: {last}")]
    AllProvidersFailed { specifier: String, last: String },
}

/// Network seam. Production uses [`HttpFetcher`]; tests plug in fakes.
#[async_trait]
pub trait PackageFetcher: Send + Sync {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<String, FetchError>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("tsx-heal/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Http {
                url: String::new(),
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PackageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<String, FetchError> {
        let request = async {
            let response = self
                .client
                .get(url)
                .timeout(timeout)
                .send()
                .await
                .map_err(|e| classify(url, timeout, e))?;
            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }
            response.text().await.map_err(|e| classify(url, timeout, e))
        };

        match tokio::time::timeout(timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout {
                url: url.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }
}

fn classify(url: &str, timeout: Duration, e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }
    } else {
        FetchError::Http {
            url: url.to_string(),
            message: e.to_string(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RESULTS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchResult {
    pub success: bool,
    pub content: Option<String>,
    pub url: Option<String>,
    pub provider: Option<String>,
    pub error: Option<String>,
    pub cached: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedImport {
    pub specifier: String,
    pub url: String,
    pub provider: String,
    pub resolved_at: u64,
}

impl From<&CachedPackage> for ResolvedImport {
    fn from(p: &CachedPackage) -> Self {
        Self {
            specifier: p.specifier.clone(),
            url: p.url.clone(),
            provider: p.provider.clone(),
            resolved_at: p.resolved_at,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UrlOptions<'o> {
    pub provider: Option<&'o str>,
    pub subpath: Option<&'o str>,
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ═══════════════════════════════════════════════════════════════════════════════
// RESOLVER
// ═══════════════════════════════════════════════════════════════════════════════

pub struct CdnResolver {
    providers: Vec<CdnProvider>,
    preferred: String,
    timeout: Duration,
    fetcher: Arc<dyn PackageFetcher>,
    cache: ResolutionCache,
}

impl CdnResolver {
    pub fn new(config: &CompilerConfig, fetcher: Arc<dyn PackageFetcher>) -> Self {
        Self {
            providers: config.providers.clone(),
            preferred: config.preferred_provider.clone(),
            timeout: config.fetch_timeout,
            fetcher,
            cache: ResolutionCache::new(),
        }
    }

    pub fn preferred_provider(&self) -> &str {
        &self.preferred
    }

    fn provider(&self, name: &str) -> Option<&CdnProvider> {
        self.providers.iter().find(|p| p.name == name)
    }

    /// Preferred provider first, then the rest in configured order.
    fn provider_chain(&self) -> Vec<&CdnProvider> {
        let mut chain: Vec<&CdnProvider> = self.provider(&self.preferred).into_iter().collect();
        chain.extend(self.providers.iter().filter(|p| p.name != self.preferred));
        chain
    }

    /// Substitute `specifier` and `version` into a provider template. A sub-path
    /// in the specifier is split off so only the base package is versioned.
    pub fn get_package_url(&self, specifier: &str, version: &str, options: UrlOptions) -> String {
        let provider = options
            .provider
            .and_then(|name| self.provider(name))
            .or_else(|| self.provider(&self.preferred))
            .or_else(|| self.providers.first());
        let Some(provider) = provider else {
            return String::new();
        };
        render_template(&provider.url_template, specifier, version, options.subpath)
    }

    pub async fn fetch_package(&self, specifier: &str, version: &str) -> FetchResult {
        let key = ResolutionCache::key(specifier, version);
        let outcome = self
            .cache
            .get_or_fetch(&key, || self.fetch_uncached(specifier, version))
            .await;

        match outcome {
            Ok((package, cached)) => FetchResult {
                success: true,
                content: Some(package.content),
                url: Some(package.url),
                provider: Some(package.provider),
                error: None,
                cached,
            },
            Err(e) => FetchResult {
                success: false,
                content: None,
                url: None,
                provider: None,
                error: Some(e.to_string()),
                cached: false,
            },
        }
    }

    async fn fetch_uncached(&self, specifier: &str, version: &str) -> Result<CachedPackage, FetchError> {
        let mut last: Option<FetchError> = None;

        for provider in self.provider_chain() {
            let url = render_template(&provider.url_template, specifier, version, None);
            debug!(%specifier, provider = %provider.name, %url, "fetching package");
            match self.fetcher.fetch(&url, self.timeout).await {
                Ok(content) => {
                    return Ok(CachedPackage {
                        specifier: specifier.to_string(),
                        version: version.to_string(),
                        url,
                        provider: provider.name.clone(),
                        content,
                        resolved_at: now_millis(),
                    });
                }
                Err(e) => {
                    warn!(%specifier, provider = %provider.name, error = %e, "provider failed");
                    last = Some(e);
                }
            }
        }

        Err(FetchError::AllProvidersFailed {
            specifier: specifier.to_string(),
            last: last
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no providers configured".to_string()),
        })
    }

    /// The completed resolution for `specifier@version`, if cached.
    pub fn cached(&self, specifier: &str, version: &str) -> Option<ResolvedImport> {
        self.cache
            .peek(&ResolutionCache::key(specifier, version))
            .as_ref()
            .map(ResolvedImport::from)
    }

    pub fn stats(&self) -> CdnStats {
        self.cache.stats()
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

/// Fill `{package}`, `{version}` and `{subpath}`. An explicit `subpath`
/// overrides any sub-path carried by the specifier itself.
pub fn render_template(template: &str, specifier: &str, version: &str, subpath: Option<&str>) -> String {
    let (package, own_subpath) = split_specifier(specifier);
    let subpath = match subpath {
        Some(s) if s.is_empty() || s.starts_with('/') => s.to_string(),
        Some(s) => format!("/{}", s),
        None => own_subpath,
    };
    let version = if version.is_empty() { DEFAULT_VERSION } else { version };
    template
        .replace("{package}", &package)
        .replace("{version}", version)
        .replace("{subpath}", &subpath)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Fails for every URL on the listed hosts; serves a stub module elsewhere.
    pub(crate) struct FakeFetcher {
        pub failing_hosts: Vec<&'static str>,
        pub calls: AtomicUsize,
        pub seen: Mutex<Vec<String>>,
    }

    impl FakeFetcher {
        pub fn new(failing_hosts: Vec<&'static str>) -> Self {
            Self {
                failing_hosts,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(vec![]),
            }
        }
    }

    #[async_trait]
    impl PackageFetcher for FakeFetcher {
        async fn fetch(&self, url: &str, _timeout: Duration) -> Result<String, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(url.to_string());
            if self.failing_hosts.iter().any(|h| url.contains(h)) {
                return Err(FetchError::Status {
                    url: url.to_string(),
                    status: 503,
                });
            }
            Ok(format!("export default '{}';", url))
        }
    }

    fn resolver(fetcher: Arc<FakeFetcher>) -> CdnResolver {
        CdnResolver::new(&CompilerConfig::default(), fetcher)
    }

    #[test]
    fn test_get_package_url_templates() {
        let r = resolver(Arc::new(FakeFetcher::new(vec![])));
        assert_eq!(
            r.get_package_url("lodash", "4.17.21", UrlOptions::default()),
            "https://esm.sh/lodash@4.17.21"
        );
        assert_eq!(
            r.get_package_url(
                "@heroicons/react/24/outline",
                "2.0.0",
                UrlOptions {
                    provider: Some("jsdelivr"),
                    subpath: None
                }
            ),
            "https://cdn.jsdelivr.net/npm/@heroicons/react@2.0.0/24/outline/+esm"
        );
        assert_eq!(
            r.get_package_url(
                "react-dom",
                "",
                UrlOptions {
                    provider: Some("unpkg"),
                    subpath: Some("client")
                }
            ),
            "https://unpkg.com/react-dom@latest/client?module"
        );
    }

    #[tokio::test]
    async fn test_fetch_falls_back_to_next_provider() {
        let fetcher = Arc::new(FakeFetcher::new(vec!["esm.sh"]));
        let r = resolver(Arc::clone(&fetcher));
        let result = r.fetch_package("lodash", "4.17.21").await;
        assert!(result.success);
        assert_eq!(result.provider.as_deref(), Some("jsdelivr"));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_fetch_all_providers_fail() {
        let fetcher = Arc::new(FakeFetcher::new(vec!["esm.sh", "jsdelivr", "unpkg"]));
        let r = resolver(Arc::clone(&fetcher));
        let result = r.fetch_package("lodash", "latest").await;
        assert!(!result.success);
        let error = result.error.unwrap();
        assert!(error.contains("all providers failed"));
        assert!(error.contains("unpkg"));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
        assert_eq!(r.cache_len(), 0);
    }

    #[tokio::test]
    async fn test_cache_short_circuits_network() {
        let fetcher = Arc::new(FakeFetcher::new(vec![]));
        let r = resolver(Arc::clone(&fetcher));
        let first = r.fetch_package("zod", "3.22.0").await;
        let second = r.fetch_package("zod", "3.22.0").await;
        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(first.url, second.url);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(r.cached("zod", "3.22.0").unwrap().provider, "esm.sh");

        r.clear_cache();
        assert_eq!(r.cache_len(), 0);
    }

    #[tokio::test]
    async fn test_preferred_provider_respected() {
        let mut config = CompilerConfig::default();
        config.preferred_provider = "unpkg".into();
        let fetcher = Arc::new(FakeFetcher::new(vec![]));
        let r = CdnResolver::new(&config, fetcher.clone());
        let result = r.fetch_package("zod", "latest").await;
        assert_eq!(result.provider.as_deref(), Some("unpkg"));
        assert_eq!(
            fetcher.seen.lock().unwrap()[0],
            "https://unpkg.com/zod@latest?module"
        );
    }
}
