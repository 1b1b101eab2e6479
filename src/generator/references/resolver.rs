//! 文献元数据解析：DOI经主服务/备用服务换取BibTeX，非DOI引用生成目录条目

use md5::{Digest, Md5};
use rand::Rng;
use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::bibtex::{BibRecord, derive_citekey};
use super::normalize::is_valid_doi;
use crate::cache::CacheManager;
use crate::config::MetadataConfig;
use crate::types::bibliography::BibEntry;
use crate::types::reference::{ExtractedRef, RefKind};
use crate::utils::latex::{escape_latex, escape_specials};

const CACHE_CATEGORY: &str = "doi_bibtex";
const BIBTEX_MEDIA_TYPE: &str = "application/x-bibtex";

/// 元数据请求的错误分类
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ResolveError {
    /// 429、5xx、超时或连接错误，可重试
    #[error("transient metadata error: {0}")]
    Transient(String),
    /// 404、DOI格式错误或返回内容不是BibTeX，不重试
    #[error("permanent metadata error: {0}")]
    Permanent(String),
}

impl ResolveError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ResolveError::Transient(_))
    }
}

/// DOI元数据服务客户端
pub struct MetadataClient {
    http: reqwest::Client,
    config: MetadataConfig,
    cache: Option<Arc<CacheManager>>,
}

impl MetadataClient {
    pub fn new(config: MetadataConfig, cache: Option<Arc<CacheManager>>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self {
            http,
            config,
            cache,
        })
    }

    /// 获取DOI对应的BibTeX：先主服务，失败后转备用服务
    pub async fn fetch_bibtex(&self, doi: &str) -> Result<String, ResolveError> {
        if !is_valid_doi(doi) {
            return Err(ResolveError::Permanent(format!("malformed DOI `{}`", doi)));
        }

        if let Some(cache) = &self.cache {
            if let Some(bibtex) = cache.get::<String>(CACHE_CATEGORY, doi).await {
                tracing::debug!("💾 DOI缓存命中: {}", doi);
                return Ok(bibtex);
            }
        }

        let primary = format!("{}/{}", self.config.primary_base_url.trim_end_matches('/'), doi);
        let bibtex = match self.fetch_with_retry(&primary).await {
            Ok(bibtex) => bibtex,
            Err(err) => {
                tracing::warn!("⚠️ 主元数据服务解析 {} 失败，转用备用服务: {}", doi, err);
                let fallback = format!(
                    "{}/works/{}/transform/{}",
                    self.config.fallback_base_url.trim_end_matches('/'),
                    doi,
                    BIBTEX_MEDIA_TYPE
                );
                self.fetch_with_retry(&fallback).await?
            }
        };

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.set(CACHE_CATEGORY, doi, bibtex.clone()).await {
                tracing::debug!("写入DOI缓存失败: {}", e);
            }
        }
        Ok(bibtex)
    }

    /// 可重试错误按指数退避加抖动重试，不可重试错误立即返回
    async fn fetch_with_retry(&self, url: &str) -> Result<String, ResolveError> {
        let max_attempts = self.config.retry_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.fetch_once(url).await {
                Ok(body) => return Ok(body),
                Err(err) if err.is_transient() && attempt < max_attempts => {
                    let delay = backoff_delay(self.config.backoff_base_ms, attempt);
                    tracing::debug!(
                        "🔄 元数据请求失败，{}ms后重试 (第 {} / {}次尝试): {}",
                        delay.as_millis(),
                        attempt,
                        max_attempts,
                        err
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn fetch_once(&self, url: &str) -> Result<String, ResolveError> {
        let request = async {
            let response = self
                .http
                .get(url)
                .header(ACCEPT, BIBTEX_MEDIA_TYPE)
                .send()
                .await
                .map_err(|e| ResolveError::Transient(e.to_string()))?;

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                return Err(ResolveError::Transient(format!("HTTP {}", status)));
            }
            if !status.is_success() {
                return Err(ResolveError::Permanent(format!("HTTP {}", status)));
            }

            let body = response
                .text()
                .await
                .map_err(|e| ResolveError::Transient(e.to_string()))?;
            if !body.trim_start().starts_with('@') {
                return Err(ResolveError::Permanent("response is not BibTeX".to_string()));
            }
            Ok(body)
        };

        match tokio::time::timeout(self.config.request_timeout(), request).await {
            Ok(result) => result,
            Err(_) => Err(ResolveError::Transient(format!(
                "timed out after {}ms",
                self.config.request_timeout_ms
            ))),
        }
    }

    /// 解析全部引用，输出顺序与输入一致，无法解析的引用被丢弃
    pub async fn resolve_all(&self, references: &[ExtractedRef]) -> Vec<BibEntry> {
        let mut resolved: Vec<Option<BibEntry>> = vec![None; references.len()];

        let doi_refs: Vec<(usize, &ExtractedRef)> = references
            .iter()
            .enumerate()
            .filter(|(_, r)| r.kind == RefKind::Doi)
            .collect();

        let batch_size = self.config.batch_size.max(1);
        for (batch_index, batch) in doi_refs.chunks(batch_size).enumerate() {
            if batch_index > 0 {
                tokio::time::sleep(self.config.batch_delay()).await;
            }
            for (index, reference) in batch {
                match self.fetch_bibtex(&reference.id).await {
                    Ok(bibtex) => match doi_entry(&reference.id, &bibtex) {
                        Some(entry) => resolved[*index] = Some(entry),
                        None => tracing::warn!(
                            "⚠️ 无法解析 {} 的BibTeX记录，已丢弃该引用",
                            reference.id
                        ),
                    },
                    Err(err) => {
                        tracing::warn!("⚠️ 无法解析引用 {}，已丢弃: {}", reference.id, err);
                    }
                }
            }
        }

        for (index, reference) in references.iter().enumerate() {
            if reference.kind != RefKind::Doi {
                resolved[index] = Some(catalog_entry(reference));
            }
        }

        let entries: Vec<BibEntry> = resolved.into_iter().flatten().collect();
        tracing::info!(
            "📚 参考文献解析完成: {} / {} 条可用 (DOI {} 条)",
            entries.len(),
            references.len(),
            doi_refs.len()
        );
        if let Some(cache) = &self.cache {
            let stats = cache.stats();
            tracing::info!("💾 DOI缓存命中 {} 次，未命中 {} 次", stats.hits, stats.misses);
        }
        entries
    }
}

fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    let exponential = base_ms.saturating_mul(2u64.pow(attempt.saturating_sub(1).min(6)));
    let jitter = if base_ms > 0 {
        rand::rng().random_range(0..=base_ms / 2)
    } else {
        0
    };
    Duration::from_millis(exponential + jitter)
}

/// 把服务返回的BibTeX改写为以确定性citekey为键的记录
fn doi_entry(doi: &str, bibtex: &str) -> Option<BibEntry> {
    let mut record = BibRecord::parse(bibtex)?;
    record.key = derive_citekey(&record, doi);
    for (name, value) in record.fields.iter_mut() {
        let lowered = name.to_lowercase();
        if lowered != "url" && lowered != "doi" {
            *value = escape_specials(value);
        }
    }
    record.set_field("doi", doi);

    Some(BibEntry {
        doi: doi.to_string(),
        citekey: record.key.clone(),
        bibtex: record.to_bibtex(),
        url: record.field("url").map(str::to_string),
    })
}

/// 为非DOI引用生成最小的@misc目录条目，不访问网络
pub fn catalog_entry(reference: &ExtractedRef) -> BibEntry {
    let citekey = catalog_citekey(reference);
    let title = match (&reference.title, reference.kind) {
        (Some(title), _) => escape_latex(title),
        (None, RefKind::Url) => escape_latex(
            reference
                .id
                .trim_start_matches("https://")
                .trim_start_matches("http://"),
        ),
        (None, RefKind::Pmc | RefKind::Nct) => reference.id.clone(),
        (None, kind) => format!("{} {}", kind, escape_latex(&reference.id)),
    };

    let mut record = BibRecord {
        entry_type: "misc".to_string(),
        key: citekey.clone(),
        fields: vec![
            ("title".to_string(), title),
            ("note".to_string(), reference.kind.catalog_note().to_string()),
            ("url".to_string(), reference.url.clone()),
        ],
    };
    if reference.kind == RefKind::Arxiv {
        record.set_field("eprint", &reference.id);
        record.set_field("archiveprefix", "arXiv");
    }

    BibEntry {
        doi: String::new(),
        citekey,
        bibtex: record.to_bibtex(),
        url: Some(reference.url.clone()),
    }
}

fn catalog_citekey(reference: &ExtractedRef) -> String {
    let prefix = reference.kind.key_prefix();
    match reference.kind {
        RefKind::Url => {
            let mut hasher = Md5::new();
            hasher.update(reference.id.as_bytes());
            let digest = format!("{:x}", hasher.finalize());
            format!("{}{}", prefix, &digest[..8])
        }
        _ => {
            let compact: String = reference
                .id
                .chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .collect::<String>()
                .to_lowercase();
            let compact = compact.strip_prefix(prefix).unwrap_or(&compact).to_string();
            format!("{}{}", prefix, compact)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const BIBTEX: &str =
        "@article{Smith_2020, title={Deep Things}, author={Smith, John and Doe, Jane}, year={2020}, journal={R&D Letters}}";

    fn config(primary: &MockServer, fallback: &MockServer) -> MetadataConfig {
        MetadataConfig {
            primary_base_url: primary.uri(),
            fallback_base_url: fallback.uri(),
            request_timeout_ms: 200,
            retry_attempts: 3,
            backoff_base_ms: 1,
            batch_size: 2,
            batch_delay_ms: 0,
            ..MetadataConfig::default()
        }
    }

    fn doi(id: &str) -> ExtractedRef {
        ExtractedRef {
            kind: RefKind::Doi,
            id: id.to_string(),
            url: format!("https://doi.org/{}", id),
            title: None,
        }
    }

    fn fallback_path(doi: &str) -> String {
        format!("/works/{}/transform/application/x-bibtex", doi)
    }

    #[tokio::test]
    async fn test_primary_success() {
        let primary = MockServer::start().await;
        let fallback = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/10.1000/abc"))
            .and(header("accept", "application/x-bibtex"))
            .respond_with(ResponseTemplate::new(200).set_body_string(BIBTEX))
            .expect(1)
            .mount(&primary)
            .await;

        let client = MetadataClient::new(config(&primary, &fallback), None).unwrap();
        let entries = client.resolve_all(&[doi("10.1000/abc")]).await;

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].citekey, "smith2020");
        assert!(entries[0].bibtex.starts_with("@article{smith2020,"));
        assert!(entries[0].bibtex.contains(r"R\&D Letters"));
        assert!(entries[0].bibtex.contains("doi = {10.1000/abc}"));
    }

    #[tokio::test]
    async fn test_transient_errors_exhaust_retries_then_fallback() {
        let primary = MockServer::start().await;
        let fallback = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/10.1000/abc"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&primary)
            .await;
        Mock::given(method("GET"))
            .and(path(fallback_path("10.1000/abc")))
            .respond_with(ResponseTemplate::new(200).set_body_string(BIBTEX))
            .expect(1)
            .mount(&fallback)
            .await;

        let client = MetadataClient::new(config(&primary, &fallback), None).unwrap();
        let entries = client.resolve_all(&[doi("10.1000/abc")]).await;

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].citekey, "smith2020");
    }

    #[tokio::test]
    async fn test_not_found_short_circuits_to_fallback() {
        let primary = MockServer::start().await;
        let fallback = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/10.1000/abc"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&primary)
            .await;
        Mock::given(method("GET"))
            .and(path(fallback_path("10.1000/abc")))
            .respond_with(ResponseTemplate::new(200).set_body_string(BIBTEX))
            .expect(1)
            .mount(&fallback)
            .await;

        let client = MetadataClient::new(config(&primary, &fallback), None).unwrap();
        assert!(client.fetch_bibtex("10.1000/abc").await.is_ok());
    }

    #[tokio::test]
    async fn test_timeout_is_transient() {
        let primary = MockServer::start().await;
        let fallback = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(BIBTEX)
                    .set_delay(Duration::from_millis(1000)),
            )
            .expect(3)
            .mount(&primary)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .expect(3)
            .mount(&fallback)
            .await;

        let client = MetadataClient::new(config(&primary, &fallback), None).unwrap();
        let err = client.fetch_bibtex("10.1000/abc").await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_non_bibtex_body_and_unresolvable_reference_dropped() {
        let primary = MockServer::start().await;
        let fallback = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>landing page</html>"))
            .expect(1)
            .mount(&primary)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&fallback)
            .await;

        let client = MetadataClient::new(config(&primary, &fallback), None).unwrap();
        let trial = ExtractedRef {
            kind: RefKind::Nct,
            id: "NCT01234567".to_string(),
            url: "https://clinicaltrials.gov/study/NCT01234567".to_string(),
            title: None,
        };
        let entries = client.resolve_all(&[doi("10.9999/fake"), trial]).await;

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].citekey, "nct01234567");
        assert!(entries[0].bibtex.contains("ClinicalTrials.gov record"));
    }

    #[tokio::test]
    async fn test_malformed_doi_never_hits_network() {
        let primary = MockServer::start().await;
        let fallback = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(BIBTEX))
            .expect(0)
            .mount(&primary)
            .await;

        let client = MetadataClient::new(config(&primary, &fallback), None).unwrap();
        let err = client.fetch_bibtex("10.1/x").await.unwrap_err();
        assert_eq!(err, ResolveError::Permanent("malformed DOI `10.1/x`".to_string()));
    }

    #[tokio::test]
    async fn test_cached_bibtex_skips_network() {
        let primary = MockServer::start().await;
        let fallback = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(BIBTEX))
            .expect(1)
            .mount(&primary)
            .await;

        let dir = tempfile::TempDir::new().unwrap();
        let cache = Arc::new(CacheManager::new(crate::config::CacheConfig {
            enabled: true,
            cache_dir: dir.path().to_path_buf(),
            expire_hours: 1,
        }));
        let client = MetadataClient::new(config(&primary, &fallback), Some(cache.clone())).unwrap();

        client.fetch_bibtex("10.1000/abc").await.unwrap();
        client.fetch_bibtex("10.1000/abc").await.unwrap();
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn test_catalog_citekeys() {
        let make = |kind, id: &str| ExtractedRef {
            kind,
            id: id.to_string(),
            url: "https://example.org/x".to_string(),
            title: None,
        };
        assert_eq!(catalog_entry(&make(RefKind::Pmc, "PMC123456")).citekey, "pmc123456");
        assert_eq!(catalog_entry(&make(RefKind::Pmid, "31415926")).citekey, "pmid31415926");
        assert_eq!(catalog_entry(&make(RefKind::Arxiv, "2101.00001")).citekey, "arxiv210100001");

        let web = catalog_entry(&make(RefKind::Url, "https://example.org/x"));
        assert!(web.citekey.starts_with("web"));
        assert_eq!(web.citekey.len(), 11);
        assert!(web.bibtex.contains("title = {example.org/x}"));
        assert_eq!(web.doi, "");
    }
}
