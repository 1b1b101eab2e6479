//! 从任务输出的自由文本中提取引用
//!
//! 纯文本处理，不访问网络。无法解析的片段会被跳过并计数。

use regex::Regex;
use std::collections::HashMap;
use std::ops::Range;
use std::sync::LazyLock;

use super::normalize::{
    doi_from_url, is_valid_doi, normalize_doi, normalize_url, strip_trailing, unescape_latex,
};
use crate::types::reference::{ExtractedRef, RefKind};

static MD_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\[\]\n]{1,300})\]\((https?://[^)\s]+)\)").unwrap());
static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s<>"'`\[\]{}|\\^]+"#).unwrap());
static DOI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\b10\.\d{4,9}/[^\s"'<>\[\]{}]+"#).unwrap());
static PMC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bPMC\s?(\d{4,9})\b").unwrap());
static PMID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bPMID:?\s*(\d{1,9})\b").unwrap());
static NCT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bNCT\d{8}\b").unwrap());
static ARXIV_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\barxiv:\s*(\d{4}\.\d{4,5}|[a-z\-]+(?:\.[a-z]{2})?/\d{7})(?:v\d+)?").unwrap()
});
static ARXIV_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)/(?:abs|pdf)/(\d{4}\.\d{4,5}|[a-z\-]+(?:\.[a-z]{2})?/\d{7})(?:v\d+)?").unwrap()
});
static PUBMED_PATH_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^/(\d{1,9})$").unwrap());

/// 一次提取的结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionReport {
    /// 去重后的引用，按首次出现的位置排序
    pub references: Vec<ExtractedRef>,
    /// 匹配到但无法解析的片段数量
    pub skipped: usize,
}

/// 从一段文本中提取引用
pub fn extract_references(text: &str) -> ExtractionReport {
    let text = unescape_latex(text);
    let mut candidates: Vec<(usize, ExtractedRef)> = Vec::new();
    let mut skipped = 0;
    let mut url_spans: Vec<Range<usize>> = Vec::new();

    for caps in MD_LINK_RE.captures_iter(&text) {
        let (Some(title), Some(url)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        url_spans.push(url.range());
        match classify_url(url.as_str()) {
            Some(mut reference) => {
                let title = title.as_str().trim();
                if !title.is_empty() && !title.starts_with("http") {
                    reference.title = Some(title.to_string());
                }
                candidates.push((url.start(), reference));
            }
            None => skipped += 1,
        }
    }

    for found in URL_RE.find_iter(&text) {
        if within(&url_spans, found.start()) {
            continue;
        }
        url_spans.push(found.range());
        match classify_url(found.as_str()) {
            Some(reference) => candidates.push((found.start(), reference)),
            None => skipped += 1,
        }
    }

    for found in DOI_RE.find_iter(&text) {
        if within(&url_spans, found.start()) {
            continue;
        }
        let doi = normalize_doi(found.as_str());
        if is_valid_doi(&doi) {
            candidates.push((found.start(), doi_ref(doi)));
        } else {
            skipped += 1;
        }
    }

    for caps in PMC_RE.captures_iter(&text) {
        if let (Some(all), Some(digits)) = (caps.get(0), caps.get(1)) {
            if !within(&url_spans, all.start()) {
                candidates.push((all.start(), pmc_ref(digits.as_str())));
            }
        }
    }

    for caps in PMID_RE.captures_iter(&text) {
        if let (Some(all), Some(digits)) = (caps.get(0), caps.get(1)) {
            if !within(&url_spans, all.start()) {
                candidates.push((all.start(), pmid_ref(digits.as_str())));
            }
        }
    }

    for found in NCT_RE.find_iter(&text) {
        if !within(&url_spans, found.start()) {
            candidates.push((found.start(), nct_ref(found.as_str())));
        }
    }

    for caps in ARXIV_RE.captures_iter(&text) {
        if let (Some(all), Some(id)) = (caps.get(0), caps.get(1)) {
            if !within(&url_spans, all.start()) {
                candidates.push((all.start(), arxiv_ref(id.as_str())));
            }
        }
    }

    candidates.sort_by_key(|(position, _)| *position);

    let mut references: Vec<ExtractedRef> = Vec::new();
    let mut seen: HashMap<String, usize> = HashMap::new();
    for (_, reference) in candidates {
        merge(&mut references, &mut seen, reference);
    }

    ExtractionReport {
        references,
        skipped,
    }
}

/// 从多段任务输出中提取引用，结果整体去重
pub fn extract_from_outputs<'a, I>(outputs: I) -> ExtractionReport
where
    I: IntoIterator<Item = &'a str>,
{
    let mut report = ExtractionReport::default();
    let mut seen: HashMap<String, usize> = HashMap::new();
    for output in outputs {
        let partial = extract_references(output);
        report.skipped += partial.skipped;
        for reference in partial.references {
            merge(&mut report.references, &mut seen, reference);
        }
    }
    report
}

fn merge(references: &mut Vec<ExtractedRef>, seen: &mut HashMap<String, usize>, reference: ExtractedRef) {
    let key = reference.dedup_key();
    match seen.get(&key).copied() {
        Some(index) => {
            if references[index].title.is_none() && reference.title.is_some() {
                references[index].title = reference.title;
            }
        }
        None => {
            seen.insert(key, references.len());
            references.push(reference);
        }
    }
}

fn within(spans: &[Range<usize>], position: usize) -> bool {
    spans.iter().any(|span| span.contains(&position))
}

/// 按主机与路径识别URL指向的引用类型
fn classify_url(raw: &str) -> Option<ExtractedRef> {
    let cleaned = strip_trailing(raw);
    let normalized = normalize_url(cleaned)?;
    let url = reqwest::Url::parse(&normalized).ok()?;
    let host = url.host_str().unwrap_or_default();
    let path = url.path();

    if host == "doi.org" || host == "dx.doi.org" {
        return doi_from_url(cleaned).map(doi_ref);
    }

    if host.ends_with("ncbi.nlm.nih.gov") {
        if let Some(caps) = PMC_RE.captures(path) {
            if let Some(digits) = caps.get(1) {
                return Some(pmc_ref(digits.as_str()));
            }
        }
        if host.starts_with("pubmed.") {
            if let Some(digits) = PUBMED_PATH_RE.captures(path).and_then(|c| c.get(1)) {
                return Some(pmid_ref(digits.as_str()));
            }
        }
    }

    if host.ends_with("clinicaltrials.gov") {
        if let Some(found) = NCT_RE.find(cleaned) {
            return Some(nct_ref(found.as_str()));
        }
    }

    if host.ends_with("arxiv.org") {
        if let Some(id) = ARXIV_PATH_RE.captures(path).and_then(|c| c.get(1)) {
            return Some(arxiv_ref(id.as_str().trim_end_matches(".pdf")));
        }
    }

    if let Some(doi) = doi_from_url(cleaned) {
        return Some(doi_ref(doi));
    }

    Some(ExtractedRef {
        kind: RefKind::Url,
        id: normalized,
        url: cleaned.to_string(),
        title: None,
    })
}

fn doi_ref(doi: String) -> ExtractedRef {
    ExtractedRef {
        kind: RefKind::Doi,
        url: format!("https://doi.org/{}", doi),
        id: doi,
        title: None,
    }
}

fn pmc_ref(digits: &str) -> ExtractedRef {
    let id = format!("PMC{}", digits);
    ExtractedRef {
        kind: RefKind::Pmc,
        url: format!("https://pmc.ncbi.nlm.nih.gov/articles/{}/", id),
        id,
        title: None,
    }
}

fn pmid_ref(digits: &str) -> ExtractedRef {
    let trimmed = digits.trim_start_matches('0');
    let id = if trimmed.is_empty() { digits } else { trimmed }.to_string();
    ExtractedRef {
        kind: RefKind::Pmid,
        url: format!("https://pubmed.ncbi.nlm.nih.gov/{}/", id),
        id,
        title: None,
    }
}

fn nct_ref(raw: &str) -> ExtractedRef {
    let id = raw.to_uppercase();
    ExtractedRef {
        kind: RefKind::Nct,
        url: format!("https://clinicaltrials.gov/study/{}", id),
        id,
        title: None,
    }
}

fn arxiv_ref(raw: &str) -> ExtractedRef {
    let id = raw.to_lowercase();
    ExtractedRef {
        kind: RefKind::Arxiv,
        url: format!("https://arxiv.org/abs/{}", id),
        id,
        title: None,
    }
}
