//! DOI与URL的归一化

use regex::Regex;
use reqwest::Url;
use std::sync::LazyLock;

static VALID_DOI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^10\.\d{4,9}/\S+$").unwrap());
static EMBEDDED_DOI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)10\.\d{4,9}(?:/|%2f)[^\s?#&]+").unwrap());

const DOI_PREFIXES: [&str; 7] = [
    "https://doi.org/",
    "http://doi.org/",
    "https://dx.doi.org/",
    "http://dx.doi.org/",
    "doi.org/",
    "dx.doi.org/",
    "doi:",
];

const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', '"', '\'', '>', '*'];

/// 归一化DOI：去掉解析器前缀、还原LaTeX转义、统一小写并去掉尾部标点。
///
/// 结果是不动点，对其再次调用返回相同的值。
pub fn normalize_doi(raw: &str) -> String {
    // 第一步之后每一步都只会缩短字符串，循环必然终止
    let mut current = normalize_doi_step(raw);
    loop {
        let next = normalize_doi_step(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn normalize_doi_step(raw: &str) -> String {
    let mut doi = unescape_latex(raw.trim()).to_lowercase();

    for prefix in DOI_PREFIXES {
        if let Some(rest) = doi.strip_prefix(prefix) {
            doi = rest.trim_start().to_string();
            break;
        }
    }

    doi = doi.replace("%2f", "/");
    strip_trailing(&doi).trim().to_string()
}

/// 还原常见的LaTeX转义
pub fn unescape_latex(text: &str) -> String {
    text.replace(r"\_", "_")
        .replace(r"\%", "%")
        .replace(r"\&", "&")
        .replace(r"\#", "#")
        .replace(r"\$", "$")
}

/// 去掉尾部标点，以及不成对的右括号
pub fn strip_trailing(text: &str) -> &str {
    let mut end = text;
    loop {
        let before = end;
        end = end.trim_end_matches(TRAILING_PUNCTUATION);
        for (open, close) in [('(', ')'), ('[', ']'), ('{', '}')] {
            if end.ends_with(close) && end.matches(close).count() > end.matches(open).count() {
                end = &end[..end.len() - close.len_utf8()];
            }
        }
        if end == before {
            return end;
        }
    }
}

pub fn is_valid_doi(doi: &str) -> bool {
    VALID_DOI_RE.is_match(doi)
}

/// 归一化URL：统一https、小写主机名、去掉www.前缀、片段和结尾斜杠。
/// 非http(s)地址返回None。
pub fn normalize_url(raw: &str) -> Option<String> {
    let trimmed = strip_trailing(raw.trim());
    let url = Url::parse(&unescape_latex(trimmed)).ok()?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }

    let host = url.host_str()?.to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);

    let mut normalized = format!("https://{}", host);
    if let Some(port) = url.port() {
        normalized.push_str(&format!(":{}", port));
    }
    normalized.push_str(url.path().trim_end_matches('/'));
    if let Some(query) = url.query().filter(|q| !q.is_empty()) {
        normalized.push('?');
        normalized.push_str(query);
    }
    Some(normalized)
}

/// 从URL中取出嵌入的DOI，例如出版社落地页或doi.org链接
pub fn doi_from_url(url: &str) -> Option<String> {
    let found = EMBEDDED_DOI_RE.find(url)?;
    let doi = normalize_doi(found.as_str());
    is_valid_doi(&doi).then_some(doi)
}
