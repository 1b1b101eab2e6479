//! 编译前的文档校验
//!
//! 依次执行：占位符改写、引用命令格式的硬校验、未知citekey清理、结构性检查。
//! 结构性检查只记录警告，不阻断流程。

use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use thiserror::Error;

use super::citations::{find_cites, replace_cites};
use crate::generator::references::normalize::{strip_trailing, unescape_latex};
use crate::types::bibliography::Bibliography;

static ESCAPED_BRACE_CITE_RE: LazyLock<Regex> =
    LazyLock::new(|| {
        Regex::new(r"(?m)\\cite[a-zA-Z]*\*?(?:\s*\[[^\]]*\]){0,2}\s*\\\{[^\n]*?(?:\\\}|$)").unwrap()
    });
static BRACKET_DOI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(^|[^\\])\[\s*(?:doi:\s*|https?://(?:dx\.)?doi\.org/)(10\.\d{4,9}/[^\]\s]+)\s*\]",
    )
    .unwrap()
});
static BRACKET_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^|[^\\])\[\s*(https?://[^\]\s]+)\s*\]").unwrap());
static DOI_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bdoi:\s*(10\.\d{4,9}/[^\s{}\]]+)").unwrap());
static RAW_DOI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^|[\s(])(10\.\d{4,9}/[^\s{}\]]+)").unwrap());
static ENV_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\(begin|end)\{([^}]+)\}").unwrap());
static SECTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\section\*?\{([^}]*)\}").unwrap());
static SECTION_END_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\bibliographystyle|\\end\{document\}").unwrap());

/// 阻断编译的校验错误
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// 无法修复的引用命令，例如 `\cite\{x\}`、key中含空白或 `\_`
    #[error("malformed citation commands: {}", .0.join("; "))]
    MalformedCitation(Vec<String>),
}

/// 校验过程的统计
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    /// 被改写为citekey的占位符数量
    pub rewritten: usize,
    /// 因不在已知集合中而删除的citekey
    pub stripped: Vec<String>,
    /// 结构性警告
    pub warnings: Vec<String>,
}

/// 校验并清理文档，返回可以交给编译器的LaTeX源码
pub fn validate(
    tex: &str,
    bibliography: &Bibliography,
    min_section_chars: usize,
) -> Result<(String, ValidationReport), ValidationError> {
    let mut report = ValidationReport::default();

    let tex = rewrite_placeholders(tex, bibliography, &mut report);

    let malformed = find_malformed(&tex);
    if !malformed.is_empty() {
        return Err(ValidationError::MalformedCitation(malformed));
    }

    let known = bibliography.known_keys();
    let tex = replace_cites(&tex, |cite| {
        let kept: Vec<&str> = cite
            .keys
            .iter()
            .copied()
            .filter(|key| {
                let known = known.contains(*key);
                if !known {
                    tracing::warn!("⚠️ 删除未知的citekey `{}`", key);
                    report.stripped.push(key.to_string());
                }
                known
            })
            .collect();
        cite.render(&kept)
    });

    report.warnings = structural_warnings(&tex, min_section_chars);
    for warning in &report.warnings {
        tracing::warn!("⚠️ 结构检查: {}", warning);
    }

    Ok((tex, report))
}

/// 把DOI、URL占位符改写为真实的citekey
fn rewrite_placeholders(tex: &str, bibliography: &Bibliography, report: &mut ValidationReport) -> String {
    let mut rewritten = 0;

    // 引用命令内部的DOI/URL
    let tex = replace_cites(tex, |cite| {
        let mut keys: Vec<String> = Vec::with_capacity(cite.keys.len());
        let mut inline_urls: Vec<String> = Vec::new();
        for key in &cite.keys {
            if looks_like_doi(key) {
                match bibliography.lookup_doi(key) {
                    Some(citekey) => {
                        rewritten += 1;
                        keys.push(citekey.to_string());
                    }
                    None => tracing::warn!("⚠️ DOI占位符 `{}` 没有对应的文献，已删除", key),
                }
            } else if key.starts_with("http://") || key.starts_with("https://") {
                let url = unescape_latex(key);
                match bibliography.lookup_url(&url) {
                    Some(citekey) => {
                        rewritten += 1;
                        keys.push(citekey.to_string());
                    }
                    None => inline_urls.push(url),
                }
            } else {
                keys.push(key.to_string());
            }
        }

        let mut rendered = cite.render(&keys);
        for url in inline_urls {
            rendered.push_str(&format!(" \\url{{{}}}", url));
        }
        rendered
    });

    // [doi:10.x/y] 与 [https://doi.org/10.x/y]
    let tex = BRACKET_DOI_RE.replace_all(&tex, |caps: &Captures| {
        let lead = &caps[1];
        match bibliography.lookup_doi(&caps[2]) {
            Some(citekey) => {
                rewritten += 1;
                format!("{}\\cite{{{}}}", lead, citekey)
            }
            None => {
                tracing::warn!("⚠️ DOI占位符 `{}` 没有对应的文献，已删除", &caps[2]);
                lead.to_string()
            }
        }
    });

    // [https://...]
    let tex = BRACKET_URL_RE.replace_all(&tex, |caps: &Captures| {
        let lead = &caps[1];
        let url = unescape_latex(&caps[2]);
        match bibliography.lookup_url(&url) {
            Some(citekey) => {
                rewritten += 1;
                format!("{}\\cite{{{}}}", lead, citekey)
            }
            None => format!("{}\\url{{{}}}", lead, url),
        }
    });

    // doi:10.x/y
    let tex = DOI_PREFIX_RE.replace_all(&tex, |caps: &Captures| {
        replace_bare_doi("", &caps[1], bibliography, &mut rewritten)
    });

    // 空白或左括号之后的裸DOI
    let tex = RAW_DOI_RE.replace_all(&tex, |caps: &Captures| {
        replace_bare_doi(&caps[1], &caps[2], bibliography, &mut rewritten)
    });

    report.rewritten = rewritten;
    tex.into_owned()
}

fn replace_bare_doi(
    lead: &str,
    matched: &str,
    bibliography: &Bibliography,
    rewritten: &mut usize,
) -> String {
    let doi = strip_trailing(matched);
    let tail = &matched[doi.len()..];
    match bibliography.lookup_doi(doi) {
        Some(citekey) => {
            *rewritten += 1;
            format!("{}\\cite{{{}}}{}", lead, citekey, tail)
        }
        None => {
            tracing::warn!("⚠️ DOI `{}` 没有对应的文献，已删除", doi);
            format!("{}{}", lead, tail)
        }
    }
}

fn looks_like_doi(key: &str) -> bool {
    let lowered = key.to_lowercase();
    lowered.starts_with("10.")
        || lowered.starts_with("doi:")
        || lowered.contains("doi.org/")
}

/// 无法自动修复的引用命令
fn find_malformed(tex: &str) -> Vec<String> {
    let mut malformed: Vec<String> = ESCAPED_BRACE_CITE_RE
        .find_iter(tex)
        .map(|m| m.as_str().to_string())
        .collect();

    for cite in find_cites(tex) {
        let bad_key = cite
            .keys
            .iter()
            .any(|key| key.contains(char::is_whitespace) || key.contains('\\'));
        if bad_key {
            malformed.push(cite.raw.trim_start_matches([' ', '\t', '~']).to_string());
        }
    }
    malformed
}

fn structural_warnings(tex: &str, min_section_chars: usize) -> Vec<String> {
    let mut warnings = Vec::new();

    let dollars = count_unescaped(tex, "$");
    if dollars % 2 != 0 {
        warnings.push(format!("unbalanced inline math: {} unescaped `$`", dollars));
    }
    for (open, close) in [(r"\[", r"\]"), (r"\(", r"\)")] {
        let (opened, closed) = (count_unescaped(tex, open), count_unescaped(tex, close));
        if opened != closed {
            warnings.push(format!(
                "unbalanced math delimiters: {} `{}` vs {} `{}`",
                opened, open, closed, close
            ));
        }
    }

    let mut environments: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    for caps in ENV_RE.captures_iter(tex) {
        let (Some(kind), Some(name)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        let counts = environments.entry(name.as_str()).or_default();
        if kind.as_str() == "begin" {
            counts.0 += 1;
        } else {
            counts.1 += 1;
        }
    }
    for (name, (begins, ends)) in environments {
        if begins != ends {
            warnings.push(format!(
                "unbalanced environment `{}`: {} begin vs {} end",
                name, begins, ends
            ));
        }
    }

    let headers: Vec<_> = SECTION_RE.captures_iter(tex).collect();
    for (i, caps) in headers.iter().enumerate() {
        let (Some(whole), Some(title)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let start = whole.end();
        let next_header = headers
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(tex.len());
        let end = SECTION_END_RE
            .find_at(tex, start)
            .map(|m| m.start().min(next_header))
            .unwrap_or(next_header);
        let body_chars = tex[start..end].trim().chars().count();
        if body_chars < min_section_chars {
            warnings.push(format!(
                "section `{}` is short ({} chars)",
                title.as_str(),
                body_chars
            ));
        }
    }

    warnings
}

/// 统计未被反斜杠转义的出现次数
fn count_unescaped(text: &str, pattern: &str) -> usize {
    text.match_indices(pattern)
        .filter(|(index, _)| {
            let preceding = text[..*index].chars().rev().take_while(|c| *c == '\\').count();
            preceding % 2 == 0
        })
        .count()
}
