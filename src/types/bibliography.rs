use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::generator::references::bibtex::BibRecord;
use crate::generator::references::normalize::{normalize_doi, normalize_url};

/// 参考文献条目，每个唯一的文献对应一条
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BibEntry {
    /// 归一化后的DOI，非DOI引用为空字符串
    pub doi: String,
    pub citekey: String,
    /// 完整的BibTeX记录，记录键与citekey一致
    pub bibtex: String,
    pub url: Option<String>,
}

impl BibEntry {
    pub fn is_doi(&self) -> bool {
        !self.doi.is_empty()
    }
}

/// 提供给章节生成器的只读citekey视图
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitationKeyInfo {
    pub citekey: String,
    /// 便于模型理解的展示文字，例如 `Smith et al. (2020). Title`
    pub label: String,
}

/// 去重后的参考文献集合及占位符映射
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Bibliography {
    pub entries: Vec<BibEntry>,
    pub doi_to_citekey: HashMap<String, String>,
    pub url_to_citekey: HashMap<String, String>,
}

impl Bibliography {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 全部合法的citekey
    pub fn known_keys(&self) -> HashSet<String> {
        self.entries.iter().map(|e| e.citekey.clone()).collect()
    }

    pub fn citation_keys(&self) -> Vec<CitationKeyInfo> {
        self.entries
            .iter()
            .map(|entry| CitationKeyInfo {
                citekey: entry.citekey.clone(),
                label: entry_label(entry),
            })
            .collect()
    }

    /// 根据任意写法的DOI查找citekey
    pub fn lookup_doi(&self, raw: &str) -> Option<&str> {
        self.doi_to_citekey
            .get(&normalize_doi(raw))
            .map(String::as_str)
    }

    /// 根据任意写法的URL查找citekey
    pub fn lookup_url(&self, raw: &str) -> Option<&str> {
        let normalized = normalize_url(raw)?;
        self.url_to_citekey.get(&normalized).map(String::as_str)
    }

    /// 生成 references.bib 的内容
    pub fn to_bib_file(&self) -> String {
        let mut content = String::new();
        for entry in &self.entries {
            content.push_str(entry.bibtex.trim());
            content.push_str("\n\n");
        }
        content
    }
}

fn entry_label(entry: &BibEntry) -> String {
    let Some(record) = BibRecord::parse(&entry.bibtex) else {
        return entry.citekey.clone();
    };

    let authors = record
        .field("author")
        .map(|a| a.split(" and ").map(str::trim).filter(|a| !a.is_empty()).collect::<Vec<_>>())
        .unwrap_or_default();
    let lead = authors.first().map(|first| {
        let surname = match first.split_once(',') {
            Some((last, _)) => last.trim(),
            None => first.split_whitespace().last().unwrap_or(first),
        };
        let surname = surname.trim_matches(|c| c == '{' || c == '}');
        if authors.len() > 1 {
            format!("{} et al.", surname)
        } else {
            surname.to_string()
        }
    });
    let year = record.field("year").unwrap_or("n.d.");
    let title = record
        .field("title")
        .map(|t| t.replace(['{', '}'], ""))
        .unwrap_or_default();

    match (lead, title.is_empty()) {
        (Some(lead), false) => format!("{} ({}). {}", lead, year, title),
        (Some(lead), true) => format!("{} ({})", lead, year),
        (None, false) => format!("{} ({})", title, year),
        (None, true) => entry.citekey.clone(),
    }
}
