//! 参考文献去重与citekey消歧

use std::collections::{HashMap, HashSet};

use super::bibtex::replace_key;
use super::normalize::{doi_from_url, normalize_doi, normalize_url};
use crate::types::bibliography::{BibEntry, Bibliography};

/// 条目指向的作品标识：DOI优先，其次规范化URL
fn identity(entry: &BibEntry) -> String {
    if entry.is_doi() {
        return format!("doi:{}", normalize_doi(&entry.doi));
    }
    if let Some(url) = &entry.url {
        if let Some(doi) = doi_from_url(url) {
            return format!("doi:{}", doi);
        }
        if let Some(normalized) = normalize_url(url) {
            return format!("url:{}", normalized);
        }
    }
    format!("key:{}", entry.citekey)
}

/// 合并指向同一作品的条目（保留第一条），再为撞键的不同作品追加 -2、-3 后缀，
/// 同时生成占位符替换所需的 DOI/URL → citekey 映射
pub fn deduplicate(entries: Vec<BibEntry>) -> Bibliography {
    let mut kept: Vec<BibEntry> = Vec::new();
    let mut by_identity: HashMap<String, usize> = HashMap::new();
    // (kept下标, 原条目的DOI, 原条目的URL)
    let mut aliases: Vec<(usize, String, Option<String>)> = Vec::new();

    for entry in entries {
        let key = identity(&entry);
        let index = match by_identity.get(&key).copied() {
            Some(index) => {
                tracing::debug!("合并重复文献 {} → {}", entry.citekey, kept[index].citekey);
                index
            }
            None => {
                by_identity.insert(key, kept.len());
                kept.push(entry.clone());
                kept.len() - 1
            }
        };
        aliases.push((index, entry.doi, entry.url));
    }

    let mut used: HashSet<String> = HashSet::new();
    for entry in kept.iter_mut() {
        if used.insert(entry.citekey.clone()) {
            continue;
        }
        let original = entry.citekey.clone();
        let mut suffix = 2;
        let unique = loop {
            let candidate = format!("{}-{}", original, suffix);
            if !used.contains(&candidate) {
                break candidate;
            }
            suffix += 1;
        };
        tracing::debug!("citekey冲突 {} 重命名为 {}", original, unique);
        entry.bibtex = replace_key(&entry.bibtex, &unique).unwrap_or_else(|| {
            entry
                .bibtex
                .replacen(&format!("{{{},", original), &format!("{{{},", unique), 1)
        });
        entry.citekey = unique.clone();
        used.insert(unique);
    }

    let mut bibliography = Bibliography {
        entries: Vec::new(),
        doi_to_citekey: HashMap::new(),
        url_to_citekey: HashMap::new(),
    };
    for (index, doi, url) in aliases {
        let citekey = kept[index].citekey.clone();
        if !doi.is_empty() {
            bibliography
                .doi_to_citekey
                .insert(normalize_doi(&doi), citekey.clone());
        }
        if let Some(url) = url {
            if let Some(doi) = doi_from_url(&url) {
                bibliography
                    .doi_to_citekey
                    .entry(doi)
                    .or_insert_with(|| citekey.clone());
            }
            if let Some(normalized) = normalize_url(&url) {
                bibliography.url_to_citekey.insert(normalized, citekey);
            }
        }
    }
    bibliography.entries = kept;
    bibliography
}
