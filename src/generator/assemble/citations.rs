//! LaTeX引用命令的匹配与改写

use regex::{Captures, Regex};
use std::collections::HashSet;
use std::sync::LazyLock;

/// 匹配 \cite、\citep、\citet*、\citeauthor 等，包括最多两个可选参数与前导空白/波浪号。
/// 命令名、可选参数与花括号之间允许空白和换行，LaTeX同样接受这些写法
pub static CITE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([ \t]*~?)\\(cite[a-zA-Z]*\*?)((?:\s*\[[^\]]*\]){0,2})\s*\{([^{}]*)\}").unwrap()
});

/// 一条引用命令
#[derive(Debug, Clone, PartialEq)]
pub struct CiteCommand<'a> {
    /// 命令前的空白与波浪号
    pub lead: &'a str,
    /// 命令名，例如 citep
    pub name: &'a str,
    /// 可选参数，原样保留
    pub options: &'a str,
    /// 去掉首尾空白后的各个key，空key被忽略
    pub keys: Vec<&'a str>,
    /// 完整的原始文本
    pub raw: &'a str,
}

impl<'a> CiteCommand<'a> {
    fn from_captures(caps: &Captures<'a>) -> Self {
        let text = |i: usize| caps.get(i).map(|m| m.as_str()).unwrap_or_default();
        Self {
            lead: text(1),
            name: text(2),
            options: text(3),
            keys: text(4)
                .split(',')
                .map(str::trim)
                .filter(|key| !key.is_empty())
                .collect(),
            raw: text(0),
        }
    }

    /// 用新的key列表重新生成命令；列表为空时整条命令连同前导空白一起删除
    pub fn render<S: AsRef<str>>(&self, keys: &[S]) -> String {
        if keys.is_empty() {
            return String::new();
        }
        let joined: Vec<&str> = keys.iter().map(AsRef::as_ref).collect();
        format!(
            "{}\\{}{}{{{}}}",
            self.lead,
            self.name,
            self.options,
            joined.join(",")
        )
    }
}

/// 对文档中的每条引用命令调用 `f`，用其返回值替换原命令
pub fn replace_cites<F>(tex: &str, mut f: F) -> String
where
    F: FnMut(&CiteCommand<'_>) -> String,
{
    CITE_RE
        .replace_all(tex, |caps: &Captures| f(&CiteCommand::from_captures(caps)))
        .into_owned()
}

/// 列出全部引用命令
pub fn find_cites(tex: &str) -> Vec<CiteCommand<'_>> {
    CITE_RE
        .captures_iter(tex)
        .map(|caps| CiteCommand::from_captures(&caps))
        .collect()
}

/// 文档中出现过的key，去重并保持首次出现的顺序
pub fn cited_keys(tex: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    find_cites(tex)
        .into_iter()
        .flat_map(|cite| cite.keys)
        .filter(|key| seen.insert(*key))
        .map(str::to_string)
        .collect()
}

/// 从全部引用命令中删除指定的key
pub fn remove_cite_keys(tex: &str, keys: &HashSet<&str>) -> String {
    replace_cites(tex, |cite| {
        let kept: Vec<&str> = cite
            .keys
            .iter()
            .copied()
            .filter(|key| !keys.contains(key))
            .collect();
        cite.render(&kept)
    })
}

/// 删除全部引用命令
pub fn strip_all_cites(tex: &str) -> String {
    CITE_RE.replace_all(tex, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_cites_variants() {
        let tex = r"A~\cite{a, b} and \citep[see][p.~3]{c} or \citet*{d}.";
        let cites = find_cites(tex);
        assert_eq!(cites.len(), 3);
        assert_eq!(cites[0].keys, vec!["a", "b"]);
        assert_eq!(cites[0].lead, "~");
        assert_eq!(cites[1].name, "citep");
        assert_eq!(cites[1].options, "[see][p.~3]");
        assert_eq!(cites[2].name, "citet*");
        assert_eq!(cited_keys(tex), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_remove_cite_keys() {
        let tex = r"One~\cite{a,b}. Two \citep[p.~2]{b}. Three.";
        let keys = HashSet::from(["b"]);
        assert_eq!(remove_cite_keys(tex, &keys), r"One~\cite{a}. Two. Three.");
    }

    #[test]
    fn test_strip_all_cites() {
        let tex = "Claim \\cite{a}.\nOther~\\citet{b} shows.";
        assert_eq!(strip_all_cites(tex), "Claim.\nOther shows.");
    }

    #[test]
    fn test_spaced_and_line_broken_cites() {
        let tex = "A \\cite {a} and \\citep\n{b} or \\citep [p.~2] {c}.";
        assert_eq!(cited_keys(tex), vec!["a", "b", "c"]);

        let keys = HashSet::from(["a", "b"]);
        assert_eq!(remove_cite_keys(tex, &keys), r"A and or \citep [p.~2]{c}.");
        assert_eq!(strip_all_cites(tex), "A and or.");
    }

    #[test]
    fn test_escaped_brace_is_not_a_cite() {
        assert!(find_cites(r"\cite\{a\}").is_empty());
    }
}
