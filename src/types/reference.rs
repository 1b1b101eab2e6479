use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// 引用标识的类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RefKind {
    Doi,
    Pmc,
    Pmid,
    Nct,
    Arxiv,
    Url,
}

impl RefKind {
    /// 非DOI引用在参考文献条目中的说明文字
    pub fn catalog_note(&self) -> &'static str {
        match self {
            RefKind::Doi => "Digital Object Identifier record",
            RefKind::Pmc => "PubMed Central article",
            RefKind::Pmid => "PubMed record",
            RefKind::Nct => "ClinicalTrials.gov record",
            RefKind::Arxiv => "arXiv preprint",
            RefKind::Url => "Online resource",
        }
    }

    /// 生成citekey时使用的前缀
    pub fn key_prefix(&self) -> &'static str {
        match self {
            RefKind::Doi => "doi",
            RefKind::Pmc => "pmc",
            RefKind::Pmid => "pmid",
            RefKind::Nct => "nct",
            RefKind::Arxiv => "arxiv",
            RefKind::Url => "web",
        }
    }
}

impl Display for RefKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let str = match self {
            RefKind::Doi => "DOI",
            RefKind::Pmc => "PMC",
            RefKind::Pmid => "PMID",
            RefKind::Nct => "NCT",
            RefKind::Arxiv => "arXiv",
            RefKind::Url => "URL",
        };
        write!(f, "{}", str)
    }
}

/// 从任务输出中提取出的一条引用
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedRef {
    pub kind: RefKind,
    /// 归一化后的标识（DOI为小写形式，URL为规范化后的地址）
    pub id: String,
    /// 可访问该引用的地址
    pub url: String,
    /// Markdown链接文字等上下文中带出的标题
    pub title: Option<String>,
}

impl ExtractedRef {
    /// 去重使用的键
    pub fn dedup_key(&self) -> String {
        format!("{}:{}", self.kind.key_prefix(), self.id.to_lowercase())
    }
}
