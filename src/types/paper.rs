use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 结构化模型输出中必须非空的字段检查
pub trait RequiredFields {
    /// 返回缺失或为空的字段名
    fn missing_fields(&self) -> Vec<&'static str>;
}

/// 论文的标题、摘要与关键词
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PaperMetadata {
    /// 论文标题，纯文本
    pub title: String,
    /// 论文摘要，LaTeX片段，可使用\cite{citekey}
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// 模型自述使用过的citekey，仅作参考
    #[serde(default)]
    pub citations_used: Vec<String>,
}

impl RequiredFields for PaperMetadata {
    fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.title.trim().is_empty() {
            missing.push("title");
        }
        if self.abstract_text.trim().is_empty() {
            missing.push("abstract");
        }
        missing
    }
}

/// 背景章节
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BackgroundSection {
    /// LaTeX正文，不包含\section命令
    pub content: String,
    #[serde(default)]
    pub citations_used: Vec<String>,
}

impl RequiredFields for BackgroundSection {
    fn missing_fields(&self) -> Vec<&'static str> {
        if self.content.trim().is_empty() {
            vec!["content"]
        } else {
            Vec::new()
        }
    }
}

/// 插图的说明文字
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FigureCaption {
    /// 必须是提供给模型的插图文件名之一
    pub filename: String,
    pub caption: String,
}

/// 单个发现对应的章节
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DiscoverySection {
    /// 章节标题，纯文本
    pub title: String,
    /// LaTeX正文，不包含\section命令
    pub content: String,
    #[serde(default)]
    pub figures: Vec<FigureCaption>,
    #[serde(default)]
    pub citations_used: Vec<String>,
    /// 发现在研究状态中的序号，由流水线回填
    #[serde(skip)]
    pub index: usize,
}

impl RequiredFields for DiscoverySection {
    fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.title.trim().is_empty() {
            missing.push("title");
        }
        if self.content.trim().is_empty() {
            missing.push("content");
        }
        missing
    }
}

/// 流水线本地的插图信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FigureInfo {
    /// 工作目录figures/下的稳定文件名，例如 fig1_2.png
    pub filename: String,
    /// 来自任务产物描述的说明文字种子
    pub caption_seed: String,
    pub source_job_id: String,
    /// 对象存储中的原始路径
    pub original_path: String,
}

/// 一次编译的结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompileResult {
    pub success: bool,
    pub pdf_path: Option<PathBuf>,
    pub logs: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_abstract_rename() {
        let metadata: PaperMetadata =
            serde_json::from_str(r#"{"title": "T", "abstract": "A"}"#).unwrap();
        assert_eq!(metadata.abstract_text, "A");
        assert!(metadata.missing_fields().is_empty());
    }

    #[test]
    fn test_missing_fields() {
        let section: DiscoverySection =
            serde_json::from_str(r#"{"title": " ", "content": ""}"#).unwrap();
        assert_eq!(section.missing_fields(), vec!["title", "content"]);
    }
}
