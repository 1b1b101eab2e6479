use thiserror::Error;

use crate::generator::assemble::validator::ValidationError;

/// 导致整次论文生成失败的错误
#[derive(Debug, Error)]
pub enum PaperError {
    /// 章节生成失败，index为发现章节的序号
    #[error("section `{section}` failed: {reason}")]
    Section {
        section: String,
        index: Option<usize>,
        reason: String,
    },

    #[error("malformed citation commands: {}", .0.join("; "))]
    MalformedCitation(Vec<String>),

    /// 两轮降级编译后仍然失败，携带编译日志的末尾
    #[error("LaTeX compilation failed after all recovery passes:\n{log_tail}")]
    Compile { log_tail: String },

    #[error("storage error: {0}")]
    Storage(#[source] anyhow::Error),

    #[error("workspace error: {0}")]
    Workspace(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<ValidationError> for PaperError {
    fn from(error: ValidationError) -> Self {
        match error {
            ValidationError::MalformedCitation(commands) => PaperError::MalformedCitation(commands),
        }
    }
}
