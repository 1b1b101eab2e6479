use anyhow::Result;
use async_trait::async_trait;

pub mod client;

pub use client::types::{ImageAttachment, ModelRequest};

/// 语言模型服务接口：输入提示词与可选图片，返回模型的原始文本输出
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, request: &ModelRequest) -> Result<String>;

    /// 启动时检查服务是否可用
    async fn check_connection(&self) -> Result<()> {
        Ok(())
    }
}
