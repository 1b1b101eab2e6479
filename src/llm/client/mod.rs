//! LLM客户端 - 提供统一的LLM服务接口

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use rig::OneOrMany;
use rig::message::{ImageMediaType, Message, UserContent};
use std::future::Future;
use std::time::Duration;

use crate::config::LLMConfig;
use crate::llm::LanguageModel;
use crate::llm::client::utils::evaluate_befitting_model;

mod providers;
pub mod types;
pub mod utils;

use providers::ProviderClient;
use types::{ImageAttachment, ModelRequest};

/// LLM客户端 - 提供统一的LLM服务接口
#[derive(Clone)]
pub struct LLMClient {
    config: LLMConfig,
    client: ProviderClient,
}

impl LLMClient {
    /// 创建新的LLM客户端
    pub fn new(config: LLMConfig) -> Result<Self> {
        let client = ProviderClient::new(&config)?;
        Ok(Self { client, config })
    }

    /// 通用重试逻辑，用于处理异步操作的重试机制
    async fn retry_with_backoff<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, anyhow::Error>>,
    {
        let max_retries = self.config.retry_attempts.max(1);
        let retry_delay_ms = self.config.retry_delay_ms;
        let mut retries = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    retries += 1;
                    tracing::warn!(
                        "❌ 调用模型服务出错，重试中 (第 {} / {}次尝试): {}",
                        retries,
                        max_retries,
                        err
                    );
                    if retries >= max_retries {
                        return Err(err);
                    }
                    tokio::time::sleep(std::time::Duration::from_millis(retry_delay_ms)).await;
                }
            }
        }
    }

    async fn complete_inner(
        &self,
        request: &ModelRequest,
        befitting_model: String,
        fallover_model: Option<String>,
    ) -> Result<String> {
        let max_tokens = request.max_tokens.unwrap_or(self.config.max_tokens);
        let agent = self.client.create_agent(
            &befitting_model,
            &request.system_prompt,
            &self.config,
            max_tokens,
        );

        let timeout = Duration::from_secs(self.config.timeout_seconds);
        let result = self
            .retry_with_backoff(|| {
                with_timeout(timeout, async { agent.prompt(build_message(request)?).await })
            })
            .await;

        match (result, fallover_model) {
            (Ok(text), _) => Ok(text),
            (Err(e), Some(model)) => {
                tracing::warn!(
                    "❌ 调用模型服务出错，尝试 {} 次均失败，尝试使用备选模型{}...{}",
                    self.config.retry_attempts,
                    model,
                    e
                );
                Box::pin(self.complete_inner(request, model, None)).await
            }
            (Err(e), None) => Err(e),
        }
    }
}

#[async_trait]
impl LanguageModel for LLMClient {
    async fn complete(&self, request: &ModelRequest) -> Result<String> {
        let (befitting_model, fallover_model) = evaluate_befitting_model(&self.config, request);
        self.complete_inner(request, befitting_model, fallover_model)
            .await
    }

    /// 检查模型连接和功能是否正常
    async fn check_connection(&self) -> Result<()> {
        tracing::info!("🔄 正在检查模型连接...");
        let request = ModelRequest::new("You are a helpful assistant.", "Hello").with_max_tokens(16);
        match self.complete(&request).await {
            Ok(_) => {
                tracing::info!("✅ 模型连接正常");
                Ok(())
            }
            Err(e) => {
                tracing::error!("❌ 模型连接失败: {}", e);
                Err(e)
            }
        }
    }
}

/// 单次模型调用的超时，超时按普通错误进入重试
async fn with_timeout<T, Fut>(timeout: Duration, call: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(anyhow!(
            "model call timed out after {}s",
            timeout.as_secs_f64()
        )),
    }
}

/// 构造用户消息，有图片时使用多段内容
fn build_message(request: &ModelRequest) -> Result<Message> {
    if request.images.is_empty() {
        return Ok(Message::user(request.user_prompt.clone()));
    }

    let mut content = vec![UserContent::text(request.user_prompt.clone())];
    for image in &request.images {
        content.push(UserContent::image_base64(
            image.data.clone(),
            media_type(image),
            None,
        ));
    }
    Ok(Message::User {
        content: OneOrMany::many(content)?,
    })
}

fn media_type(image: &ImageAttachment) -> Option<ImageMediaType> {
    match image.media_type.as_str() {
        "image/png" => Some(ImageMediaType::PNG),
        "image/jpeg" => Some(ImageMediaType::JPEG),
        "image/gif" => Some(ImageMediaType::GIF),
        "image/webp" => Some(ImageMediaType::WEBP),
        _ => None,
    }
}
