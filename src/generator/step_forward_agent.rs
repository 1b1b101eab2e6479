use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::generator::compose::decode::{ModelDecode, decode};
use crate::generator::context::PaperContext;
use crate::llm::{ImageAttachment, LanguageModel, ModelRequest};
use crate::types::bibliography::CitationKeyInfo;
use crate::types::paper::RequiredFields;

/// Prompt模板配置
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    /// 系统提示词
    pub system_prompt: String,
    /// 开头的说明性指令
    pub opening_instruction: String,
    /// 结尾的强调性指令
    pub closing_instruction: String,
}

/// 单个章节生成失败的原因
#[derive(Debug, Error)]
pub enum SectionError {
    #[error("model request failed: {0}")]
    Model(#[source] anyhow::Error),
    /// 重试一次后模型输出仍然不是合法的JSON对象
    #[error("invalid model output after retry: {0}")]
    InvalidJson(String),
}

/// 通用的prompt构建器
pub struct GeneratorPromptBuilder {
    template: PromptTemplate,
}

impl GeneratorPromptBuilder {
    pub fn new(template: PromptTemplate) -> Self {
        Self { template }
    }

    /// 构建用户提示词：说明、调研材料、可用citekey、输出格式、强调指令
    pub fn build_user_prompt<T: JsonSchema>(
        &self,
        research_material: &str,
        citation_keys: &[CitationKeyInfo],
    ) -> String {
        let mut prompt = String::new();

        prompt.push_str(&self.template.opening_instruction);
        prompt.push_str("\n\n");

        prompt.push_str("## Research material\n");
        prompt.push_str(research_material.trim_end());
        prompt.push_str("\n\n");

        prompt.push_str("## Allowed citation keys\n");
        if citation_keys.is_empty() {
            prompt.push_str(
                "No references are available. Do not use \\cite or any other citation command.\n",
            );
        } else {
            prompt.push_str(
                "Cite only with \\cite{key} using keys from this list. Never invent keys and never cite DOIs or URLs directly.\n",
            );
            for info in citation_keys {
                prompt.push_str(&format!("- {}: {}\n", info.citekey, info.label));
            }
        }
        prompt.push('\n');

        let schema = schemars::schema_for!(T);
        prompt.push_str("## Output format\n");
        prompt.push_str(
            "Respond with exactly one JSON object matching this JSON Schema. Inside JSON strings every LaTeX backslash must be escaped as \\\\.\n",
        );
        prompt.push_str(&serde_json::to_string_pretty(&schema).unwrap_or_default());
        prompt.push_str("\n\n");

        prompt.push_str(&self.template.closing_instruction);
        prompt
    }
}

/// 章节生成Agent，一次模型调用产出一个结构化章节
#[async_trait]
pub trait StepForwardAgent: Send + Sync {
    /// Agent的输出类型
    type Output: JsonSchema + DeserializeOwned + RequiredFields + Send + 'static;

    /// Agent类型标识，用于日志与错误信息
    fn agent_type(&self) -> String;

    /// 发现章节的序号
    fn section_index(&self) -> Option<usize> {
        None
    }

    /// Prompt模板配置
    fn prompt_template(&self) -> PromptTemplate;

    /// 插入到调研材料部分的内容
    fn provide_research_material(&self, context: &PaperContext) -> String;

    /// 随请求发送的图片
    fn images(&self) -> Vec<ImageAttachment> {
        Vec::new()
    }

    /// 输出长度上限，None时使用全局配置
    fn max_tokens(&self) -> Option<u32> {
        None
    }

    async fn execute(
        &self,
        context: &PaperContext,
        citation_keys: &[CitationKeyInfo],
    ) -> Result<Self::Output, SectionError> {
        let mut template = self.prompt_template();

        // 根据配置的目标语言添加语言指令
        let language_instruction = context.config.generation.target_language.prompt_instruction();
        template.system_prompt = format!("{}\n\n{}", template.system_prompt, language_instruction);

        let material = self.provide_research_material(context);
        let builder = GeneratorPromptBuilder::new(template.clone());
        let user_prompt = builder.build_user_prompt::<Self::Output>(&material, citation_keys);

        let mut request =
            ModelRequest::new(template.system_prompt, user_prompt).with_images(self.images());
        if let Some(max_tokens) = self.max_tokens() {
            request = request.with_max_tokens(max_tokens);
        }

        tracing::info!("✍️ 正在生成章节: {}", self.agent_type());
        let output =
            request_json::<Self::Output>(context.llm.as_ref(), request, &self.agent_type()).await?;
        tracing::info!("✅ 章节生成完成: {}", self.agent_type());
        Ok(output)
    }
}

/// 请求模型并严格解码JSON输出；解码失败时附带缺陷说明重试一次
pub async fn request_json<T>(
    llm: &dyn LanguageModel,
    request: ModelRequest,
    section: &str,
) -> Result<T, SectionError>
where
    T: DeserializeOwned + RequiredFields + Send,
{
    let raw = llm.complete(&request).await.map_err(SectionError::Model)?;
    let reason = match decode::<T>(&raw) {
        ModelDecode::Parsed(value) => return Ok(value),
        ModelDecode::ParseError(reason) => reason,
    };

    tracing::warn!("⚠️ {} 的模型输出无法解析（{}），带修正说明重试一次", section, reason);
    let mut retry = request;
    retry.user_prompt = format!(
        "{}\n\n## Correction\nYour previous response was rejected: {}.\nReturn ONLY one valid JSON object that matches the schema above, with every required field filled. No prose, no code fences.",
        retry.user_prompt, reason
    );

    let raw = llm.complete(&retry).await.map_err(SectionError::Model)?;
    match decode::<T>(&raw) {
        ModelDecode::Parsed(value) => Ok(value),
        ModelDecode::ParseError(reason) => Err(SectionError::InvalidJson(reason)),
    }
}
