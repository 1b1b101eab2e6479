use crate::config::{Config, LLMProvider};
use crate::generator::workflow::PaperRequest;
use crate::i18n::TargetLanguage;
use anyhow::{Result, anyhow};
use clap::Parser;
use std::path::PathBuf;

/// 默认配置文件名
pub const DEFAULT_CONFIG_FILE: &str = "deepaper.toml";

/// deepaper-rs - 把深度研究对话整理为可编译的科研论文
#[derive(Parser, Debug)]
#[command(name = "deepaper-rs")]
#[command(
    about = "Turns an accumulated deep-research conversation into a compiled scientific paper: references are harvested and resolved, sections are written by LLMs, and the LaTeX source is compiled to PDF through a failure-aware recovery ladder."
)]
#[command(version)]
pub struct Args {
    /// 研究状态JSON文件
    #[arg(short, long)]
    pub state: PathBuf,

    /// 用户ID，用于产物的存储路径
    #[arg(long)]
    pub user_id: String,

    /// 对话ID，用于产物的存储路径
    #[arg(long)]
    pub conversation_id: String,

    /// 作者署名
    #[arg(short, long)]
    pub author: Option<String>,

    /// 配置文件路径
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 将PDF与源码另存到本地目录
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// 是否启用详细日志
    #[arg(short, long)]
    pub verbose: bool,

    /// 高能效模型，优先用于篇幅较小的章节
    #[arg(long)]
    pub model_efficient: Option<String>,

    /// 高质量模型，用于大篇幅章节，以及作为efficient失效情况下的兜底
    #[arg(long)]
    pub model_powerful: Option<String>,

    /// LLM API基地址
    #[arg(long)]
    pub llm_api_base_url: Option<String>,

    /// LLM API KEY
    #[arg(long)]
    pub llm_api_key: Option<String>,

    /// 最大tokens数
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// 温度参数
    #[arg(long)]
    pub temperature: Option<f64>,

    /// LLM Provider (openai, deepseek, openrouter, anthropic, ollama)
    #[arg(long)]
    pub llm_provider: Option<String>,

    /// 论文语言 (en, zh, de, fr)
    #[arg(long)]
    pub target_language: Option<String>,

    /// 发现章节的并发生成数
    #[arg(long)]
    pub discovery_concurrency: Option<usize>,

    /// 是否禁用DOI元数据缓存
    #[arg(long)]
    pub no_cache: bool,
}

impl Args {
    /// 论文生成请求
    pub fn paper_request(&self) -> PaperRequest {
        PaperRequest {
            user_id: self.user_id.clone(),
            conversation_id: self.conversation_id.clone(),
            author: self.author.clone(),
        }
    }

    /// 将CLI参数转换为配置
    pub fn into_config(self) -> Result<Config> {
        let mut config = match &self.config {
            // 显式指定的配置文件必须可读
            Some(config_path) => Config::from_file(config_path)?,
            None => {
                let default_config_path = std::env::current_dir()
                    .unwrap_or_else(|_| PathBuf::from("."))
                    .join(DEFAULT_CONFIG_FILE);
                if default_config_path.exists() {
                    Config::from_file(&default_config_path)?
                } else {
                    Config::default()
                }
            }
        };

        // 覆盖LLM配置
        if let Some(provider_str) = self.llm_provider {
            config.llm.provider = provider_str
                .parse::<LLMProvider>()
                .map_err(|e| anyhow!(e))?;
        }
        if let Some(llm_api_base_url) = self.llm_api_base_url {
            config.llm.api_base_url = llm_api_base_url;
        }
        if let Some(llm_api_key) = self.llm_api_key {
            config.llm.api_key = llm_api_key;
        }
        if let Some(model_efficient) = self.model_efficient {
            config.llm.model_efficient = model_efficient;
        }
        if let Some(model_powerful) = self.model_powerful {
            config.llm.model_powerful = model_powerful;
        }
        if let Some(max_tokens) = self.max_tokens {
            config.llm.max_tokens = max_tokens;
        }
        if let Some(temperature) = self.temperature {
            config.llm.temperature = temperature;
        }

        // 生成配置
        if let Some(target_language_str) = self.target_language {
            if let Ok(target_language) = target_language_str.parse::<TargetLanguage>() {
                config.generation.target_language = target_language;
            } else {
                tracing::warn!(
                    "⚠️ 未知的目标语言: {}，使用 {}",
                    target_language_str,
                    config.generation.target_language.display_name()
                );
            }
        }
        if let Some(concurrency) = self.discovery_concurrency {
            config.generation.discovery_concurrency = concurrency.max(1);
        }
        if let Some(author) = self.author {
            config.author = author;
        }

        // 缓存配置
        if self.no_cache {
            config.cache.enabled = false;
        }

        config.verbose = config.verbose || self.verbose;

        Ok(config)
    }
}

// Include tests
#[cfg(test)]
mod tests;
