use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use crate::i18n::TargetLanguage;

/// LLM Provider类型
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub enum LLMProvider {
    #[serde(rename = "openai")]
    #[default]
    OpenAI,
    #[serde(rename = "deepseek")]
    DeepSeek,
    #[serde(rename = "openrouter")]
    OpenRouter,
    #[serde(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "ollama")]
    Ollama,
}

impl std::fmt::Display for LLMProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LLMProvider::OpenAI => write!(f, "openai"),
            LLMProvider::DeepSeek => write!(f, "deepseek"),
            LLMProvider::OpenRouter => write!(f, "openrouter"),
            LLMProvider::Anthropic => write!(f, "anthropic"),
            LLMProvider::Ollama => write!(f, "ollama"),
        }
    }
}

impl std::str::FromStr for LLMProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(LLMProvider::OpenAI),
            "deepseek" => Ok(LLMProvider::DeepSeek),
            "openrouter" => Ok(LLMProvider::OpenRouter),
            "anthropic" => Ok(LLMProvider::Anthropic),
            "ollama" => Ok(LLMProvider::Ollama),
            _ => Err(format!("Unknown provider: {}", s)),
        }
    }
}

/// 对象存储后端类型
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub enum StorageBackend {
    /// 本地文件系统，适合单机运行与调试
    #[serde(rename = "local")]
    #[default]
    Local,
    /// S3兼容的对象存储，支持预签名链接
    #[serde(rename = "s3")]
    S3,
}

/// 应用程序配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct Config {
    /// 每次论文生成的临时工作目录的父目录
    pub workspace_root: PathBuf,

    /// 内部状态目录（论文记录、缓存等）
    pub internal_path: PathBuf,

    /// 论文作者署名
    pub author: String,

    /// LLM模型配置
    pub llm: LLMConfig,

    /// 文献元数据服务配置
    pub metadata: MetadataConfig,

    /// 章节生成配置
    pub generation: GenerationConfig,

    /// LaTeX编译配置
    pub compile: CompileConfig,

    /// 对象存储配置
    pub storage: StorageConfig,

    /// 缓存配置
    pub cache: CacheConfig,

    /// 是否启用详细日志
    pub verbose: bool,
}

/// LLM模型配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LLMConfig {
    /// LLM Provider类型
    pub provider: LLMProvider,

    /// LLM API KEY
    pub api_key: String,

    /// LLM API基地址
    pub api_base_url: String,

    /// 高能效模型，优先用于篇幅较小的章节
    pub model_efficient: String,

    /// 高质量模型，用于大篇幅章节，以及作为efficient失效情况下的兜底
    pub model_powerful: String,

    /// 最大tokens
    pub max_tokens: u32,

    /// 温度
    pub temperature: f64,

    /// 重试次数
    pub retry_attempts: u32,

    /// 重试间隔（毫秒）
    pub retry_delay_ms: u64,

    /// 超时时间（秒）
    pub timeout_seconds: u64,
}

/// DOI元数据解析服务配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct MetadataConfig {
    /// 主服务（DOI内容协商）
    pub primary_base_url: String,

    /// 备用服务（Crossref transform接口）
    pub fallback_base_url: String,

    /// 单次请求超时（毫秒）
    pub request_timeout_ms: u64,

    /// 每个服务的最大尝试次数
    pub retry_attempts: u32,

    /// 指数退避的基准间隔（毫秒）
    pub backoff_base_ms: u64,

    /// 每批处理的DOI数量
    pub batch_size: usize,

    /// 批次之间的等待时间（毫秒）
    pub batch_delay_ms: u64,

    /// 请求时携带的User-Agent
    pub user_agent: String,
}

/// 章节生成配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct GenerationConfig {
    /// 发现章节的并发生成数
    pub discovery_concurrency: usize,

    /// 每个发现章节最多收录的插图数量
    pub max_figures_per_section: usize,

    /// 单次模型请求最多携带的图片数量
    pub max_images_per_request: usize,

    /// 单张图片的大小上限（字节）
    pub max_image_bytes: usize,

    /// 任务输出在prompt中的截断长度（字符）
    pub task_output_truncate_chars: usize,

    /// 少于该字符数的章节会被标记为可疑
    pub min_section_chars: usize,

    /// 发现章节生成失败时是否终止整个流程
    pub fail_on_section_error: bool,

    /// 论文语言
    pub target_language: TargetLanguage,
}

/// LaTeX工具链配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct CompileConfig {
    /// LaTeX引擎可执行文件
    pub engine: String,

    /// 参考文献工具可执行文件
    pub bibtex: String,

    /// 单个子进程的超时时间（秒）
    pub process_timeout_seconds: u64,

    /// 致命错误时附带的编译日志行数
    pub log_tail_lines: usize,
}

/// 对象存储配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    /// 存储后端
    pub backend: StorageBackend,

    /// 本地后端的根目录
    pub local_root: PathBuf,

    /// S3后端的bucket名称（凭证从环境变量读取）
    pub bucket: Option<String>,

    /// 产物对象键的前缀
    pub key_prefix: String,

    /// 预签名链接有效期（秒）
    pub presign_ttl_seconds: u64,
}

/// 缓存配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    /// 是否启用缓存
    pub enabled: bool,

    /// 缓存目录
    pub cache_dir: PathBuf,

    /// 缓存过期时间（小时）
    pub expire_hours: u64,
}

impl Config {
    /// 从文件加载配置
    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let mut file =
            File::open(path).context(format!("Failed to open config file: {:?}", path))?;
        let mut content = String::new();
        file.read_to_string(&mut content)
            .context("Failed to read config file")?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// 论文记录的存放目录
    pub fn records_dir(&self) -> PathBuf {
        self.internal_path.join("papers")
    }
}

impl MetadataConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }
}

impl StorageConfig {
    pub fn presign_ttl(&self) -> Duration {
        Duration::from_secs(self.presign_ttl_seconds)
    }
}

impl CompileConfig {
    pub fn process_timeout(&self) -> Duration {
        Duration::from_secs(self.process_timeout_seconds)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace_root: std::env::temp_dir().join("deepaper"),
            internal_path: PathBuf::from("./.deepaper"),
            author: String::from("Deep Research Agent"),
            llm: LLMConfig::default(),
            metadata: MetadataConfig::default(),
            generation: GenerationConfig::default(),
            compile: CompileConfig::default(),
            storage: StorageConfig::default(),
            cache: CacheConfig::default(),
            verbose: false,
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: LLMProvider::default(),
            api_key: std::env::var("DEEPAPER_LLM_API_KEY").unwrap_or_default(),
            api_base_url: String::from("https://api.openai.com/v1"),
            model_efficient: String::from("gpt-4.1-mini"),
            model_powerful: String::from("gpt-4.1"),
            max_tokens: 16384,
            temperature: 0.2,
            retry_attempts: 3,
            retry_delay_ms: 3000,
            timeout_seconds: 300,
        }
    }
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            primary_base_url: String::from("https://doi.org"),
            fallback_base_url: String::from("https://api.crossref.org"),
            request_timeout_ms: 10_000,
            retry_attempts: 3,
            backoff_base_ms: 500,
            batch_size: 5,
            batch_delay_ms: 1000,
            user_agent: String::from("deepaper-rs/0.1 (mailto:research@example.org)"),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            discovery_concurrency: 3,
            max_figures_per_section: 4,
            max_images_per_request: 8,
            max_image_bytes: 4 * 1024 * 1024, // 4MB
            task_output_truncate_chars: 12_000,
            min_section_chars: 200,
            fail_on_section_error: true,
            target_language: TargetLanguage::English,
        }
    }
}

impl Default for CompileConfig {
    fn default() -> Self {
        Self {
            engine: String::from("pdflatex"),
            bibtex: String::from("bibtex"),
            process_timeout_seconds: 120,
            log_tail_lines: 40,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            local_root: PathBuf::from("./.deepaper/storage"),
            bucket: None,
            key_prefix: String::from("papers"),
            presign_ttl_seconds: 7 * 24 * 3600,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cache_dir: PathBuf::from(".deepaper/cache"),
            expire_hours: 24 * 30,
        }
    }
}
