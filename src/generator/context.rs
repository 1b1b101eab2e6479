use std::sync::Arc;

use anyhow::Result;

use crate::cache::CacheManager;
use crate::config::Config;
use crate::generator::outlet::toolchain::{LatexToolchain, Toolchain};
use crate::generator::references::resolver::MetadataClient;
use crate::llm::LanguageModel;
use crate::llm::client::LLMClient;
use crate::records::{FsPaperRecordStore, PaperRecordStore};
use crate::storage::{ObjectStoreStorage, StorageService};

/// 论文生成的上下文，在各阶段之间显式传递
#[derive(Clone)]
pub struct PaperContext {
    /// 配置
    pub config: Config,
    /// 语言模型服务
    pub llm: Arc<dyn LanguageModel>,
    /// 对象存储，用于下载插图与发布产物
    pub storage: Arc<dyn StorageService>,
    /// DOI元数据服务
    pub metadata: Arc<MetadataClient>,
    /// LaTeX工具链
    pub toolchain: Arc<dyn Toolchain>,
    /// 论文记录
    pub records: Arc<dyn PaperRecordStore>,
    /// 当前运行的日志span，携带paper_id
    pub span: tracing::Span,
}

impl PaperContext {
    /// 按配置创建真实的外部服务
    pub fn new(config: Config) -> Result<Self> {
        let llm = Arc::new(LLMClient::new(config.llm.clone())?);
        let storage = Arc::new(ObjectStoreStorage::from_config(&config.storage)?);
        let toolchain = Arc::new(LatexToolchain::new(config.compile.clone()));
        let records = Arc::new(FsPaperRecordStore::new(config.records_dir()));
        Self::from_parts(config, llm, storage, toolchain, records)
    }

    /// 使用注入的服务创建上下文，元数据客户端仍按配置创建
    pub fn from_parts(
        config: Config,
        llm: Arc<dyn LanguageModel>,
        storage: Arc<dyn StorageService>,
        toolchain: Arc<dyn Toolchain>,
        records: Arc<dyn PaperRecordStore>,
    ) -> Result<Self> {
        let cache = config
            .cache
            .enabled
            .then(|| Arc::new(CacheManager::new(config.cache.clone())));
        let metadata = Arc::new(MetadataClient::new(config.metadata.clone(), cache)?);

        Ok(Self {
            config,
            llm,
            storage,
            metadata,
            toolchain,
            records,
            span: tracing::Span::none(),
        })
    }

    /// 为单次运行派生上下文
    pub fn for_run(&self, span: tracing::Span) -> Self {
        Self {
            span,
            ..self.clone()
        }
    }
}
