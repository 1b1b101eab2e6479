//! 单元测试共用的外部服务替身

use anyhow::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use crate::config::Config;
use crate::generator::context::PaperContext;
use crate::generator::outlet::toolchain::{CompileJob, DOCUMENT_STEM, Toolchain};
use crate::llm::{LanguageModel, ModelRequest};
use crate::records::FsPaperRecordStore;
use crate::storage::ObjectStoreStorage;
use crate::types::paper::CompileResult;

type Handler = Box<dyn Fn(&ModelRequest) -> Result<String> + Send + Sync>;

/// 按请求内容返回固定输出的模型
pub struct FakeModel {
    handler: Handler,
}

impl FakeModel {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&ModelRequest) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
        }
    }

    pub fn unused() -> Self {
        Self::new(|_| Err(anyhow::anyhow!("model should not be called")))
    }
}

#[async_trait]
impl LanguageModel for FakeModel {
    async fn complete(&self, request: &ModelRequest) -> Result<String> {
        (self.handler)(request)
    }
}

/// 按脚本依次返回编译结果的工具链，成功时写出 paper.pdf
pub struct ScriptedToolchain {
    script: Mutex<VecDeque<(bool, String)>>,
    jobs: Mutex<Vec<(String, bool)>>,
}

impl ScriptedToolchain {
    pub fn new(script: Vec<(bool, String)>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            jobs: Mutex::new(Vec::new()),
        }
    }

    /// 每次编译时的源码与是否运行了bibtex
    pub fn jobs(&self) -> Vec<(String, bool)> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl Toolchain for ScriptedToolchain {
    async fn compile(&self, workdir: &Path, job: &CompileJob) -> CompileResult {
        let tex = std::fs::read_to_string(workdir.join(format!("{}.tex", DOCUMENT_STEM)))
            .unwrap_or_default();
        self.jobs.lock().unwrap().push((tex, job.run_bibtex));

        let (success, logs) = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or((false, "script exhausted".to_string()));
        let pdf_path = success.then(|| {
            let path = workdir.join(format!("{}.pdf", DOCUMENT_STEM));
            std::fs::write(&path, b"%PDF-1.5\n").unwrap();
            path
        });
        CompileResult {
            success,
            pdf_path,
            logs,
        }
    }
}

/// 带临时目录的测试上下文
pub struct TestHarness {
    pub context: PaperContext,
    pub storage: Arc<ObjectStoreStorage>,
    pub dir: TempDir,
}

impl TestHarness {
    pub fn new(model: FakeModel) -> Self {
        Self::with_toolchain(model, Arc::new(ScriptedToolchain::new(vec![])))
    }

    pub fn with_toolchain(model: FakeModel, toolchain: Arc<dyn Toolchain>) -> Self {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.workspace_root = dir.path().join("workspaces");
        config.internal_path = dir.path().join("internal");
        config.cache.enabled = false;
        config.metadata.retry_attempts = 1;
        config.metadata.batch_delay_ms = 0;

        let storage = Arc::new(ObjectStoreStorage::in_memory());
        let records = Arc::new(FsPaperRecordStore::new(config.records_dir()));
        let context = PaperContext::from_parts(
            config,
            Arc::new(model),
            storage.clone(),
            toolchain,
            records,
        )
        .unwrap();

        Self {
            context,
            storage,
            dir,
        }
    }
}

/// 为各类章节返回合法JSON的模型输出
pub fn section_response(request: &ModelRequest) -> String {
    if request.user_prompt.contains("title, abstract and keywords") {
        r#"{"title": "Findings on X", "abstract": "We study X.", "keywords": ["x"]}"#.to_string()
    } else if request.user_prompt.contains("Background section") {
        r#"{"content": "X has been studied before \\cite{ghost2021}."}"#.to_string()
    } else {
        r#"{"title": "Result", "content": "The result holds."}"#.to_string()
    }
}
