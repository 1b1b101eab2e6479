use anyhow::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use deepaper_rs::config::Config;
use deepaper_rs::generator::context::PaperContext;
use deepaper_rs::generator::error::PaperError;
use deepaper_rs::generator::outlet::compiler::RecoveryOutcome;
use deepaper_rs::generator::outlet::toolchain::{CompileJob, Toolchain};
use deepaper_rs::generator::workflow::{PaperRequest, generate_paper};
use deepaper_rs::llm::{LanguageModel, ModelRequest};
use deepaper_rs::records::{FsPaperRecordStore, PaperStatus};
use deepaper_rs::storage::{ObjectStoreStorage, StorageService};
use deepaper_rs::types::paper::CompileResult;
use deepaper_rs::types::research::ResearchState;

const SMITH_BIB: &str = "@article{Smith_2020,\n  author = {Smith, Jane and Doe, Alex},\n  title = {Alpha effects in X},\n  journal = {Journal of X},\n  year = {2020}\n}";
const JONES_BIB: &str = "@article{Jones_2019,\n  author = {Bob Jones},\n  title = {Beta effects in X},\n  journal = {Journal of Y},\n  year = {2019}\n}";

/// 按章节返回固定内容的模型，背景章节包含一个编造的DOI
struct SectionModel;

#[async_trait]
impl LanguageModel for SectionModel {
    async fn complete(&self, request: &ModelRequest) -> Result<String> {
        let prompt = &request.user_prompt;
        let response = if prompt.contains("title, abstract and keywords") {
            r#"{"title": "Alpha and Beta in X", "abstract": "We study X.", "keywords": ["x", "alpha"]}"#
        } else if prompt.contains("Background section") {
            r#"{"content": "Prior work \\cite{smith2020} measured alpha. A later study \\cite{10.9999/fake} disagreed (see doi:10.9999/fake)."}"#
        } else {
            r#"{"title": "Beta holds", "content": "The beta effect holds \\cite{jones2019}."}"#
        };
        Ok(response.to_string())
    }
}

/// 按脚本返回编译结果并记录每次编译的源码
struct ScriptedToolchain {
    script: Mutex<VecDeque<(bool, String)>>,
    jobs: Mutex<Vec<(String, bool)>>,
}

impl ScriptedToolchain {
    fn new(script: Vec<(bool, &str)>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(
                script
                    .into_iter()
                    .map(|(success, logs)| (success, logs.to_string()))
                    .collect(),
            ),
            jobs: Mutex::new(Vec::new()),
        })
    }

    fn jobs(&self) -> Vec<(String, bool)> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl Toolchain for ScriptedToolchain {
    async fn compile(&self, workdir: &Path, job: &CompileJob) -> CompileResult {
        let tex = std::fs::read_to_string(workdir.join("paper.tex")).unwrap_or_default();
        self.jobs.lock().unwrap().push((tex, job.run_bibtex));

        let (success, logs) = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or((false, "script exhausted".to_string()));
        let pdf_path = success.then(|| {
            let pdf = workdir.join("paper.pdf");
            std::fs::write(&pdf, b"%PDF-1.5\n").unwrap();
            pdf
        });
        CompileResult {
            success,
            pdf_path,
            logs,
        }
    }
}

/// 主服务直接返回smith，jones在主服务上持续500，只能由备用服务解析
async fn metadata_server() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/10.1234/alpha"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SMITH_BIB))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/10.1234/beta"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/works/10.1234/beta/transform/application/x-bibtex"))
        .respond_with(ResponseTemplate::new(200).set_body_string(JONES_BIB))
        .expect(1)
        .mount(&server)
        .await;

    server
}

fn research_state() -> ResearchState {
    serde_json::from_str(
        r#"{
            "objective": "Characterise the alpha and beta effects in X",
            "key_insights": ["Alpha and beta co-occur"],
            "discoveries": [
                {"title": "Beta", "claim": "Beta holds", "evidence": [{"task_id": "t1"}, {"task_id": "t2"}]}
            ],
            "tasks": [
                {"id": "t1", "output": "Smith et al. measured alpha, doi:10.1234/alpha and more."},
                {"id": "t2", "output": "Jones reported beta (https://doi.org/10.1234/beta)."},
                {"id": "t3", "output": "Unused lead doi:10.1234/gamma that supports nothing."}
            ]
        }"#,
    )
    .unwrap()
}

fn request() -> PaperRequest {
    PaperRequest {
        user_id: "user-1".to_string(),
        conversation_id: "conv-1".to_string(),
        author: None,
    }
}

struct Fixture {
    context: PaperContext,
    storage: Arc<ObjectStoreStorage>,
    _dir: TempDir,
    _server: MockServer,
}

async fn fixture(toolchain: Arc<ScriptedToolchain>) -> Fixture {
    let server = metadata_server().await;
    let dir = TempDir::new().unwrap();

    let mut config = Config::default();
    config.workspace_root = dir.path().join("workspaces");
    config.internal_path = dir.path().join("internal");
    config.cache.enabled = false;
    config.metadata.primary_base_url = server.uri();
    config.metadata.fallback_base_url = server.uri();
    config.metadata.retry_attempts = 3;
    config.metadata.backoff_base_ms = 1;
    config.metadata.batch_delay_ms = 0;
    config.metadata.request_timeout_ms = 5_000;

    let storage = Arc::new(ObjectStoreStorage::in_memory());
    let records = Arc::new(FsPaperRecordStore::new(config.records_dir()));
    let context =
        PaperContext::from_parts(config, Arc::new(SectionModel), storage.clone(), toolchain, records)
            .unwrap();

    Fixture {
        context,
        storage,
        _dir: dir,
        _server: server,
    }
}

async fn download_text(storage: &ObjectStoreStorage, key: &str) -> String {
    String::from_utf8(storage.download(key).await.unwrap()).unwrap()
}

fn entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

#[tokio::test]
async fn test_references_resolve_through_fallback_and_fake_doi_is_removed() {
    let toolchain = ScriptedToolchain::new(vec![(true, "")]);
    let fixture = fixture(toolchain.clone()).await;

    let artifacts = generate_paper(&fixture.context, &research_state(), &request())
        .await
        .unwrap();

    // gamma只出现在不支撑任何发现的任务中
    assert_eq!(artifacts.bibliography_size, 2);
    assert_eq!(artifacts.recovery, RecoveryOutcome::Clean);

    let bib_key = artifacts.bib_key.clone().unwrap();
    let bib = download_text(&fixture.storage, &bib_key).await;
    assert!(bib.contains("smith2020"));
    assert!(bib.contains("jones2019"));
    assert!(bib.contains("10.1234/beta"));
    assert!(!bib.contains("gamma"));

    let tex = download_text(&fixture.storage, &artifacts.source_key).await;
    assert!(tex.contains(r"\cite{smith2020}"));
    assert!(tex.contains(r"\cite{jones2019}"));
    assert!(!tex.contains("10.9999"));
    assert!(tex.contains(r"\bibliography{references}"));

    let jobs = toolchain.jobs();
    assert_eq!(jobs.len(), 1);
    assert!(jobs[0].1);

    let record = fixture
        .context
        .records
        .get(&artifacts.paper_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, PaperStatus::Completed);
    assert_eq!(record.source_key.as_deref(), Some(artifacts.source_key.as_str()));
    assert!(artifacts.pdf_url.contains(&artifacts.paper_id));
}

#[tokio::test]
async fn test_poison_citation_is_removed_in_first_recovery_pass() {
    let toolchain = ScriptedToolchain::new(vec![
        (
            false,
            "LaTeX Warning: Citation `smith2020' on page 1 undefined on input line 42.\n! Emergency stop.",
        ),
        (true, ""),
    ]);
    let fixture = fixture(toolchain.clone()).await;

    let artifacts = generate_paper(&fixture.context, &research_state(), &request())
        .await
        .unwrap();

    assert_eq!(
        artifacts.recovery,
        RecoveryOutcome::CitationsRemoved(vec!["smith2020".to_string()])
    );

    let tex = download_text(&fixture.storage, &artifacts.source_key).await;
    assert!(!tex.contains("smith2020"));
    assert!(tex.contains(r"\cite{jones2019}"));

    let bib = download_text(&fixture.storage, artifacts.bib_key.as_deref().unwrap()).await;
    assert!(!bib.contains("smith2020"));
    assert!(bib.contains("jones2019"));

    let jobs = toolchain.jobs();
    assert_eq!(jobs.len(), 2);
    assert!(jobs.iter().all(|(_, run_bibtex)| *run_bibtex));
}

#[tokio::test]
async fn test_total_compile_failure_rolls_back() {
    let toolchain = ScriptedToolchain::new(vec![
        (false, "! Undefined control sequence.\nFatal error occurred, no output PDF file produced!"),
        (false, "! Undefined control sequence.\nFatal error occurred, no output PDF file produced!"),
    ]);
    let fixture = fixture(toolchain.clone()).await;

    let err = generate_paper(&fixture.context, &research_state(), &request())
        .await
        .unwrap_err();

    assert!(
        matches!(err, PaperError::Compile { ref log_tail } if log_tail.contains("no output PDF file produced"))
    );
    assert_eq!(entries(&fixture.context.config.records_dir()), 0);
    assert_eq!(entries(&fixture.context.config.workspace_root), 0);
}

#[tokio::test]
async fn test_each_recovery_pass_cites_no_more_than_the_previous() {
    let toolchain = ScriptedToolchain::new(vec![
        (false, "LaTeX Warning: Citation `smith2020' on page 1 undefined on input line 42."),
        (false, "! Missing $ inserted."),
        (false, "! Missing $ inserted."),
    ]);
    let fixture = fixture(toolchain.clone()).await;

    let err = generate_paper(&fixture.context, &research_state(), &request())
        .await
        .unwrap_err();
    assert!(matches!(err, PaperError::Compile { .. }));

    let jobs = toolchain.jobs();
    assert_eq!(jobs.len(), 3);

    let cited = |tex: &str| {
        ["smith2020", "jones2019"]
            .into_iter()
            .filter(|key| tex.contains(key))
            .count()
    };
    let counts: Vec<usize> = jobs.iter().map(|(tex, _)| cited(tex)).collect();
    assert_eq!(counts, vec![2, 1, 0]);

    let (last_tex, last_bibtex) = &jobs[2];
    assert!(!last_bibtex);
    assert!(!last_tex.contains(r"\cite"));
    assert!(!last_tex.contains(r"\bibliography{"));
}
