use crate::config::Config;
use crate::generator::context::PaperContext;
use crate::generator::error::PaperError;
use crate::generator::outlet::compiler::{RecoveryOutcome, compile_with_recovery};
use crate::generator::{assemble, compose, outlet, references};
use crate::records::PaperRecord;
use crate::types::research::ResearchState;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::Instrument;

/// 时间跟踪作用域
pub struct TimingScope {
    start_time: Instant,
    phase_start_times: Vec<(String, Instant)>,
    phase_durations: Vec<(String, Duration)>,
}

impl Default for TimingScope {
    fn default() -> Self {
        Self::new()
    }
}

impl TimingScope {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            phase_start_times: Vec::new(),
            phase_durations: Vec::new(),
        }
    }

    /// 开始一个新的阶段计时
    pub fn start_phase(&mut self, phase_name: &str) {
        self.phase_start_times
            .push((phase_name.to_string(), Instant::now()));
    }

    /// 结束一个阶段的计时
    pub fn end_phase(&mut self, phase_name: &str) -> Option<Duration> {
        let position = self
            .phase_start_times
            .iter()
            .position(|(name, _)| name == phase_name)?;
        let (name, start_time) = self.phase_start_times.remove(position);
        let duration = start_time.elapsed();
        self.phase_durations.push((name, duration));
        Some(duration)
    }

    /// 获取总执行时间
    pub fn get_total_duration(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 获取所有阶段的执行时间，按结束顺序
    pub fn get_phase_durations(&self) -> &[(String, Duration)] {
        &self.phase_durations
    }

    /// 获取格式化的执行时间报告
    pub fn generate_timing_report(&self) -> String {
        let mut report = format!(
            "总执行时间: {:.2}秒\n",
            self.get_total_duration().as_secs_f64()
        );

        if !self.phase_durations.is_empty() {
            report.push_str("\n各阶段执行时间:\n");
            for (phase, duration) in &self.phase_durations {
                report.push_str(&format!("- {}: {:.3}秒\n", phase, duration.as_secs_f64()));
            }
        }

        report
    }
}

/// 时间跟踪常量
pub struct TimingKeys;

impl TimingKeys {
    pub const REFERENCES: &'static str = "references";
    pub const FIGURES: &'static str = "figures";
    pub const COMPOSE: &'static str = "compose";
    pub const ASSEMBLE: &'static str = "assemble";
    pub const COMPILE: &'static str = "compile";
    pub const PUBLISH: &'static str = "publish";
}

/// 论文生成请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperRequest {
    pub user_id: String,
    pub conversation_id: String,
    /// 覆盖配置中的作者署名
    #[serde(default)]
    pub author: Option<String>,
}

/// 一次成功运行的产物
#[derive(Debug, Clone)]
pub struct PaperArtifacts {
    pub paper_id: String,
    pub pdf_key: String,
    pub source_key: String,
    pub bib_key: Option<String>,
    pub pdf_url: String,
    pub source_url: String,
    pub recovery: RecoveryOutcome,
    /// 去重后的参考文献数量
    pub bibliography_size: usize,
}

/// 生成一篇论文。
///
/// 每次运行拥有独立的工作目录与日志span；无论成功与否，工作目录都会被删除。
/// 失败时删除临时记录，不留下没有产物的 processing 记录。
pub async fn generate_paper(
    context: &PaperContext,
    state: &ResearchState,
    request: &PaperRequest,
) -> Result<PaperArtifacts, PaperError> {
    let paper_id = uuid::Uuid::new_v4().to_string();
    let span = tracing::info_span!("paper", paper_id = %paper_id);
    let mut context = context.for_run(span);
    if let Some(author) = &request.author {
        context.config.author = author.clone();
    }

    execute_run(&context, state, request, &paper_id)
        .instrument(context.span.clone())
        .await
}

async fn execute_run(
    context: &PaperContext,
    state: &ResearchState,
    request: &PaperRequest,
    paper_id: &str,
) -> Result<PaperArtifacts, PaperError> {
    tracing::info!("🚀 开始生成论文，发现 {} 个", state.discoveries.len());
    context
        .records
        .create(&PaperRecord::processing(
            paper_id,
            &request.user_id,
            &request.conversation_id,
        ))
        .await?;

    let result = match create_workspace(&context.config, paper_id).await {
        Ok(workspace) => {
            let result = run_stages(context, state, request, paper_id, workspace.path()).await;
            if let Err(err) = workspace.close() {
                tracing::warn!("⚠️ 删除工作目录失败: {}", err);
            }
            result
        }
        Err(err) => Err(PaperError::Workspace(err)),
    };

    match result {
        Ok(artifacts) => {
            tracing::info!("🎉 论文生成完成: {}", artifacts.pdf_url);
            Ok(artifacts)
        }
        Err(err) => {
            tracing::error!("❌ 论文生成失败: {}", err);
            if let Err(cleanup) = context.records.delete(paper_id).await {
                tracing::warn!("⚠️ 删除论文记录失败: {}", cleanup);
            }
            Err(err)
        }
    }
}

async fn create_workspace(config: &Config, paper_id: &str) -> std::io::Result<tempfile::TempDir> {
    tokio::fs::create_dir_all(&config.workspace_root).await?;
    tempfile::Builder::new()
        .prefix(&format!("paper-{}-", paper_id))
        .tempdir_in(&config.workspace_root)
}

async fn run_stages(
    context: &PaperContext,
    state: &ResearchState,
    request: &PaperRequest,
    paper_id: &str,
    workspace: &Path,
) -> Result<PaperArtifacts, PaperError> {
    let mut timing = TimingScope::new();

    timing.start_phase(TimingKeys::REFERENCES);
    let bibliography = references::execute(context, state).await;
    timing.end_phase(TimingKeys::REFERENCES);

    timing.start_phase(TimingKeys::FIGURES);
    let figures = compose::figures::prepare_figures(
        context.storage.as_ref(),
        &context.config.generation,
        state,
        workspace,
    )
    .await?;
    timing.end_phase(TimingKeys::FIGURES);

    timing.start_phase(TimingKeys::COMPOSE);
    let composed = compose::execute(context, state, &bibliography, &figures).await?;
    timing.end_phase(TimingKeys::COMPOSE);

    timing.start_phase(TimingKeys::ASSEMBLE);
    let source = assemble::execute(context, state, &composed, &bibliography)?;
    timing.end_phase(TimingKeys::ASSEMBLE);

    timing.start_phase(TimingKeys::COMPILE);
    let compiled = compile_with_recovery(context, workspace, source).await?;
    timing.end_phase(TimingKeys::COMPILE);

    timing.start_phase(TimingKeys::PUBLISH);
    let published = outlet::publish(context, request, paper_id, &compiled).await?;
    context
        .records
        .complete(paper_id, &published.pdf_key, &published.source_key)
        .await?;
    timing.end_phase(TimingKeys::PUBLISH);

    tracing::info!("⏱️ 论文生成耗时\n{}", timing.generate_timing_report());

    Ok(PaperArtifacts {
        paper_id: paper_id.to_string(),
        pdf_key: published.pdf_key,
        source_key: published.source_key,
        bib_key: published.bib_key,
        pdf_url: published.pdf_url,
        source_url: published.source_url,
        recovery: compiled.outcome,
        bibliography_size: bibliography.len(),
    })
}

/// 启动论文生成工作流
pub async fn launch(
    config: &Config,
    state_path: &Path,
    request: &PaperRequest,
    output_dir: Option<&Path>,
) -> Result<PaperArtifacts> {
    let state = ResearchState::from_file(state_path)?;
    let context = PaperContext::new(config.clone())?;

    // 启动时检查模型连接
    context.llm.check_connection().await?;

    let artifacts = generate_paper(&context, &state, request).await?;

    if let Some(dir) = output_dir {
        tokio::fs::create_dir_all(dir).await?;
        for key in [&artifacts.pdf_key, &artifacts.source_key] {
            let bytes = context.storage.download(key).await?;
            let file_name = key.rsplit('/').next().unwrap_or(key.as_str());
            tokio::fs::write(dir.join(file_name), bytes).await?;
        }
        tracing::info!("💾 产物已保存到 {}", dir.display());
    }

    Ok(artifacts)
}
