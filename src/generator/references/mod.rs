//! 参考文献阶段：提取、解析、去重

pub mod bibtex;
pub mod dedup;
pub mod extractor;
pub mod normalize;
pub mod resolver;

use crate::generator::context::PaperContext;
use crate::types::bibliography::Bibliography;
use crate::types::research::ResearchState;

/// 从支撑发现的任务输出中收集参考文献，得到citekey唯一的文献集合
pub async fn execute(context: &PaperContext, state: &ResearchState) -> Bibliography {
    let tasks = state.supporting_tasks();
    let report = extractor::extract_from_outputs(tasks.iter().map(|task| task.output.as_str()));
    tracing::info!(
        "🔎 从 {} 个任务输出中提取到 {} 条引用，跳过 {} 个无法解析的片段",
        tasks.len(),
        report.references.len(),
        report.skipped
    );

    let entries = context.metadata.resolve_all(&report.references).await;
    let bibliography = dedup::deduplicate(entries);
    tracing::info!("📖 去重后共 {} 条参考文献", bibliography.len());
    bibliography
}
