use crate::generator::compose::agents::background::BackgroundEditor;
use crate::generator::compose::agents::discovery::DiscoveryEditor;
use crate::generator::compose::agents::front_matter::FrontMatterEditor;
use crate::generator::compose::figures::SectionFigures;
use crate::generator::context::PaperContext;
use crate::generator::error::PaperError;
use crate::generator::step_forward_agent::{SectionError, StepForwardAgent};
use crate::types::bibliography::Bibliography;
use crate::types::paper::{BackgroundSection, DiscoverySection, FigureInfo, PaperMetadata};
use crate::types::research::ResearchState;
use crate::utils::threads::do_parallel_with_limit;

mod agents;
pub mod decode;
pub mod figures;

/// 各章节生成结果的集合
#[derive(Debug, Clone)]
pub struct ComposedPaper {
    pub metadata: PaperMetadata,
    pub background: BackgroundSection,
    /// 生成成功的发现章节，按发现顺序排列
    pub discoveries: Vec<DiscoverySection>,
    /// 与研究状态中的发现一一对应的插图
    pub figures: Vec<Vec<FigureInfo>>,
}

impl ComposedPaper {
    /// 提供给指定发现章节的插图
    pub fn figures_for(&self, index: usize) -> &[FigureInfo] {
        self.figures.get(index).map(Vec::as_slice).unwrap_or_default()
    }
}

/// 执行章节生成阶段
pub async fn execute(
    context: &PaperContext,
    state: &ResearchState,
    bibliography: &Bibliography,
    figures: &[SectionFigures],
) -> Result<ComposedPaper, PaperError> {
    tracing::info!(
        "🤖 执行章节生成流程，目标语言: {}",
        context.config.generation.target_language.display_name()
    );
    let citation_keys = bibliography.citation_keys();

    let front_matter = FrontMatterEditor::new(state);
    let metadata = front_matter
        .execute(context, &citation_keys)
        .await
        .map_err(|err| section_error(&front_matter, err))?;

    let background_editor = BackgroundEditor::new(state);
    let background = background_editor
        .execute(context, &citation_keys)
        .await
        .map_err(|err| section_error(&background_editor, err))?;

    let empty = SectionFigures::default();
    let editors: Vec<DiscoveryEditor> = (0..state.discoveries.len())
        .map(|index| {
            let section_figures = figures.get(index).unwrap_or(&empty);
            DiscoveryEditor::new(
                state,
                index,
                &section_figures.figures,
                &section_figures.images,
            )
        })
        .collect();

    let keys = &citation_keys;
    let futures = editors
        .iter()
        .map(|editor| async move { (editor, editor.execute(context, keys).await) })
        .collect::<Vec<_>>();
    let results =
        do_parallel_with_limit(futures, context.config.generation.discovery_concurrency).await;

    let mut discoveries = Vec::with_capacity(results.len());
    for (editor, result) in results {
        match result {
            Ok(mut section) => {
                section.index = editor.section_index().unwrap_or_default();
                discoveries.push(section);
            }
            Err(err) if context.config.generation.fail_on_section_error => {
                return Err(section_error(editor, err));
            }
            Err(err) => {
                tracing::warn!(
                    "⚠️ 章节 {} 生成失败，已跳过，论文将缺少该发现: {}",
                    editor.agent_type(),
                    err
                );
            }
        }
    }

    tracing::info!(
        "📝 章节生成完成: 发现章节 {} / {}",
        discoveries.len(),
        state.discoveries.len()
    );

    Ok(ComposedPaper {
        metadata,
        background,
        discoveries,
        figures: figures.iter().map(|section| section.figures.clone()).collect(),
    })
}

fn section_error<A: StepForwardAgent>(agent: &A, err: SectionError) -> PaperError {
    tracing::error!("❌ 章节 {} 生成失败: {}", agent.agent_type(), err);
    PaperError::Section {
        section: agent.agent_type(),
        index: agent.section_index(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::testing::{FakeModel, TestHarness};
    use crate::llm::ModelRequest;

    fn state() -> ResearchState {
        serde_json::from_str(
            r#"{
                "objective": "Study X",
                "key_insights": ["I1"],
                "discoveries": [
                    {"title": "First finding", "evidence": [{"task_id": "t1"}]},
                    {"title": "Second finding", "evidence": [{"task_id": "t1"}]}
                ],
                "tasks": [{"id": "t1", "output": "data"}]
            }"#,
        )
        .unwrap()
    }

    fn respond(request: &ModelRequest, broken_discovery: Option<&str>) -> String {
        if request.user_prompt.contains("title, abstract and keywords") {
            return r#"{"title": "Paper", "abstract": "Abstract text.", "keywords": ["k"]}"#
                .to_string();
        }
        if request.user_prompt.contains("Background section") {
            return r#"{"content": "Background text."}"#.to_string();
        }
        match broken_discovery {
            Some(title) if request.user_prompt.contains(title) => "not json".to_string(),
            _ => r#"{"title": "Result", "content": "Result text \cite{smith2020}."}"#.to_string(),
        }
    }

    #[tokio::test]
    async fn test_compose_all_sections() {
        let harness = TestHarness::new(FakeModel::new(|request| Ok(respond(request, None))));
        let composed = execute(&harness.context, &state(), &Bibliography::default(), &[])
            .await
            .unwrap();

        assert_eq!(composed.metadata.title, "Paper");
        assert_eq!(composed.background.content, "Background text.");
        assert_eq!(composed.discoveries.len(), 2);
        assert_eq!(composed.discoveries[1].index, 1);
        assert_eq!(composed.discoveries[0].content, r"Result text \cite{smith2020}.");
        assert!(composed.figures_for(0).is_empty());
    }

    #[tokio::test]
    async fn test_discovery_failure_is_fatal_with_index() {
        let harness = TestHarness::new(FakeModel::new(|request| {
            Ok(respond(request, Some("Second finding")))
        }));
        let err = execute(&harness.context, &state(), &Bibliography::default(), &[])
            .await
            .unwrap_err();

        match err {
            PaperError::Section { section, index, .. } => {
                assert_eq!(section, "discovery_2");
                assert_eq!(index, Some(1));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_discovery_failure_can_be_skipped() {
        let mut harness = TestHarness::new(FakeModel::new(|request| {
            Ok(respond(request, Some("First finding")))
        }));
        harness.context.config.generation.fail_on_section_error = false;

        let composed = execute(&harness.context, &state(), &Bibliography::default(), &[])
            .await
            .unwrap();
        assert_eq!(composed.discoveries.len(), 1);
        assert_eq!(composed.discoveries[0].index, 1);
    }
}
