use async_trait::async_trait;

use crate::generator::context::PaperContext;
use crate::generator::step_forward_agent::{PromptTemplate, StepForwardAgent};
use crate::llm::ImageAttachment;
use crate::types::paper::{DiscoverySection, FigureInfo};
use crate::types::research::ResearchState;
use crate::utils::truncate_chars;

/// 为单个发现生成章节，可附带插图
pub struct DiscoveryEditor<'a> {
    state: &'a ResearchState,
    index: usize,
    figures: &'a [FigureInfo],
    images: &'a [ImageAttachment],
}

impl<'a> DiscoveryEditor<'a> {
    pub fn new(
        state: &'a ResearchState,
        index: usize,
        figures: &'a [FigureInfo],
        images: &'a [ImageAttachment],
    ) -> Self {
        Self {
            state,
            index,
            figures,
            images,
        }
    }
}

#[async_trait]
impl<'a> StepForwardAgent for DiscoveryEditor<'a> {
    type Output = DiscoverySection;

    fn agent_type(&self) -> String {
        format!("discovery_{}", self.index + 1)
    }

    fn section_index(&self) -> Option<usize> {
        Some(self.index)
    }

    fn images(&self) -> Vec<ImageAttachment> {
        self.images.to_vec()
    }

    fn prompt_template(&self) -> PromptTemplate {
        PromptTemplate {
            system_prompt: r#"You are an experienced researcher writing one results section of a scientific paper. The section presents a single discovery and the evidence behind it.

## Requirements
- A concise, informative section title in plain text.
- 3-8 paragraphs of LaTeX body text: state the finding, walk through the supporting evidence, quantify where the material allows, and discuss limitations.
- Cite supporting literature with \cite{key} using only the allowed citation keys.
- If figures are listed, refer to them in the text and give each one a caption in `figures`, using exactly the listed filename.

## ⚠️ Constraints
- Do not include the \section heading or figure environments; they are added automatically.
- Never cite DOIs, URLs or keys outside the allowed list.
- Never invent numbers that do not appear in the material.
- Do not use Markdown."#
                .to_string(),
            opening_instruction: "Write the results section for the discovery described below."
                .to_string(),
            closing_instruction: "Return the JSON object only. List every key you cited in citations_used."
                .to_string(),
        }
    }

    fn provide_research_material(&self, context: &PaperContext) -> String {
        let limit = context.config.generation.task_output_truncate_chars;
        let mut material = format!("### Research objective\n{}\n\n", self.state.objective);

        if let Some(discovery) = self.state.discoveries.get(self.index) {
            material.push_str(&format!("### Discovery\n{}\n", discovery.title));
            if !discovery.claim.is_empty() {
                material.push_str(&format!("Claim: {}\n", discovery.claim));
            }
            if !discovery.summary.is_empty() {
                material.push_str(&format!("Summary: {}\n", discovery.summary));
            }
            material.push('\n');

            if !discovery.evidence.is_empty() {
                material.push_str("### Evidence\n");
                for evidence in &discovery.evidence {
                    material.push_str(&format!("- task {}: {}\n", evidence.task_id, evidence.explanation));
                }
                material.push('\n');
            }
        }

        material.push_str("### Supporting task outputs\n");
        for task in self.state.tasks_for_discovery(self.index) {
            material.push_str(&format!(
                "#### Task {}: {}\n{}\n\n",
                task.id,
                task.objective,
                truncate_chars(&task.output, limit)
            ));
        }

        if !self.figures.is_empty() {
            material.push_str("### Figures\n");
            for figure in self.figures {
                material.push_str(&format!("- {}: {}\n", figure.filename, figure.caption_seed));
            }
            if self.images.len() < self.figures.len() {
                material.push_str(&format!(
                    "Only the first {} images are attached.\n",
                    self.images.len()
                ));
            }
        }
        material
    }
}
