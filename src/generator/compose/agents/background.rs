use async_trait::async_trait;

use crate::generator::context::PaperContext;
use crate::generator::step_forward_agent::{PromptTemplate, StepForwardAgent};
use crate::types::paper::BackgroundSection;
use crate::types::research::ResearchState;
use crate::utils::truncate_chars;

/// 生成背景章节
pub struct BackgroundEditor<'a> {
    state: &'a ResearchState,
}

impl<'a> BackgroundEditor<'a> {
    pub fn new(state: &'a ResearchState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl<'a> StepForwardAgent for BackgroundEditor<'a> {
    type Output = BackgroundSection;

    fn agent_type(&self) -> String {
        "background".to_string()
    }

    fn prompt_template(&self) -> PromptTemplate {
        PromptTemplate {
            system_prompt: r#"You are an experienced researcher writing the Background section of a scientific paper.

## Requirements
- 3-6 paragraphs of LaTeX body text that situate the research objective in prior work and explain why it matters.
- Support statements about prior work with \cite{key} using only the allowed citation keys.
- Inline math uses $...$. Lists use itemize or enumerate.

## ⚠️ Constraints
- Do not include the \section heading; it is added automatically.
- Never cite DOIs, URLs or keys outside the allowed list.
- Do not use Markdown."#
                .to_string(),
            opening_instruction: "Write the Background section for the research described below."
                .to_string(),
            closing_instruction: "Return the JSON object only. List every key you cited in citations_used."
                .to_string(),
        }
    }

    fn provide_research_material(&self, context: &PaperContext) -> String {
        let limit = context.config.generation.task_output_truncate_chars;
        let mut material = format!("### Objective\n{}\n\n", self.state.objective);

        if !self.state.key_insights.is_empty() {
            material.push_str("### Key insights\n");
            for insight in &self.state.key_insights {
                material.push_str(&format!("- {}\n", insight));
            }
            material.push('\n');
        }

        material.push_str("### Supporting task outputs\n");
        for task in self.state.supporting_tasks() {
            material.push_str(&format!(
                "#### Task {}: {}\n{}\n\n",
                task.id,
                task.objective,
                truncate_chars(&task.output, limit)
            ));
        }
        material
    }
}
