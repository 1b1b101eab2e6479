use async_trait::async_trait;

use crate::generator::context::PaperContext;
use crate::generator::step_forward_agent::{PromptTemplate, StepForwardAgent};
use crate::types::paper::PaperMetadata;
use crate::types::research::ResearchState;

/// 生成标题、摘要与关键词
pub struct FrontMatterEditor<'a> {
    state: &'a ResearchState,
}

impl<'a> FrontMatterEditor<'a> {
    pub fn new(state: &'a ResearchState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl<'a> StepForwardAgent for FrontMatterEditor<'a> {
    type Output = PaperMetadata;

    fn agent_type(&self) -> String {
        "front_matter".to_string()
    }

    fn max_tokens(&self) -> Option<u32> {
        Some(4096)
    }

    fn prompt_template(&self) -> PromptTemplate {
        PromptTemplate {
            system_prompt: r#"You are a senior scientific editor preparing the front matter of a research paper.

## Requirements
- The title is plain text: no LaTeX commands, no Markdown, at most 20 words.
- The abstract is a single LaTeX paragraph of 150-250 words covering motivation, approach, principal findings and implications.
- Keywords are 3-6 short plain-text phrases.

## ⚠️ Constraints
- Report only what the research material supports. Never invent data, numbers or references.
- Do not use \section, \begin{abstract} or any document-level command."#
                .to_string(),
            opening_instruction: "Write the title, abstract and keywords for a paper reporting the research below."
                .to_string(),
            closing_instruction: "Return the JSON object only.".to_string(),
        }
    }

    fn provide_research_material(&self, _context: &PaperContext) -> String {
        let mut material = format!("### Objective\n{}\n\n", self.state.objective);

        if !self.state.key_insights.is_empty() {
            material.push_str("### Key insights\n");
            for insight in &self.state.key_insights {
                material.push_str(&format!("- {}\n", insight));
            }
            material.push('\n');
        }

        material.push_str("### Discoveries\n");
        for (i, discovery) in self.state.discoveries.iter().enumerate() {
            material.push_str(&format!("{}. {}", i + 1, discovery.title));
            if !discovery.summary.is_empty() {
                material.push_str(&format!(": {}", discovery.summary));
            }
            material.push('\n');
        }
        material
    }
}
