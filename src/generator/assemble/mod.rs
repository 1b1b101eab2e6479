//! 文档组装：把各章节片段合并为一份LaTeX文档，并生成 references.bib

pub mod citations;
pub mod validator;

use std::path::Path;

use crate::generator::compose::ComposedPaper;
use crate::generator::compose::figures::FIGURES_DIR;
use crate::generator::context::PaperContext;
use crate::generator::error::PaperError;
use crate::generator::outlet::toolchain::DOCUMENT_STEM;
use crate::types::bibliography::Bibliography;
use crate::types::paper::{DiscoverySection, FigureInfo};
use crate::types::research::ResearchState;
use crate::utils::latex::{escape_latex, sanitize_fragment};

/// 参考文献文件名（不含扩展名）
pub const BIB_STEM: &str = "references";

/// pdflatex可以直接嵌入的图片格式
const EMBEDDABLE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// 可编译的论文源码
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaperSource {
    pub tex: String,
    pub bib: String,
}

impl PaperSource {
    /// 文档是否引用了参考文献文件
    pub fn has_bibliography(&self) -> bool {
        self.tex.contains(&format!("\\bibliography{{{}}}", BIB_STEM))
    }

    /// 写入工作目录：paper.tex 与 references.bib
    pub async fn write_to(&self, workdir: &Path) -> std::io::Result<()> {
        tokio::fs::write(workdir.join(format!("{}.tex", DOCUMENT_STEM)), &self.tex).await?;
        tokio::fs::write(workdir.join(format!("{}.bib", BIB_STEM)), &self.bib).await
    }
}

/// 组装并校验文档
pub fn execute(
    context: &PaperContext,
    state: &ResearchState,
    paper: &ComposedPaper,
    bibliography: &Bibliography,
) -> Result<PaperSource, PaperError> {
    let tex = assemble(paper, state, bibliography, &context.config.author);
    let (tex, mut report) = validator::validate(
        &tex,
        bibliography,
        context.config.generation.min_section_chars,
    )?;
    for warning in self_report_warnings(paper) {
        tracing::warn!("⚠️ 引用自述不一致: {}", warning);
        report.warnings.push(warning);
    }
    tracing::info!(
        "🧾 文档校验完成: 改写占位符 {} 处，删除未知citekey {} 个，结构警告 {} 条",
        report.rewritten,
        report.stripped.len(),
        report.warnings.len()
    );

    Ok(PaperSource {
        tex,
        bib: bibliography.to_bib_file(),
    })
}

/// 对比各章节自述的 citations_used 与正文中实际出现的citekey，只产生警告
pub fn self_report_warnings(paper: &ComposedPaper) -> Vec<String> {
    let mut sections: Vec<(String, &str, &[String])> = vec![
        (
            "front_matter".to_string(),
            paper.metadata.abstract_text.as_str(),
            paper.metadata.citations_used.as_slice(),
        ),
        (
            "background".to_string(),
            paper.background.content.as_str(),
            paper.background.citations_used.as_slice(),
        ),
    ];
    for section in &paper.discoveries {
        sections.push((
            format!("discovery_{}", section.index + 1),
            section.content.as_str(),
            section.citations_used.as_slice(),
        ));
    }

    let mut warnings = Vec::new();
    for (name, content, claimed) in sections {
        let cited = citations::cited_keys(content);
        let claimed: Vec<&str> = claimed
            .iter()
            .map(|key| key.trim())
            .filter(|key| !key.is_empty())
            .collect();
        for key in claimed.iter().filter(|key| !cited.iter().any(|c| c == *key)) {
            warnings.push(format!(
                "section `{}` lists `{}` in citations_used but never cites it",
                name, key
            ));
        }
        for key in cited.iter().filter(|key| !claimed.contains(&key.as_str())) {
            warnings.push(format!(
                "section `{}` cites `{}` without listing it in citations_used",
                name, key
            ));
        }
    }
    warnings
}

/// 按固定结构拼接LaTeX文档
pub fn assemble(
    paper: &ComposedPaper,
    state: &ResearchState,
    bibliography: &Bibliography,
    author: &str,
) -> String {
    let mut tex = String::new();

    tex.push_str(
        r"\documentclass[11pt]{article}
\usepackage[utf8]{inputenc}
\usepackage[T1]{fontenc}
\usepackage{amsmath}
\usepackage{amssymb}
\usepackage{graphicx}
\usepackage[numbers]{natbib}
\usepackage{hyperref}
",
    );
    tex.push('\n');
    tex.push_str(&format!("\\title{{{}}}\n", escape_latex(paper.metadata.title.trim())));
    tex.push_str(&format!("\\author{{{}}}\n", escape_latex(author)));
    tex.push_str("\\date{\\today}\n\n");
    tex.push_str("\\begin{document}\n\\maketitle\n\n");

    tex.push_str("\\begin{abstract}\n");
    tex.push_str(sanitize_fragment(&paper.metadata.abstract_text).trim());
    tex.push_str("\n\\end{abstract}\n\n");

    let keywords: Vec<String> = paper
        .metadata
        .keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .map(escape_latex)
        .collect();
    if !keywords.is_empty() {
        tex.push_str(&format!(
            "\\noindent\\textbf{{Keywords:}} {}\n\n",
            keywords.join(", ")
        ));
    }

    tex.push_str("\\section{Background}\n");
    tex.push_str(sanitize_fragment(&paper.background.content).trim());
    tex.push_str("\n\n");

    if !state.key_insights.is_empty() {
        tex.push_str("\\section{Key Insights}\n\\begin{itemize}\n");
        for insight in &state.key_insights {
            tex.push_str(&format!("  \\item {}\n", escape_latex(insight.trim())));
        }
        tex.push_str("\\end{itemize}\n\n");
    }

    if !state.discoveries.is_empty() {
        tex.push_str("\\section{Summary of Discoveries}\n\\begin{enumerate}\n");
        for discovery in &state.discoveries {
            let summary = if discovery.summary.trim().is_empty() {
                discovery.claim.trim()
            } else {
                discovery.summary.trim()
            };
            if summary.is_empty() {
                tex.push_str(&format!(
                    "  \\item \\textbf{{{}}}\n",
                    escape_latex(discovery.title.trim())
                ));
            } else {
                tex.push_str(&format!(
                    "  \\item \\textbf{{{}}}: {}\n",
                    escape_latex(discovery.title.trim()),
                    escape_latex(summary)
                ));
            }
        }
        tex.push_str("\\end{enumerate}\n\n");
    }

    for section in &paper.discoveries {
        push_discovery(&mut tex, section, paper.figures_for(section.index));
    }

    if !bibliography.is_empty() {
        tex.push_str(&format!(
            "\\bibliographystyle{{plainnat}}\n\\bibliography{{{}}}\n\n",
            BIB_STEM
        ));
    }
    tex.push_str("\\end{document}\n");
    tex
}

fn push_discovery(tex: &mut String, section: &DiscoverySection, figures: &[FigureInfo]) {
    tex.push_str(&format!("\\section{{{}}}\n", escape_latex(section.title.trim())));
    tex.push_str(&format!("\\label{{sec:discovery{}}}\n", section.index + 1));
    tex.push_str(sanitize_fragment(&section.content).trim());
    tex.push_str("\n\n");

    for figure in figures {
        let Some((stem, extension)) = figure.filename.rsplit_once('.') else {
            continue;
        };
        if !EMBEDDABLE_EXTENSIONS.contains(&extension.to_lowercase().as_str()) {
            tracing::warn!("⚠️ 插图 {} 的格式无法嵌入PDF，已省略", figure.filename);
            continue;
        }

        let caption = section
            .figures
            .iter()
            .find(|c| c.filename == figure.filename && !c.caption.trim().is_empty())
            .map(|c| sanitize_fragment(c.caption.trim()))
            .unwrap_or_else(|| escape_latex(figure.caption_seed.trim()));

        tex.push_str(&format!(
            "\\begin{{figure}}[htbp]\n  \\centering\n  \\includegraphics[width=0.8\\linewidth]{{{}/{}}}\n  \\caption{{{}}}\n  \\label{{fig:{}}}\n\\end{{figure}}\n\n",
            FIGURES_DIR, figure.filename, caption, stem
        ));
    }
}
