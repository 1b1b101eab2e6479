//! 编译降级状态机
//!
//! 初次编译 → (引用未定义) 删除这些引用后重编译 → (仍失败) 删除全部引用与参考文献后重编译 → 失败则终止。
//! 状态转移是纯函数，工具链通过 [`Toolchain`](super::toolchain::Toolchain) 注入。

use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use super::toolchain::{CompileJob, DOCUMENT_STEM};
use crate::generator::assemble::PaperSource;
use crate::generator::assemble::citations::{remove_cite_keys, strip_all_cites};
use crate::generator::context::PaperContext;
use crate::generator::error::PaperError;
use crate::generator::references::bibtex::remove_entries;
use crate::types::paper::CompileResult;

static UNDEFINED_CITATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Citation [`']([^'\s]+)' (?:on page \d+ )?undefined").unwrap()
});
static MISSING_ENTRY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"didn't find a database entry for "([^"]+)""#).unwrap());
static BIBLIOGRAPHY_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*\\(?:bibliographystyle|bibliography)\{[^}]*\}[ \t]*\n?").unwrap()
});

/// 编译产生的中间文件
const BUILD_EXTENSIONS: [&str; 6] = ["aux", "bbl", "blg", "log", "out", "pdf"];

/// 当前所处的编译阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileStage {
    Initial,
    /// 删除未定义引用后的重编译
    CitationRecovery,
    /// 删除全部引用后的重编译
    FullStrip,
}

/// 一次编译之后的下一步
#[derive(Debug, Clone, PartialEq)]
pub enum NextAction {
    Finish,
    RemoveCitations(Vec<String>),
    StripAllCitations,
    Abort,
}

/// 降级的程度
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryOutcome {
    Clean,
    CitationsRemoved(Vec<String>),
    CitationsStripped,
}

/// 编译成功的论文
#[derive(Debug, Clone)]
pub struct CompiledPaper {
    pub pdf_path: PathBuf,
    /// 最终参与编译的源码
    pub source: PaperSource,
    pub outcome: RecoveryOutcome,
}

/// 根据编译结果决定下一步
pub fn next_action(stage: CompileStage, result: &CompileResult) -> NextAction {
    match stage {
        CompileStage::Initial => {
            let undefined = undefined_citations(&result.logs);
            if !undefined.is_empty() {
                NextAction::RemoveCitations(undefined)
            } else if result.success {
                NextAction::Finish
            } else {
                NextAction::StripAllCitations
            }
        }
        CompileStage::CitationRecovery => {
            if result.success {
                NextAction::Finish
            } else {
                NextAction::StripAllCitations
            }
        }
        CompileStage::FullStrip => {
            if result.success {
                NextAction::Finish
            } else {
                NextAction::Abort
            }
        }
    }
}

/// 把动作应用到源码上，返回新的源码
pub fn apply_action(source: &PaperSource, action: &NextAction) -> PaperSource {
    match action {
        NextAction::RemoveCitations(keys) => {
            let keys: HashSet<&str> = keys.iter().map(String::as_str).collect();
            PaperSource {
                tex: remove_cite_keys(&source.tex, &keys),
                bib: remove_entries(&source.bib, &keys),
            }
        }
        NextAction::StripAllCitations => PaperSource {
            tex: BIBLIOGRAPHY_LINE_RE
                .replace_all(&strip_all_cites(&source.tex), "")
                .into_owned(),
            bib: String::new(),
        },
        NextAction::Finish | NextAction::Abort => source.clone(),
    }
}

/// 从LaTeX与bibtex日志中找出未定义的引用，按首次出现排序
pub fn undefined_citations(logs: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut keys = Vec::new();
    let mut found: Vec<(usize, &str)> = UNDEFINED_CITATION_RE
        .captures_iter(logs)
        .chain(MISSING_ENTRY_RE.captures_iter(logs))
        .filter_map(|caps| caps.get(1).map(|m| (m.start(), m.as_str())))
        .collect();
    found.sort_by_key(|(position, _)| *position);
    for (_, key) in found {
        if seen.insert(key) {
            keys.push(key.to_string());
        }
    }
    keys
}

/// 日志的最后若干行
pub fn log_tail(logs: &str, lines: usize) -> String {
    let all: Vec<&str> = logs.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

/// 按降级阶梯编译，直到得到PDF或所有阶段都失败
pub async fn compile_with_recovery(
    context: &PaperContext,
    workdir: &Path,
    source: PaperSource,
) -> Result<CompiledPaper, PaperError> {
    let mut stage = CompileStage::Initial;
    let mut source = source;
    let mut outcome = RecoveryOutcome::Clean;

    loop {
        clean_build_outputs(workdir).await?;
        source.write_to(workdir).await?;

        let job = CompileJob {
            run_bibtex: source.has_bibliography(),
        };
        tracing::info!("📄 编译论文 ({:?})", stage);
        let result = context.toolchain.compile(workdir, &job).await;

        let action = next_action(stage, &result);
        match &action {
            NextAction::Finish => {
                let Some(pdf_path) = result.pdf_path else {
                    return Err(PaperError::Compile {
                        log_tail: log_tail(&result.logs, context.config.compile.log_tail_lines),
                    });
                };
                tracing::info!("✅ 编译成功");
                return Ok(CompiledPaper {
                    pdf_path,
                    source,
                    outcome,
                });
            }
            NextAction::Abort => {
                tracing::error!("❌ 删除全部引用后编译仍然失败");
                return Err(PaperError::Compile {
                    log_tail: log_tail(&result.logs, context.config.compile.log_tail_lines),
                });
            }
            NextAction::RemoveCitations(keys) => {
                tracing::warn!(
                    "⚠️ 发现未定义的引用 {}，删除后重新编译，论文将缺少这些引用",
                    keys.join(", ")
                );
                stage = CompileStage::CitationRecovery;
                outcome = RecoveryOutcome::CitationsRemoved(keys.clone());
            }
            NextAction::StripAllCitations => {
                tracing::warn!("⚠️ 编译失败，删除全部引用与参考文献后重新编译，论文将不含参考文献");
                stage = CompileStage::FullStrip;
                outcome = RecoveryOutcome::CitationsStripped;
            }
        }
        source = apply_action(&source, &action);
    }
}

async fn clean_build_outputs(workdir: &Path) -> std::io::Result<()> {
    for extension in BUILD_EXTENSIONS {
        let path = workdir.join(format!("{}.{}", DOCUMENT_STEM, extension));
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err),
        }
    }
    Ok(())
}
