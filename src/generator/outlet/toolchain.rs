use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command as TokioCommand;

use crate::config::CompileConfig;
use crate::types::paper::CompileResult;

/// 工作目录中的主文档名（不含扩展名）
pub const DOCUMENT_STEM: &str = "paper";

/// 一次编译任务
#[derive(Debug, Clone, PartialEq)]
pub struct CompileJob {
    /// 是否运行bibtex，参考文献被清空后跳过
    pub run_bibtex: bool,
}

/// 外部文档工具链
#[async_trait]
pub trait Toolchain: Send + Sync {
    /// 在工作目录中编译 paper.tex，生成 paper.pdf
    async fn compile(&self, workdir: &Path, job: &CompileJob) -> CompileResult;
}

/// 单个子进程的失败
#[derive(Debug, Error)]
pub enum ToolchainError {
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{program}` timed out after {seconds}s and was killed")]
    Timeout { program: String, seconds: u64 },
    #[error("`{program}` exited with {status}")]
    Failed { program: String, status: String },
}

/// 基于 pdflatex/bibtex 子进程的工具链
pub struct LatexToolchain {
    config: CompileConfig,
}

impl LatexToolchain {
    pub fn new(config: CompileConfig) -> Self {
        Self { config }
    }

    /// 执行一个子进程，输出追加到日志
    async fn run(
        &self,
        program: &str,
        args: &[&str],
        workdir: &Path,
        logs: &mut String,
    ) -> Result<(), ToolchainError> {
        let mut cmd = TokioCommand::new(program);
        cmd.args(args)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // 超时后future被丢弃时杀掉子进程
            .kill_on_drop(true);

        logs.push_str(&format!("$ {} {}\n", program, args.join(" ")));
        let child = cmd.spawn().map_err(|source| ToolchainError::Spawn {
            program: program.to_string(),
            source,
        })?;

        let timeout = self.config.process_timeout();
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(ToolchainError::Spawn {
                    program: program.to_string(),
                    source,
                });
            }
            Err(_) => {
                return Err(ToolchainError::Timeout {
                    program: program.to_string(),
                    seconds: timeout.as_secs(),
                });
            }
        };

        logs.push_str(&String::from_utf8_lossy(&output.stdout));
        logs.push_str(&String::from_utf8_lossy(&output.stderr));

        if output.status.success() {
            Ok(())
        } else {
            Err(ToolchainError::Failed {
                program: program.to_string(),
                status: output.status.to_string(),
            })
        }
    }

    async fn run_engine(&self, workdir: &Path, logs: &mut String) -> Result<(), ToolchainError> {
        let tex = format!("{}.tex", DOCUMENT_STEM);
        self.run(
            &self.config.engine,
            &[
                "-interaction=nonstopmode",
                "-halt-on-error",
                "-file-line-error",
                &tex,
            ],
            workdir,
            logs,
        )
        .await
    }
}

#[async_trait]
impl Toolchain for LatexToolchain {
    async fn compile(&self, workdir: &Path, job: &CompileJob) -> CompileResult {
        let mut logs = String::new();
        let outcome = async {
            self.run_engine(workdir, &mut logs).await?;
            if job.run_bibtex {
                // bibtex失败不中断，未定义的引用会体现在后续引擎日志中
                if let Err(err) = self
                    .run(&self.config.bibtex, &[DOCUMENT_STEM], workdir, &mut logs)
                    .await
                {
                    tracing::warn!("⚠️ {}", err);
                    logs.push_str(&format!("{}\n", err));
                }
            }
            self.run_engine(workdir, &mut logs).await?;
            self.run_engine(workdir, &mut logs).await
        }
        .await;

        let pdf_path = workdir.join(format!("{}.pdf", DOCUMENT_STEM));
        match outcome {
            Ok(()) if pdf_path.exists() => CompileResult {
                success: true,
                pdf_path: Some(pdf_path),
                logs,
            },
            Ok(()) => {
                logs.push_str("engine finished but no PDF was produced\n");
                CompileResult {
                    success: false,
                    pdf_path: None,
                    logs,
                }
            }
            Err(err) => {
                tracing::debug!("编译子进程失败: {}", err);
                logs.push_str(&format!("{}\n", err));
                CompileResult {
                    success: false,
                    pdf_path: None,
                    logs,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(engine: &str, timeout: u64) -> CompileConfig {
        CompileConfig {
            engine: engine.to_string(),
            bibtex: "true".to_string(),
            process_timeout_seconds: timeout,
            log_tail_lines: 10,
        }
    }

    #[tokio::test]
    async fn test_missing_engine_reports_failure() {
        let dir = TempDir::new().unwrap();
        let toolchain = LatexToolchain::new(config("definitely-not-a-latex-engine", 5));
        let result = toolchain
            .compile(dir.path(), &CompileJob { run_bibtex: true })
            .await;

        assert!(!result.success);
        assert!(result.pdf_path.is_none());
        assert!(result.logs.contains("failed to spawn"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_engine_without_pdf_is_failure() {
        let dir = TempDir::new().unwrap();
        // `true` 接受任意参数并成功退出，但不会生成PDF
        let toolchain = LatexToolchain::new(config("true", 5));
        let result = toolchain
            .compile(dir.path(), &CompileJob { run_bibtex: false })
            .await;

        assert!(!result.success);
        assert!(result.logs.contains("no PDF"));
        assert_eq!(result.logs.matches("$ true").count(), 3);
    }
}
