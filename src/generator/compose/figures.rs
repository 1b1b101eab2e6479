use std::path::Path;

use crate::config::GenerationConfig;
use crate::llm::ImageAttachment;
use crate::storage::StorageService;
use crate::types::paper::FigureInfo;
use crate::types::research::ResearchState;

/// 工作目录中存放插图的子目录
pub const FIGURES_DIR: &str = "figures";

/// 单个发现章节可用的插图
#[derive(Debug, Clone, Default)]
pub struct SectionFigures {
    pub figures: Vec<FigureInfo>,
    /// 发送给模型的图片，数量受单次请求上限约束
    pub images: Vec<ImageAttachment>,
}

/// 下载每个发现的支撑任务产出的图片，写入工作目录的 figures/ 下。
///
/// 返回值与 `state.discoveries` 一一对应。下载失败或超过大小上限的图片会被跳过。
pub async fn prepare_figures(
    storage: &dyn StorageService,
    config: &GenerationConfig,
    state: &ResearchState,
    workspace: &Path,
) -> std::io::Result<Vec<SectionFigures>> {
    let figures_dir = workspace.join(FIGURES_DIR);
    tokio::fs::create_dir_all(&figures_dir).await?;

    let mut sections = Vec::with_capacity(state.discoveries.len());
    for index in 0..state.discoveries.len() {
        let mut section = SectionFigures::default();

        'tasks: for task in state.tasks_for_discovery(index) {
            for artifact in task.artifacts.iter().filter(|a| a.is_image()) {
                if section.figures.len() >= config.max_figures_per_section {
                    break 'tasks;
                }

                let bytes = match storage.download(&artifact.path).await {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        tracing::warn!("⚠️ 无法下载插图 {}，已跳过: {}", artifact.path, err);
                        continue;
                    }
                };
                if bytes.len() > config.max_image_bytes {
                    tracing::warn!(
                        "⚠️ 插图 {} 大小为 {} 字节，超过上限 {}，已跳过",
                        artifact.path,
                        bytes.len(),
                        config.max_image_bytes
                    );
                    continue;
                }

                let extension = artifact.extension().unwrap_or_else(|| "png".to_string());
                let filename = format!(
                    "fig{}_{}.{}",
                    index + 1,
                    section.figures.len() + 1,
                    extension
                );
                tokio::fs::write(figures_dir.join(&filename), &bytes).await?;

                if section.images.len() < config.max_images_per_request {
                    section
                        .images
                        .push(ImageAttachment::from_bytes(artifact.media_type(), &bytes));
                }
                let caption_seed = if artifact.description.trim().is_empty() {
                    artifact.name.clone()
                } else {
                    artifact.description.clone()
                };
                section.figures.push(FigureInfo {
                    filename,
                    caption_seed,
                    source_job_id: task.id.clone(),
                    original_path: artifact.path.clone(),
                });
            }
        }

        if !section.figures.is_empty() {
            tracing::debug!("发现 {} 收录 {} 张插图", index + 1, section.figures.len());
        }
        sections.push(section);
    }
    Ok(sections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ObjectStoreStorage;
    use tempfile::TempDir;

    fn state() -> ResearchState {
        serde_json::from_str(
            r#"{
                "objective": "O",
                "discoveries": [
                    {"title": "D1", "evidence": [{"task_id": "t1"}]},
                    {"title": "D2", "evidence": [{"task_id": "t2"}]}
                ],
                "tasks": [
                    {"id": "t1", "artifacts": [
                        {"name": "a.png", "path": "jobs/t1/a.png", "description": "Survival curve"},
                        {"name": "missing.png", "path": "jobs/t1/missing.png"},
                        {"name": "big.jpg", "path": "jobs/t1/big.jpg"},
                        {"name": "table.csv", "path": "jobs/t1/table.csv"},
                        {"name": "b.webp", "path": "jobs/t1/b.webp"},
                        {"name": "c.png", "path": "jobs/t1/c.png"}
                    ]},
                    {"id": "t2", "artifacts": []}
                ]
            }"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_prepare_figures_skips_and_caps() {
        let storage = ObjectStoreStorage::in_memory();
        for (key, size) in [
            ("jobs/t1/a.png", 10),
            ("jobs/t1/big.jpg", 100),
            ("jobs/t1/table.csv", 10),
            ("jobs/t1/b.webp", 10),
            ("jobs/t1/c.png", 10),
        ] {
            storage
                .upload(key, vec![7u8; size], "application/octet-stream")
                .await
                .unwrap();
        }

        let config = GenerationConfig {
            max_figures_per_section: 2,
            max_images_per_request: 1,
            max_image_bytes: 50,
            ..GenerationConfig::default()
        };
        let workspace = TempDir::new().unwrap();
        let sections = prepare_figures(&storage, &config, &state(), workspace.path())
            .await
            .unwrap();

        assert_eq!(sections.len(), 2);
        let first = &sections[0];
        let names: Vec<_> = first.figures.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(names, vec!["fig1_1.png", "fig1_2.webp"]);
        assert_eq!(first.figures[0].caption_seed, "Survival curve");
        assert_eq!(first.figures[1].caption_seed, "b.webp");
        assert_eq!(first.figures[1].source_job_id, "t1");
        assert_eq!(first.images.len(), 1);
        assert!(workspace.path().join("figures/fig1_2.webp").exists());
        assert!(sections[1].figures.is_empty());
    }
}
