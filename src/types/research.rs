use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// 深度研究对话沉淀下来的状态，论文生成的唯一输入
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResearchState {
    /// 研究目标
    pub objective: String,
    /// 关键洞察
    #[serde(default)]
    pub key_insights: Vec<String>,
    /// 由证据支撑的发现
    #[serde(default)]
    pub discoveries: Vec<Discovery>,
    /// 研究过程中执行过的任务
    #[serde(default)]
    pub tasks: Vec<TaskRecord>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Discovery {
    pub title: String,
    #[serde(default)]
    pub claim: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub evidence: Vec<Evidence>,
}

/// 发现与任务之间的证据关联
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Evidence {
    pub task_id: String,
    #[serde(default)]
    pub explanation: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    #[serde(default)]
    pub objective: String,
    /// 任务的文本输出，可能包含DOI、URL等引用
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub artifacts: Vec<TaskArtifact>,
}

/// 任务产出的文件，path为对象存储中的键
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskArtifact {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub description: String,
}

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "gif", "webp"];

impl TaskArtifact {
    /// 小写的文件扩展名
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.name)
            .extension()
            .or_else(|| Path::new(&self.path).extension())
            .map(|ext| ext.to_string_lossy().to_lowercase())
    }

    pub fn is_image(&self) -> bool {
        self.extension()
            .map(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
            .unwrap_or(false)
    }

    pub fn media_type(&self) -> &'static str {
        match self.extension().as_deref() {
            Some("png") => "image/png",
            Some("jpg") | Some("jpeg") => "image/jpeg",
            Some("gif") => "image/gif",
            Some("webp") => "image/webp",
            _ => "application/octet-stream",
        }
    }
}

impl ResearchState {
    /// 从JSON文件加载研究状态
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read research state: {:?}", path))?;
        let state: ResearchState =
            serde_json::from_str(&content).context("Failed to parse research state")?;
        Ok(state)
    }

    /// 至少支撑一个发现的任务ID
    pub fn supporting_task_ids(&self) -> HashSet<&str> {
        self.discoveries
            .iter()
            .flat_map(|d| d.evidence.iter().map(|e| e.task_id.as_str()))
            .collect()
    }

    /// 支撑发现的任务，按任务原始顺序
    pub fn supporting_tasks(&self) -> Vec<&TaskRecord> {
        let ids = self.supporting_task_ids();
        self.tasks
            .iter()
            .filter(|task| ids.contains(task.id.as_str()))
            .collect()
    }

    /// 支撑指定发现的任务
    pub fn tasks_for_discovery(&self, index: usize) -> Vec<&TaskRecord> {
        let Some(discovery) = self.discoveries.get(index) else {
            return Vec::new();
        };
        let ids: HashSet<&str> = discovery
            .evidence
            .iter()
            .map(|e| e.task_id.as_str())
            .collect();
        self.tasks
            .iter()
            .filter(|task| ids.contains(task.id.as_str()))
            .collect()
    }
}
