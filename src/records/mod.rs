//! 论文记录：生成开始时写入处理中记录，成功后补全产物键，失败时回滚删除

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaperStatus {
    Processing,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperRecord {
    pub paper_id: String,
    pub user_id: String,
    pub conversation_id: String,
    pub status: PaperStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub pdf_key: Option<String>,
    pub source_key: Option<String>,
}

impl PaperRecord {
    pub fn processing(paper_id: &str, user_id: &str, conversation_id: &str) -> Self {
        let now = Utc::now();
        Self {
            paper_id: paper_id.to_string(),
            user_id: user_id.to_string(),
            conversation_id: conversation_id.to_string(),
            status: PaperStatus::Processing,
            created_at: now,
            updated_at: now,
            pdf_key: None,
            source_key: None,
        }
    }
}

#[async_trait]
pub trait PaperRecordStore: Send + Sync {
    async fn create(&self, record: &PaperRecord) -> Result<()>;

    /// 标记完成并记录产物的对象键
    async fn complete(&self, paper_id: &str, pdf_key: &str, source_key: &str) -> Result<()>;

    /// 回滚：删除记录，记录不存在时不报错
    async fn delete(&self, paper_id: &str) -> Result<()>;

    async fn get(&self, paper_id: &str) -> Result<Option<PaperRecord>>;
}

/// 以JSON文件保存记录
pub struct FsPaperRecordStore {
    dir: PathBuf,
}

impl FsPaperRecordStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn record_path(&self, paper_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", paper_id))
    }

    async fn write(&self, record: &PaperRecord) -> Result<()> {
        fs::create_dir_all(&self.dir).await?;
        let content = serde_json::to_string_pretty(record)?;
        fs::write(self.record_path(&record.paper_id), content)
            .await
            .context(format!("Failed to write paper record {}", record.paper_id))?;
        Ok(())
    }
}

#[async_trait]
impl PaperRecordStore for FsPaperRecordStore {
    async fn create(&self, record: &PaperRecord) -> Result<()> {
        self.write(record).await
    }

    async fn complete(&self, paper_id: &str, pdf_key: &str, source_key: &str) -> Result<()> {
        let mut record = self
            .get(paper_id)
            .await?
            .with_context(|| format!("Paper record {} not found", paper_id))?;
        record.status = PaperStatus::Completed;
        record.pdf_key = Some(pdf_key.to_string());
        record.source_key = Some(source_key.to_string());
        record.updated_at = Utc::now();
        self.write(&record).await
    }

    async fn delete(&self, paper_id: &str) -> Result<()> {
        match fs::remove_file(self.record_path(paper_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, paper_id: &str) -> Result<Option<PaperRecord>> {
        match fs::read_to_string(self.record_path(paper_id)).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
