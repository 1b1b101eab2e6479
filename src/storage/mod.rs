//! 对象存储服务：上传论文产物、下载任务插图、生成限时访问链接

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::signer::Signer;
use object_store::{Attribute, Attributes, ObjectStore, PutOptions, PutPayload};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{StorageBackend, StorageConfig};

#[async_trait]
pub trait StorageService: Send + Sync {
    async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()>;

    async fn download(&self, key: &str) -> Result<Vec<u8>>;

    /// 生成限时访问链接
    async fn presigned_url(&self, key: &str, ttl: Duration) -> Result<String>;
}

/// 论文产物的对象键：{prefix}/{user}/{conversation}/{paper}/{file}
pub fn artifact_key(
    prefix: &str,
    user_id: &str,
    conversation_id: &str,
    paper_id: &str,
    file_name: &str,
) -> String {
    let prefix = prefix.trim_matches('/');
    let parts = [user_id, conversation_id, paper_id, file_name];
    if prefix.is_empty() {
        parts.join("/")
    } else {
        format!("{}/{}", prefix, parts.join("/"))
    }
}

/// 链接签发方式
enum Presigner {
    Signer(Arc<dyn Signer>),
    Local(PathBuf),
    Memory,
}

/// 基于object_store的存储实现
pub struct ObjectStoreStorage {
    store: Arc<dyn ObjectStore>,
    presigner: Presigner,
    /// 后端是否支持在对象上保存Content-Type
    with_attributes: bool,
}

impl ObjectStoreStorage {
    /// 根据配置创建存储后端
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        match config.backend {
            StorageBackend::Local => {
                std::fs::create_dir_all(&config.local_root).context(format!(
                    "Failed to create storage root: {:?}",
                    config.local_root
                ))?;
                let root = config.local_root.canonicalize()?;
                let store = LocalFileSystem::new_with_prefix(&root)?;
                Ok(Self {
                    store: Arc::new(store),
                    presigner: Presigner::Local(root),
                    with_attributes: false,
                })
            }
            StorageBackend::S3 => {
                let bucket = config
                    .bucket
                    .as_deref()
                    .ok_or_else(|| anyhow!("storage.bucket is required for the s3 backend"))?;
                let s3 = Arc::new(
                    AmazonS3Builder::from_env()
                        .with_bucket_name(bucket)
                        .build()?,
                );
                Ok(Self {
                    store: s3.clone(),
                    presigner: Presigner::Signer(s3),
                    with_attributes: true,
                })
            }
        }
    }

    /// 内存后端，用于测试与本地演练
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(InMemory::new()),
            presigner: Presigner::Memory,
            with_attributes: true,
        }
    }
}

#[async_trait]
impl StorageService for ObjectStoreStorage {
    async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        let path = ObjectPath::from(key);
        let mut options = PutOptions::default();
        if self.with_attributes {
            let mut attributes = Attributes::new();
            attributes.insert(Attribute::ContentType, content_type.to_string().into());
            options.attributes = attributes;
        }
        self.store
            .put_opts(&path, PutPayload::from(bytes), options)
            .await
            .context(format!("Failed to upload object: {}", key))?;
        Ok(())
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>> {
        let path = ObjectPath::from(key);
        let result = self
            .store
            .get(&path)
            .await
            .context(format!("Failed to download object: {}", key))?;
        Ok(result.bytes().await?.to_vec())
    }

    async fn presigned_url(&self, key: &str, ttl: Duration) -> Result<String> {
        match &self.presigner {
            Presigner::Signer(signer) => {
                let url = signer
                    .signed_url(reqwest::Method::GET, &ObjectPath::from(key), ttl)
                    .await?;
                Ok(url.to_string())
            }
            Presigner::Local(root) => reqwest::Url::from_file_path(root.join(key))
                .map(|url| url.to_string())
                .map_err(|_| anyhow!("Failed to build file url for {}", key)),
            Presigner::Memory => Ok(format!("memory:///{}?expires_in={}", key, ttl.as_secs())),
        }
    }
}
