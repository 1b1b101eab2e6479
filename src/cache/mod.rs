use anyhow::Result;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs;

use crate::config::CacheConfig;

/// 缓存管理器
pub struct CacheManager {
    config: CacheConfig,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

/// 缓存条目
#[derive(Debug, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub data: T,
    pub timestamp: u64,
    /// 缓存键的MD5哈希值
    pub key_hash: String,
}

/// 命中统计
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
}

impl CacheManager {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    /// 生成缓存键的MD5哈希
    pub fn hash_key(&self, key: &str) -> String {
        let mut hasher = Md5::new();
        hasher.update(key.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// 获取缓存文件路径
    fn get_cache_path(&self, category: &str, hash: &str) -> PathBuf {
        self.config
            .cache_dir
            .join(category)
            .join(format!("{}.json", hash))
    }

    fn now() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default()
    }

    /// 检查缓存是否过期
    fn is_expired(&self, timestamp: u64) -> bool {
        let expire_seconds = self.config.expire_hours * 3600;
        Self::now().saturating_sub(timestamp) > expire_seconds
    }

    /// 获取缓存，读取或反序列化失败视为未命中
    pub async fn get<T>(&self, category: &str, key: &str) -> Option<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        if !self.config.enabled {
            return None;
        }

        let hash = self.hash_key(key);
        let cache_path = self.get_cache_path(category, &hash);

        let entry = match fs::read_to_string(&cache_path).await {
            Ok(content) => match serde_json::from_str::<CacheEntry<T>>(&content) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::debug!("缓存反序列化失败 {:?}: {}", cache_path, e);
                    None
                }
            },
            Err(_) => None,
        };

        match entry {
            Some(entry) if !self.is_expired(entry.timestamp) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.data)
            }
            Some(_) => {
                // 删除过期缓存
                let _ = fs::remove_file(&cache_path).await;
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// 设置缓存
    pub async fn set<T>(&self, category: &str, key: &str, data: T) -> Result<()>
    where
        T: Serialize,
    {
        if !self.config.enabled {
            return Ok(());
        }

        let hash = self.hash_key(key);
        let cache_path = self.get_cache_path(category, &hash);

        // 确保目录存在
        if let Some(parent) = cache_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let entry = CacheEntry {
            data,
            timestamp: Self::now(),
            key_hash: hash,
        };

        let content = serde_json::to_string_pretty(&entry)?;
        fs::write(&cache_path, content).await?;
        Ok(())
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager(dir: &TempDir, enabled: bool, expire_hours: u64) -> CacheManager {
        CacheManager::new(CacheConfig {
            enabled,
            cache_dir: dir.path().to_path_buf(),
            expire_hours,
        })
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let dir = TempDir::new().unwrap();
        let cache = manager(&dir, true, 24);

        assert_eq!(cache.get::<String>("doi", "10.1000/a").await, None);
        cache
            .set("doi", "10.1000/a", "@article{a, title={A}}".to_string())
            .await
            .unwrap();
        assert_eq!(
            cache.get::<String>("doi", "10.1000/a").await.as_deref(),
            Some("@article{a, title={A}}")
        );
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1 });
    }

    #[tokio::test]
    async fn test_expired_entry_is_removed() {
        let dir = TempDir::new().unwrap();
        let cache = manager(&dir, true, 1);
        let hash = cache.hash_key("k");
        let path = dir.path().join("doi").join(format!("{}.json", hash));
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            serde_json::json!({"data": "old", "timestamp": 0, "key_hash": hash}).to_string(),
        )
        .unwrap();

        assert_eq!(cache.get::<String>("doi", "k").await, None);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_disabled_cache_is_noop() {
        let dir = TempDir::new().unwrap();
        let cache = manager(&dir, false, 24);
        cache.set("doi", "k", 1u32).await.unwrap();
        assert_eq!(cache.get::<u32>("doi", "k").await, None);
        assert_eq!(cache.stats(), CacheStats::default());
    }
}
