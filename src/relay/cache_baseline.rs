//! Prompt Caching 基线
//!
//! 进程内共享：首次运行记录未命中缓存时的响应时间，之后的运行以此计算加速比。
//! 基线在 TTL（与上游缓存一致的 1 小时）过期后清除，下一次运行重新记录。

use crate::config::PromptCacheConfig;
use parking_lot::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
struct Baseline {
    seconds: f64,
    recorded_at: Instant,
}

pub struct PromptCacheState {
    /// 参考文档内容；文件缺失时为 `None`
    document: Option<String>,
    /// 进程启动时间戳，作为缓存前缀保证同一进程内缓存键稳定
    cache_timestamp: i64,
    ttl: Duration,
    baseline: Mutex<Option<Baseline>>,
}

impl PromptCacheState {
    pub fn new(document: Option<String>, ttl: Duration) -> Self {
        Self {
            document,
            cache_timestamp: chrono::Utc::now().timestamp(),
            ttl,
            baseline: Mutex::new(None),
        }
    }

    /// 从配置路径读取参考文档
    pub fn load(config: &PromptCacheConfig) -> Self {
        let document = match std::fs::read_to_string(&config.document_path) {
            Ok(content) => {
                tracing::info!(
                    "[RELAY] 已加载参考文档: {} 字符 ({:?})",
                    content.chars().count(),
                    config.document_path
                );
                Some(content)
            }
            Err(e) => {
                tracing::warn!(
                    "[RELAY] 参考文档不可用 {:?}: {}",
                    config.document_path,
                    e
                );
                None
            }
        };
        Self::new(document, Duration::from_secs(config.baseline_ttl_secs))
    }

    /// 带时间戳前缀、`<book>` 包裹的缓存文本块内容
    pub fn cached_text(&self) -> Option<String> {
        self.document
            .as_ref()
            .filter(|d| !d.is_empty())
            .map(|d| format!("{}<book>{}</book>", self.cache_timestamp, d))
    }

    /// 当前有效的基线（秒）；已过期的基线在此清除
    pub fn baseline(&self, now: Instant) -> Option<f64> {
        let mut guard = self.baseline.lock();
        match *guard {
            Some(b) if now.saturating_duration_since(b.recorded_at) >= self.ttl => {
                tracing::info!("[RELAY] Prompt Caching 基线已过期，重新记录");
                *guard = None;
                None
            }
            Some(b) => Some(b.seconds),
            None => None,
        }
    }

    pub fn record_baseline(&self, seconds: f64, now: Instant) {
        *self.baseline.lock() = Some(Baseline {
            seconds,
            recorded_at: now,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_baseline_expires_after_ttl() {
        let state = PromptCacheState::new(Some("doc".to_string()), Duration::from_secs(3600));
        let t0 = Instant::now();
        assert_eq!(state.baseline(t0), None);

        state.record_baseline(4.2, t0);
        assert_eq!(state.baseline(t0 + Duration::from_secs(10)), Some(4.2));
        assert_eq!(state.baseline(t0 + Duration::from_secs(3600)), None);
        // 过期后保持清空
        assert_eq!(state.baseline(t0 + Duration::from_secs(10)), None);
    }

    #[test]
    fn test_cached_text_is_stable() {
        let state = PromptCacheState::new(Some("annual".to_string()), Duration::from_secs(60));
        let first = state.cached_text().unwrap();
        assert!(first.ends_with("<book>annual</book>"));
        assert_eq!(state.cached_text().unwrap(), first);

        let empty = PromptCacheState::new(Some(String::new()), Duration::from_secs(60));
        assert!(empty.cached_text().is_none());
    }

    #[test]
    fn test_load_missing_document() {
        let temp = tempfile::TempDir::new().unwrap();
        let config = PromptCacheConfig {
            document_path: temp.path().join("missing.html"),
            baseline_ttl_secs: 3600,
        };
        assert!(PromptCacheState::load(&config).cached_text().is_none());

        let path = temp.path().join("report.html");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(b"<html>revenue</html>").unwrap();
        let config = PromptCacheConfig {
            document_path: path,
            baseline_ttl_secs: 3600,
        };
        assert!(PromptCacheState::load(&config)
            .cached_text()
            .unwrap()
            .contains("<html>revenue</html>"));
    }
}
