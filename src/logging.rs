//! 日志初始化
use crate::config::LoggingConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// 初始化全局 tracing subscriber
///
/// `RUST_LOG` 优先于配置中的级别；`json = true` 时输出结构化 JSON 行。
/// 重复调用是安全的（后续调用不生效）。
pub fn init_tracing(config: &LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(&config.level)));

    let result = if config.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
    };

    if let Err(e) = result {
        tracing::debug!("tracing subscriber already set: {}", e);
    }
}

fn default_directive(level: &str) -> String {
    format!("featurecast={level},featurecast_lib={level},tower_http=warn")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive_covers_both_targets() {
        let directive = default_directive("debug");
        assert!(directive.contains("featurecast_lib=debug"));
        assert!(directive.contains("featurecast=debug"));
    }

    #[test]
    fn test_init_twice_does_not_panic() {
        init_tracing(&LoggingConfig::default());
        init_tracing(&LoggingConfig {
            level: "debug".to_string(),
            json: true,
        });
    }
}
