//! YAML 配置文件读写与环境变量覆盖
use super::types::{app_data_dir, Config, ProviderConfig};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件失败: {0}")]
    Io(#[from] std::io::Error),
    #[error("解析配置文件失败: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("{0}")]
    Invalid(String),
}

const ENV_ENDPOINT: &str = "FEATURECAST_ENDPOINT";
const ENV_API_KEY: &str = "FEATURECAST_API_KEY";
const ENV_MODEL: &str = "FEATURECAST_MODEL";
const ENV_PORT: &str = "FEATURECAST_PORT";

/// 默认配置文件路径：`~/.featurecast/config.yaml`
pub fn default_config_path() -> PathBuf {
    app_data_dir().join("config.yaml")
}

/// 读取配置文件；文件不存在时返回默认配置
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        tracing::info!("[CONFIG] 配置文件不存在，使用默认配置: {:?}", path);
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(path)?;
    let config: Config = serde_yaml::from_str(&content)?;
    tracing::info!("[CONFIG] 已加载配置文件: {:?}", path);
    Ok(config)
}

/// 保存配置到 YAML 文件
pub fn save_config(config: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_yaml::to_string(config)?;
    std::fs::write(path, content)?;
    tracing::info!("[CONFIG] 配置已保存: {:?}", path);
    Ok(())
}

/// 应用环境变量覆盖
///
/// 三个 Provider 变量需同时存在才会生效。
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(port) = lookup(ENV_PORT) {
        config.server.port = port
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("{ENV_PORT} 不是合法端口: {port}")))?;
    }

    match (lookup(ENV_ENDPOINT), lookup(ENV_API_KEY), lookup(ENV_MODEL)) {
        (Some(endpoint), Some(api_key), Some(model)) => {
            config.provider = Some(ProviderConfig::validated(&endpoint, &api_key, &model)?);
            tracing::info!("[CONFIG] 使用环境变量中的 Provider 配置: {}", endpoint);
        }
        (None, None, None) => {}
        _ => {
            tracing::warn!(
                "[CONFIG] {}/{}/{} 未同时设置，忽略环境变量中的 Provider 配置",
                ENV_ENDPOINT,
                ENV_API_KEY,
                ENV_MODEL
            );
        }
    }
    Ok(())
}

/// 读取配置文件，加载 `.env` 并应用进程环境变量覆盖
pub fn load_with_env(path: &Path) -> Result<Config, ConfigError> {
    let mut config = load_config(path)?;
    dotenvy::dotenv().ok();
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    Ok(config)
}
