//! 配置管理模块
//!
//! 提供 YAML 配置文件支持与环境变量覆盖

mod types;
mod yaml;

pub use types::{
    app_data_dir, Config, LoggingConfig, PromptCacheConfig, ProviderConfig, ServerConfig,
    StorageConfig, UpstreamConfig,
};
pub use yaml::{
    apply_env_overrides, default_config_path, load_config, load_with_env, save_config,
    ConfigError,
};
