//! 配置源
//!
//! 从配置文件加载 [`ReferenceConfig`]，并允许环境变量覆盖文件中的值。

use di_abstractions::ReferenceConfig;
use infrastructure_common::{ConfigError, ConfigResult};
use std::path::Path;
use tracing::{debug, error, info};

/// 默认环境变量前缀
pub const DEFAULT_ENV_PREFIX: &str = "REFERENCE";

/// 从文件加载引用解析配置
///
/// 文件格式由扩展名决定（toml、json、yaml）。形如 `REFERENCE_MAX_SCOPE_CHAIN_DEPTH`
/// 的环境变量覆盖文件中的同名项，未出现的项取默认值。
pub fn load_reference_config(path: &Path, env_prefix: &str) -> ConfigResult<ReferenceConfig> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound {
            path: path.display().to_string(),
        });
    }

    info!("加载引用解析配置: {}", path.display());
    let settings = config::Config::builder()
        .add_source(config::File::from(path))
        .add_source(
            config::Environment::with_prefix(env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .map_err(|e| {
            error!("配置构建失败: {}", e);
            ConfigError::ParseError {
                source: Box::new(e),
            }
        })?;

    let config: ReferenceConfig = settings.try_deserialize().map_err(|e| {
        error!("配置绑定失败: path={}, error={}", path.display(), e);
        ConfigError::ParseError {
            source: Box::new(e),
        }
    })?;
    config.validate()?;

    debug!("引用解析配置: {:?}", config);
    Ok(config)
}
