use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// 应用配置的根结构。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub bounds: BoundsConfig,
    #[serde(default)]
    pub layers: LayerFilterConfig,
}

impl AppConfig {
    /// 从显式路径加载配置。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate().map_err(|message| ConfigError::Invalid {
            path: path.to_path_buf(),
            message,
        })?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), String> {
        if self.bounds.max_depth == 0 {
            return Err("bounds.max_depth 必须大于 0".to_string());
        }
        Ok(())
    }

    /// 自动发现配置文件：优先读取环境变量 `BLOCKEXT_CONFIG`，否则寻找 `./config/default.toml`。
    /// 若文件缺失，则返回默认配置。
    pub fn discover() -> Result<Self, ConfigError> {
        if let Some(path) = env::var_os("BLOCKEXT_CONFIG") {
            return Self::from_file(PathBuf::from(path));
        }

        let default_path = env::current_dir()
            .map(|dir| dir.join("config").join("default.toml"))
            .map_err(|source| ConfigError::Context {
                message: "获取当前工作目录失败".to_string(),
                source,
            })?;

        if default_path.exists() {
            Self::from_file(default_path)
        } else {
            Ok(Self::default())
        }
    }
}

/// 日志配置，支持设置默认等级。
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

/// 包围盒聚合算法。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// 向下组合变换矩阵，在叶子处映射范围。
    #[default]
    Composed,
    /// 逐层计算局部范围，再用本层插入变换向上映射。
    Local,
}

/// 块定义中属性定义的处理策略。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationPolicy {
    /// 仅保留常量且可见的属性定义。
    #[default]
    ConstantVisible,
    /// 忽略全部属性定义。
    ExcludeAll,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BoundsConfig {
    #[serde(default)]
    pub strategy: StrategyKind,
    #[serde(default)]
    pub annotation_policy: AnnotationPolicy,
    #[serde(default = "BoundsConfig::default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "BoundsConfig::default_draw_outline")]
    pub draw_outline: bool,
}

impl BoundsConfig {
    fn default_max_depth() -> usize {
        64
    }

    fn default_draw_outline() -> bool {
        true
    }
}

impl Default for BoundsConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::default(),
            annotation_policy: AnnotationPolicy::default(),
            max_depth: Self::default_max_depth(),
            draw_outline: Self::default_draw_outline(),
        }
    }
}

/// 非几何注释图层名单的版本。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DenylistVersion {
    #[default]
    V1,
    /// 在 V1 基础上增加钻孔区域图层。
    V2,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LayerFilterConfig {
    #[serde(default)]
    pub denylist: DenylistVersion,
    #[serde(default = "LayerFilterConfig::default_reserved")]
    pub reserved: String,
    #[serde(default)]
    pub extra_denied: Vec<String>,
}

impl LayerFilterConfig {
    fn default_reserved() -> String {
        "Defpoints".to_string()
    }
}

impl Default for LayerFilterConfig {
    fn default() -> Self {
        Self {
            denylist: DenylistVersion::default(),
            reserved: Self::default_reserved(),
            extra_denied: Vec::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path:?} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件 {path:?} 失败: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("配置文件 {path:?} 无效: {message}")]
    Invalid { path: PathBuf, message: String },
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: std::io::Error,
    },
}
