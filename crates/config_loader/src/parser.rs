//! 采集配置的序列化格式
//!
//! TOML 是手写配置的主格式；JSON 便于脚本生成与 `info --json` 回读。

use std::path::Path;

use contracts::{AcquisitionBlueprint, ContractError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// 按扩展名识别，大小写不敏感
    pub fn from_extension(ext: &str) -> Option<Self> {
        if ext.eq_ignore_ascii_case("toml") {
            Some(Self::Toml)
        } else if ext.eq_ignore_ascii_case("json") {
            Some(Self::Json)
        } else {
            None
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, ContractError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| {
                ContractError::config_parse(format!(
                    "{} has no extension, expected .toml or .json",
                    path.display()
                ))
            })?;
        Self::from_extension(ext).ok_or_else(|| {
            ContractError::config_parse(format!("unsupported config format: .{ext}"))
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Toml => "TOML",
            Self::Json => "JSON",
        }
    }
}

/// 反序列化；缺省段落由 `#[serde(default)]` 补齐
pub fn parse(content: &str, format: ConfigFormat) -> Result<AcquisitionBlueprint, ContractError> {
    let parsed: Result<AcquisitionBlueprint, Box<dyn std::error::Error + Send + Sync>> =
        match format {
            ConfigFormat::Toml => toml::from_str(content).map_err(Into::into),
            ConfigFormat::Json => serde_json::from_str(content).map_err(Into::into),
        };
    parsed.map_err(|e| ContractError::ConfigParse {
        message: format!("{} parse error: {e}", format.name()),
        source: Some(e),
    })
}

pub fn render(blueprint: &AcquisitionBlueprint, format: ConfigFormat) -> Result<String, ContractError> {
    let rendered = match format {
        ConfigFormat::Toml => toml::to_string_pretty(blueprint).map_err(|e| e.to_string()),
        ConfigFormat::Json => serde_json::to_string_pretty(blueprint).map_err(|e| e.to_string()),
    };
    rendered.map_err(|e| {
        ContractError::config_parse(format!("{} serialize error: {e}", format.name()))
    })
}
