//! # Config Loader
//!
//! 采集配置（串口、相机、录制模式、同步频率、存储路径）的读取、校验与回写。
//!
//! 文件按扩展名区分 TOML / JSON，缺省段落使用默认值，读入后立即校验，
//! 调用方拿到的 [`AcquisitionBlueprint`] 总是合法的。
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let blueprint = ConfigLoader::load_from_path(Path::new("acquisition.toml"))?;
//! println!("GPS port: {}", blueprint.gps.port);
//! # Ok::<(), contracts::ContractError>(())
//! ```

mod parser;
mod validator;

pub use contracts::AcquisitionBlueprint;
pub use parser::ConfigFormat;

use std::io;
use std::path::Path;

use contracts::ContractError;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Read, parse and validate a config file
    pub fn load_from_path(path: &Path) -> Result<AcquisitionBlueprint, ContractError> {
        let format = ConfigFormat::from_path(path)?;
        let content = read(path)?;
        Self::load_from_str(&content, format)
    }

    /// Like [`load_from_path`](Self::load_from_path), but a missing file is `Ok(None)`
    pub fn load_optional(path: &Path) -> Result<Option<AcquisitionBlueprint>, ContractError> {
        match Self::load_from_path(path) {
            Ok(blueprint) => Ok(Some(blueprint)),
            Err(ContractError::Io(e)) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn load_from_str(
        content: &str,
        format: ConfigFormat,
    ) -> Result<AcquisitionBlueprint, ContractError> {
        let blueprint = parser::parse(content, format)?;
        validator::validate(&blueprint)?;
        Ok(blueprint)
    }

    /// Re-run validation, e.g. after applying command-line overrides
    pub fn validate(blueprint: &AcquisitionBlueprint) -> Result<(), ContractError> {
        validator::validate(blueprint)
    }

    pub fn to_toml(blueprint: &AcquisitionBlueprint) -> Result<String, ContractError> {
        parser::render(blueprint, ConfigFormat::Toml)
    }

    pub fn to_json(blueprint: &AcquisitionBlueprint) -> Result<String, ContractError> {
        parser::render(blueprint, ConfigFormat::Json)
    }

    /// Write a blueprint in the format implied by the extension
    ///
    /// Invalid blueprints are refused so every saved file loads back.
    pub fn save_to_path(blueprint: &AcquisitionBlueprint, path: &Path) -> Result<(), ContractError> {
        let format = ConfigFormat::from_path(path)?;
        validator::validate(blueprint)?;
        let rendered = parser::render(blueprint, format)?;
        std::fs::write(path, rendered)?;
        Ok(())
    }
}

fn read(path: &Path) -> Result<String, ContractError> {
    Ok(std::fs::read_to_string(path)?)
}
