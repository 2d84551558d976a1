//! 配置校验模块
//!
//! 校验规则：
//! - 字段范围 (fps / rate_hz / baud_rate / 色温 / 队列容量)，由 `validator` derive 完成
//! - 启用的串口必须指定端口
//! - GPS 与传感器不能共用同一端口
//! - exposure_time_us 必须落在 exposure_preset 范围内

use contracts::{AcquisitionBlueprint, ContractError, SerialDeviceConfig};
use ::validator::{Validate, ValidationErrors, ValidationErrorsKind};

/// 校验 AcquisitionBlueprint 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(blueprint: &AcquisitionBlueprint) -> Result<(), ContractError> {
    validate_field_ranges(blueprint)?;
    validate_serial_ports(blueprint)?;
    validate_exposure_preset(blueprint)?;
    Ok(())
}

/// 字段范围校验 (derive)
fn validate_field_ranges(blueprint: &AcquisitionBlueprint) -> Result<(), ContractError> {
    blueprint.validate().map_err(|errors| {
        let (field, message) = first_error("", &errors)
            .unwrap_or_else(|| ("<root>".to_string(), "invalid configuration".to_string()));
        ContractError::config_validation(field, message)
    })
}

/// 遍历嵌套校验错误，按字段路径报告第一个
fn first_error(prefix: &str, errors: &ValidationErrors) -> Option<(String, String)> {
    let mut entries: Vec<_> = errors.errors().iter().collect();
    entries.sort_by_key(|(name, _)| name.to_string());

    for (name, kind) in entries {
        let path = if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{prefix}.{name}")
        };

        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                if let Some(err) = field_errors.first() {
                    let mut message = err
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("failed '{}' check", err.code));
                    if let Some(value) = err.params.get("value") {
                        message.push_str(&format!(", got {value}"));
                    }
                    return Some((path, message));
                }
            }
            ValidationErrorsKind::Struct(inner) => {
                if let Some(found) = first_error(&path, inner) {
                    return Some(found);
                }
            }
            ValidationErrorsKind::List(items) => {
                for (idx, inner) in items {
                    if let Some(found) = first_error(&format!("{path}[{idx}]"), inner) {
                        return Some(found);
                    }
                }
            }
        }
    }
    None
}

/// 校验串口配置
fn validate_serial_ports(blueprint: &AcquisitionBlueprint) -> Result<(), ContractError> {
    check_port("gps", &blueprint.gps)?;
    check_port("sensor", &blueprint.sensor)?;

    if blueprint.gps.enabled
        && blueprint.sensor.enabled
        && blueprint.gps.port.eq_ignore_ascii_case(&blueprint.sensor.port)
    {
        return Err(ContractError::config_validation(
            "sensor.port",
            format!(
                "gps and sensor cannot share serial port '{}'",
                blueprint.sensor.port
            ),
        ));
    }
    Ok(())
}

fn check_port(section: &str, device: &SerialDeviceConfig) -> Result<(), ContractError> {
    if device.enabled && device.port.trim().is_empty() {
        return Err(ContractError::config_validation(
            format!("{section}.port"),
            "port cannot be empty when the device is enabled",
        ));
    }
    Ok(())
}

/// 校验曝光预设
fn validate_exposure_preset(blueprint: &AcquisitionBlueprint) -> Result<(), ContractError> {
    let camera = &blueprint.camera;
    if let Some(preset) = camera.exposure_preset {
        let (min, max) = preset.range_us();
        if camera.exposure_time_us < min || camera.exposure_time_us > max {
            return Err(ContractError::config_validation(
                "camera.exposure_time_us",
                format!(
                    "exposure {}us outside {:?} preset range {}..={}us",
                    camera.exposure_time_us, preset, min, max
                ),
            ));
        }
    }
    Ok(())
}
