//! Small environment-variable helpers shared by every service's
//! `AppConfig::from_env`, grounded in the original system's
//! `shared-libraries/utils.py` read helpers.

use crate::error::FlowPilotError;

pub fn read_string(name: &str, default_value: Option<&str>) -> Result<String, FlowPilotError> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => default_value.map(str::to_string).ok_or_else(|| {
            FlowPilotError::invalid_argument(
                "authz.system_error",
                format!("required environment variable not set: {name}"),
            )
        }),
    }
}

pub fn read_u64(name: &str, default_value: Option<u64>) -> Result<u64, FlowPilotError> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => v.trim().parse::<u64>().map_err(|_| {
            FlowPilotError::invalid_argument(
                "authz.system_error",
                format!("invalid integer value for {name}: {v}"),
            )
        }),
        _ => default_value.ok_or_else(|| {
            FlowPilotError::invalid_argument(
                "authz.system_error",
                format!("required environment variable not set: {name}"),
            )
        }),
    }
}

pub fn read_usize(name: &str, default_value: Option<usize>) -> Result<usize, FlowPilotError> {
    read_u64(name, default_value.map(|v| v as u64)).map(|v| v as usize)
}
