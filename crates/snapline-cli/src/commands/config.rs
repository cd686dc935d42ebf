use serde_json::Value;
use snapline_core::SnaplineConfig;

use crate::error::CliError;

pub fn run(config: &SnaplineConfig) -> Result<Value, CliError> {
    Ok(serde_json::to_value(config)?)
}
