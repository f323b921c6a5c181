// crates/runner-config/tests/common/mod.rs
// ============================================================================
// Module: Config Test Helpers
// Description: Shared assertions and fixtures for config tests.
// ============================================================================

#![allow(dead_code, reason = "Each test binary uses a subset of the helpers.")]

use runner_config::ConfigError;
use runner_config::RunnerConfig;

pub type TestResult = Result<(), String>;

/// Smallest config that validates with trust enforcement on.
pub fn minimal_config() -> String {
    "[trust]\nallow_list_path = \"keys.json\"\n".to_string()
}

/// Parses `extra` appended to the minimal config.
pub fn parse_with(extra: &str) -> Result<RunnerConfig, ConfigError> {
    RunnerConfig::from_toml_str(&format!("{}{extra}", minimal_config()))
}

pub fn assert_invalid(result: Result<RunnerConfig, ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(_) => Err("expected invalid config".to_string()),
    }
}
