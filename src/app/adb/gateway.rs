use std::path::Path;
use std::time::Duration;

use tracing::debug;

use crate::app::adb::parse::{parse_adb_devices, parse_connect_output};
use crate::app::adb::runner::{run_command_with_timeout, CommandOutput};
use crate::app::adb::server::AdbServerClient;
use crate::app::config::{AdbSettings, TimeoutSettings};
use crate::app::error::AppError;
use crate::app::models::DeviceSummary;

/// Every device interaction goes through this seam.
pub trait DeviceGateway: Send + Sync {
    /// Runs a shell command over the adb server connection and returns raw stdout.
    fn shell(
        &self,
        serial: &str,
        command: &str,
        timeout: Duration,
        trace_id: &str,
    ) -> Result<Vec<u8>, AppError>;

    /// Runs the same command through a fresh `adb exec-out` process.
    fn shell_process(
        &self,
        serial: &str,
        command: &str,
        timeout: Duration,
        trace_id: &str,
    ) -> Result<Vec<u8>, AppError>;

    fn forward(
        &self,
        serial: &str,
        local_port: u16,
        remote_port: u16,
        trace_id: &str,
    ) -> Result<(), AppError>;

    fn connect(&self, address: &str, trace_id: &str) -> Result<(), AppError>;

    fn list_devices(&self, trace_id: &str) -> Result<Vec<DeviceSummary>, AppError>;

    fn shell_text(
        &self,
        serial: &str,
        command: &str,
        timeout: Duration,
        trace_id: &str,
    ) -> Result<String, AppError> {
        self.shell(serial, command, timeout, trace_id)
            .map(|bytes| String::from_utf8_lossy(&bytes).to_string())
    }
}

pub fn normalize_command_path(value: &str) -> String {
    let trimmed = value.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = trimmed
            .strip_prefix(quote)
            .and_then(|candidate| candidate.strip_suffix(quote))
        {
            return inner.trim().to_string();
        }
    }
    trimmed.to_string()
}

pub fn resolve_adb_program(config_command_path: &str) -> Result<String, String> {
    let normalized = normalize_command_path(config_command_path);
    if normalized.is_empty() || normalized == "adb" {
        return Ok("adb".to_string());
    }
    let path = Path::new(&normalized);
    if path.is_dir() {
        return Err("ADB path must point to an executable file".to_string());
    }
    if !path.exists() {
        return Err("ADB executable not found at the configured path".to_string());
    }
    Ok(normalized)
}

pub struct AdbGateway {
    program: String,
    server: AdbServerClient,
    timeouts: TimeoutSettings,
}

impl AdbGateway {
    pub fn new(program: impl Into<String>, server: AdbServerClient, timeouts: TimeoutSettings) -> Self {
        Self {
            program: program.into(),
            server,
            timeouts,
        }
    }

    pub fn from_settings(
        adb: &AdbSettings,
        timeouts: &TimeoutSettings,
        trace_id: &str,
    ) -> Result<Self, AppError> {
        let program = resolve_adb_program(&adb.command_path)
            .map_err(|message| AppError::validation(message, trace_id))?;
        Ok(Self::new(
            program,
            AdbServerClient::new(adb.server_host.clone(), adb.server_port),
            timeouts.clone(),
        ))
    }

    fn run(
        &self,
        args: Vec<String>,
        timeout: Duration,
        trace_id: &str,
    ) -> Result<CommandOutput, AppError> {
        debug!(trace_id = %trace_id, args = ?args, "adb process");
        run_command_with_timeout(&self.program, &args, timeout, trace_id)
    }
}

impl DeviceGateway for AdbGateway {
    fn shell(
        &self,
        serial: &str,
        command: &str,
        timeout: Duration,
        trace_id: &str,
    ) -> Result<Vec<u8>, AppError> {
        debug!(trace_id = %trace_id, serial = %serial, command = %command, "adb server exec");
        self.server
            .exec(serial, command, timeout)
            .map_err(|message| AppError::dependency(message, trace_id))
    }

    fn shell_process(
        &self,
        serial: &str,
        command: &str,
        timeout: Duration,
        trace_id: &str,
    ) -> Result<Vec<u8>, AppError> {
        let args = vec![
            "-s".to_string(),
            serial.to_string(),
            "exec-out".to_string(),
            command.to_string(),
        ];
        let output = self.run(args, timeout, trace_id)?;
        if !output.succeeded() {
            let stderr = output.stderr.trim();
            return Err(AppError::dependency(
                format!(
                    "adb exec-out `{command}` failed: {}",
                    if stderr.is_empty() { "unknown error" } else { stderr }
                ),
                trace_id,
            ));
        }
        Ok(output.stdout)
    }

    fn forward(
        &self,
        serial: &str,
        local_port: u16,
        remote_port: u16,
        trace_id: &str,
    ) -> Result<(), AppError> {
        let args = vec![
            "-s".to_string(),
            serial.to_string(),
            "forward".to_string(),
            format!("tcp:{local_port}"),
            format!("tcp:{remote_port}"),
        ];
        let output = self.run(args, self.timeouts.probe(), trace_id)?;
        if !output.succeeded() {
            return Err(AppError::dependency(
                format!("adb forward failed: {}", output.stderr.trim()),
                trace_id,
            ));
        }
        Ok(())
    }

    fn connect(&self, address: &str, trace_id: &str) -> Result<(), AppError> {
        let args = vec!["connect".to_string(), address.to_string()];
        let output = self.run(args, self.timeouts.connect(), trace_id)?;
        let combined = format!("{}\n{}", output.stdout_text(), output.stderr);
        parse_connect_output(&combined).map_err(|message| {
            AppError::dependency(format!("adb connect {address} failed: {message}"), trace_id)
        })
    }

    fn list_devices(&self, trace_id: &str) -> Result<Vec<DeviceSummary>, AppError> {
        let args = vec!["devices".to_string(), "-l".to_string()];
        let output = self.run(args, self.timeouts.shell(), trace_id)?;
        if !output.succeeded() {
            return Err(AppError::dependency(
                format!("adb devices failed: {}", output.stderr.trim()),
                trace_id,
            ));
        }
        Ok(parse_adb_devices(&output.stdout_text()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_wrapping_quotes() {
        assert_eq!(
            normalize_command_path("  \"/opt/android/platform-tools/adb\"  "),
            "/opt/android/platform-tools/adb"
        );
        assert_eq!(
            normalize_command_path("'/opt/android/platform-tools/adb'"),
            "/opt/android/platform-tools/adb"
        );
    }

    #[test]
    fn empty_path_resolves_to_adb_on_path() {
        assert_eq!(resolve_adb_program("").as_deref(), Ok("adb"));
        assert_eq!(resolve_adb_program("   ").as_deref(), Ok("adb"));
    }

    #[test]
    fn rejects_missing_executable() {
        let err = resolve_adb_program("/this/path/should/not/exist/adb").unwrap_err();
        assert!(err.to_lowercase().contains("not found"));
    }

    #[test]
    fn from_settings_maps_bad_path_to_validation_error() {
        let settings = AdbSettings {
            command_path: "/this/path/should/not/exist/adb".to_string(),
            ..AdbSettings::default()
        };
        let err = AdbGateway::from_settings(&settings, &TimeoutSettings::default(), "trace-adb")
            .err()
            .expect("should reject");
        assert_eq!(err.code, "ERR_VALIDATION");
    }
}
