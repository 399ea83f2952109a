//! Shell tools defined by `(name, command, description)` configuration tuples.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::tool::{Tool, ToolRegistry};

/// Hard ceiling for shell tool subprocesses.
pub const DEFAULT_SHELL_TIMEOUT: Duration = Duration::from_secs(120);

/// One configured shell tool, as it appears in a tools config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub description: String,
}

/// A tool backed by a shell command template.
///
/// `{param}` placeholders in the command are substituted from the invocation
/// arguments before execution.
pub struct ShellTool {
    name: String,
    command: String,
    description: String,
    timeout: Duration,
}

impl ShellTool {
    pub fn from_config(config: &ToolConfig) -> Self {
        let description = if config.description.is_empty() {
            format!("Run: {}", config.command)
        } else {
            config.description.clone()
        };
        Self {
            name: config.name.clone(),
            command: config.command.clone(),
            description,
            timeout: DEFAULT_SHELL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn substituted_command(&self, args: &HashMap<String, String>) -> String {
        let mut cmd = self.command.clone();
        for (key, value) in args {
            cmd = cmd.replace(&format!("{{{key}}}"), value);
        }
        cmd
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn invoke(
        &self,
        args: &HashMap<String, String>,
    ) -> conductor_types::Result<serde_json::Value> {
        let cmd = self.substituted_command(args);
        tracing::info!(tool = %self.name, command = %cmd, "Executing shell tool");

        let mut process = tokio::process::Command::new("sh");
        process.arg("-c").arg(&cmd);
        process.stdout(std::process::Stdio::piped());
        process.stderr(std::process::Stdio::piped());

        let child = process
            .spawn()
            .map_err(|e| conductor_types::ConductorError::Tool {
                tool: self.name.clone(),
                message: format!("failed to spawn command: {e}"),
            })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| conductor_types::ConductorError::Tool {
                tool: self.name.clone(),
                message: format!("command execution failed: {e}"),
            })?,
            Err(_) => {
                // The agent sees the timeout as tool output, not a hard error,
                // so the conversation can continue.
                return Ok(serde_json::Value::String(format!(
                    "Error: command '{}' timed out after {}s",
                    self.name,
                    self.timeout.as_secs()
                )));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let exit_code = output.status.code().unwrap_or(-1);

        tracing::info!(
            tool = %self.name,
            exit_code,
            stdout_len = stdout.len(),
            stderr_len = stderr.len(),
            "Shell tool completed"
        );

        let mut result = stdout;
        if !output.status.success() {
            if !stderr.is_empty() {
                result.push_str(&format!("\nSTDERR: {stderr}"));
            }
            result.push_str(&format!("\nExit code: {exit_code}"));
        }
        Ok(serde_json::Value::String(result))
    }
}

/// Build a [`ShellTool`] for each config entry and register it.
pub fn load_shell_tools(configs: &[ToolConfig], registry: &mut ToolRegistry) {
    for config in configs {
        registry.register(ShellTool::from_config(config));
    }
}
