//! Container runtime driver.
//!
//! Drives a Docker-compatible CLI (`docker`, `podman`) through
//! [`tokio::process::Command`]. Environment names are derived from the worker
//! identity, so probing and stopping never need handle bookkeeping.

use super::driver::{DriverError, EnvironmentHandle, ExecutionDriver, OutputLines};
use crate::config::DriverConfig;
use crate::models::{WorkerId, WorkerRecord};
use async_trait::async_trait;
use futures::StreamExt;
use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Runtime messages that mean the environment does not exist
const MISSING_MARKERS: &[&str] = &["No such container", "no such container", "no container with name"];

#[derive(Debug, Clone)]
pub struct DockerDriver {
    config: DriverConfig,
    remove_on_stop: bool,
}

impl DockerDriver {
    pub fn new(config: DriverConfig, remove_on_stop: bool) -> Self {
        Self {
            config,
            remove_on_stop,
        }
    }

    pub fn environment_name(&self, worker_id: &WorkerId) -> String {
        format!("{}-{}", self.config.name_prefix, worker_id)
    }

    /// Arguments for `run`, excluding the runtime binary
    pub fn run_args(&self, record: &WorkerRecord) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            self.environment_name(&record.identity),
            "-e".to_string(),
            format!("WORKER_IDENTITY={}", record.identity),
            "-e".to_string(),
            format!("EGRESS_PROXY={}", record.egress_endpoint.as_uri()),
        ];
        if let Some(limit) = record.concurrency_limit {
            args.push("-e".to_string());
            args.push(format!("WORKER_CONCURRENCY={limit}"));
        }
        args.extend(self.config.extra_args.iter().cloned());
        args.push(self.config.image.clone());
        args
    }

    async fn exec(&self, worker_id: &WorkerId, args: &[String]) -> Result<Output, DriverError> {
        let mut command = Command::new(&self.config.runtime_binary);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let timeout = self.config.command_timeout();
        match tokio::time::timeout(timeout, command.output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => Err(DriverError::Unavailable(
                format!("runtime binary '{}' not found", self.config.runtime_binary),
            )),
            Ok(Err(e)) => Err(DriverError::Io(e)),
            Err(_elapsed) => Err(DriverError::Timeout {
                worker_id: worker_id.clone(),
                seconds: timeout.as_secs(),
            }),
        }
    }

    fn is_missing(output: &Output) -> bool {
        let stderr = String::from_utf8_lossy(&output.stderr);
        MISSING_MARKERS.iter().any(|marker| stderr.contains(marker))
    }

    fn failure_reason(output: &Output) -> String {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let reason = stderr.trim();
        if reason.is_empty() {
            format!("exit status {}", output.status)
        } else {
            reason.to_string()
        }
    }

    /// Remove a leftover environment with the same name, ignoring absence
    async fn remove_stale(&self, worker_id: &WorkerId) -> Result<(), DriverError> {
        let name = self.environment_name(worker_id);
        let output = self
            .exec(worker_id, &["rm".to_string(), "-f".to_string(), name])
            .await?;
        if !output.status.success() && !Self::is_missing(&output) {
            return Err(DriverError::command_failed(
                worker_id,
                Self::failure_reason(&output),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ExecutionDriver for DockerDriver {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn ping(&self) -> Result<(), DriverError> {
        let probe = WorkerId::from("<ping>");
        let output = self
            .exec(
                &probe,
                &[
                    "version".to_string(),
                    "--format".to_string(),
                    "{{.Server.Version}}".to_string(),
                ],
            )
            .await
            .map_err(|e| match e {
                DriverError::Unavailable(reason) => DriverError::Unavailable(reason),
                other => DriverError::Unavailable(other.to_string()),
            })?;

        if !output.status.success() {
            return Err(DriverError::Unavailable(Self::failure_reason(&output)));
        }
        info!(
            runtime = %self.config.runtime_binary,
            server_version = %String::from_utf8_lossy(&output.stdout).trim(),
            "Container runtime reachable"
        );
        Ok(())
    }

    async fn start(&self, record: &WorkerRecord) -> Result<EnvironmentHandle, DriverError> {
        let worker_id = &record.identity;
        self.remove_stale(worker_id).await?;

        debug!(
            %worker_id,
            egress = %record.egress_endpoint,
            image = %self.config.image,
            "Starting worker environment"
        );
        let output = self.exec(worker_id, &self.run_args(record)).await?;
        if !output.status.success() {
            return Err(DriverError::command_failed(
                worker_id,
                Self::failure_reason(&output),
            ));
        }

        let runtime_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(EnvironmentHandle {
            worker_id: worker_id.clone(),
            name: self.environment_name(worker_id),
            runtime_id: (!runtime_id.is_empty()).then_some(runtime_id),
        })
    }

    async fn is_running(&self, worker_id: &WorkerId) -> bool {
        let args = [
            "inspect".to_string(),
            "-f".to_string(),
            "{{.State.Running}}".to_string(),
            self.environment_name(worker_id),
        ];
        match self.exec(worker_id, &args).await {
            Ok(output) if output.status.success() => {
                String::from_utf8_lossy(&output.stdout).trim() == "true"
            }
            Ok(_) => false,
            Err(e) => {
                warn!(%worker_id, error = %e, "Running probe failed");
                false
            }
        }
    }

    async fn stop(&self, worker_id: &WorkerId) -> Result<(), DriverError> {
        let name = self.environment_name(worker_id);
        let output = self
            .exec(worker_id, &["stop".to_string(), name.clone()])
            .await?;
        if !output.status.success() {
            if Self::is_missing(&output) {
                debug!(%worker_id, "Environment already gone");
                return Ok(());
            }
            return Err(DriverError::command_failed(
                worker_id,
                Self::failure_reason(&output),
            ));
        }

        if self.remove_on_stop {
            self.remove_stale(worker_id).await?;
        }
        Ok(())
    }

    async fn fetch_recent_output(&self, worker_id: &WorkerId, max_lines: usize) -> OutputLines {
        let args = [
            "logs".to_string(),
            "--tail".to_string(),
            max_lines.to_string(),
            self.environment_name(worker_id),
        ];
        let lines: Vec<String> = match self.exec(worker_id, &args).await {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);
                stdout
                    .lines()
                    .chain(stderr.lines())
                    .map(str::to_string)
                    .collect()
            }
            Err(e) => {
                debug!(%worker_id, error = %e, "Output fetch failed");
                Vec::new()
            }
        };
        futures::stream::iter(lines).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EgressEndpoint;
    use std::num::NonZeroU32;

    fn driver() -> DockerDriver {
        DockerDriver::new(
            DriverConfig {
                extra_args: vec!["--memory".to_string(), "512m".to_string()],
                ..Default::default()
            },
            true,
        )
    }

    #[test]
    fn test_environment_name_uses_prefix() {
        assert_eq!(
            driver().environment_name(&WorkerId::from("42")),
            "fleet-worker-42"
        );
    }

    #[test]
    fn test_run_args_carry_identity_proxy_and_limit() {
        let record = WorkerRecord::new(
            "42",
            EgressEndpoint::parse("http://u:p@10.1.1.1:3128").unwrap(),
        )
        .with_concurrency_limit(NonZeroU32::new(3).unwrap());

        let args = driver().run_args(&record);
        assert_eq!(&args[..4], &["run", "-d", "--name", "fleet-worker-42"]);
        assert!(args.contains(&"WORKER_IDENTITY=42".to_string()));
        assert!(args.contains(&"EGRESS_PROXY=http://u:p@10.1.1.1:3128/".to_string()));
        assert!(args.contains(&"WORKER_CONCURRENCY=3".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("fleet-worker:latest"));

        let memory = args.iter().position(|a| a == "--memory").unwrap();
        assert_eq!(args[memory + 1], "512m");
    }

    #[tokio::test]
    async fn test_missing_runtime_is_unavailable() {
        let driver = DockerDriver::new(
            DriverConfig {
                runtime_binary: "definitely-not-a-container-runtime".to_string(),
                ..Default::default()
            },
            true,
        );
        assert!(matches!(
            driver.ping().await,
            Err(DriverError::Unavailable(_))
        ));
        assert!(!driver.is_running(&WorkerId::from("1")).await);
        let lines: Vec<String> = driver
            .fetch_recent_output(&WorkerId::from("1"), 5)
            .await
            .collect()
            .await;
        assert!(lines.is_empty());
    }
}
