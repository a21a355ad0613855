//! Full VM lifecycle supervision.
//!
//! The supervisor composes the other modules in strict order: render the
//! configuration, spawn the hypervisor, probe the control socket, hand
//! out a ready client, and tear everything down on every exit path.
//! Each lifecycle owns its process, socket path, and client exclusively,
//! so independent VMs need no synchronization between them.

use crate::client::{ControlClient, ControlEndpoint, InstanceInfo};
use crate::config::VmConfiguration;
use crate::error::Result;
use crate::launcher::{VmCommand, VmProcess};
use crate::readiness::{self, ReadinessPolicy};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(5);

/// How long teardown waits for the killed process to be reaped.
const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// Everything needed to bring up one microVM.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    command: VmCommand,
    socket_path: PathBuf,
    configuration: Option<(VmConfiguration, PathBuf)>,
    ready_timeout: Duration,
    policy: ReadinessPolicy,
}

impl LaunchSpec {
    /// Spec for a prebuilt command and the control socket path the
    /// hypervisor will create.
    pub fn new(command: VmCommand, socket_path: impl Into<PathBuf>) -> Self {
        Self {
            command,
            socket_path: socket_path.into(),
            configuration: None,
            ready_timeout: DEFAULT_READY_TIMEOUT,
            policy: ReadinessPolicy::default(),
        }
    }

    /// Render `configuration` to `config_path` before spawning. Leave
    /// unset for socket-driven flows where resources are pushed through
    /// the client after readiness.
    pub fn with_configuration(
        mut self,
        configuration: VmConfiguration,
        config_path: impl Into<PathBuf>,
    ) -> Self {
        self.configuration = Some((configuration, config_path.into()));
        self
    }

    /// Total readiness budget (default 5s).
    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    /// Probe tuning.
    pub fn with_readiness_policy(mut self, policy: ReadinessPolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// Outcome of tearing one VM down. Warnings are advisory: they never
/// mask the result of the calls that preceded teardown, and the process
/// is reclaimed either way through the kill-on-drop backstop.
#[derive(Debug, Default)]
pub struct TeardownReport {
    /// Problems encountered while releasing resources.
    pub warnings: Vec<String>,
}

impl TeardownReport {
    /// True when every teardown step completed without complaint.
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Supervises one hypervisor process and its control channel.
///
/// The supervisor is the only component that terminates the process.
/// Dropping it without calling [`VmSupervisor::shutdown`] still reclaims
/// the process and removes the socket file, but cannot report what it
/// had to do; call `shutdown` to get the [`TeardownReport`].
#[derive(Debug)]
pub struct VmSupervisor {
    process: VmProcess,
    endpoint: ControlEndpoint,
    client: ControlClient,
    instance: InstanceInfo,
    torn_down: bool,
}

impl VmSupervisor {
    /// Render, spawn, and probe. On probe failure the process is torn
    /// down before the error is returned; teardown never masks it.
    pub async fn launch(spec: LaunchSpec) -> Result<Self> {
        if let Some((configuration, config_path)) = &spec.configuration {
            configuration.validate()?;
            configuration.write_to(config_path)?;
        }

        let endpoint = ControlEndpoint::new(&spec.socket_path);
        let mut process = spec.command.spawn()?;
        let client = endpoint.client();

        tracing::info!(
            socket = %endpoint,
            pid = process.pid(),
            budget = ?spec.ready_timeout,
            "waiting for control api"
        );
        match readiness::wait_until_ready_with(&client, spec.ready_timeout, &spec.policy).await {
            Ok(instance) => {
                tracing::info!(socket = %endpoint, instance = %instance.id, "hypervisor ready");
                Ok(Self {
                    process,
                    endpoint,
                    client,
                    instance,
                    torn_down: false,
                })
            }
            Err(err) => {
                tracing::warn!(error = %err, "hypervisor never became ready, tearing down");
                let report = teardown(&mut process, endpoint.socket_path()).await;
                log_warnings(&report);
                Err(err)
            }
        }
    }

    /// Client for business calls against the ready control API.
    pub fn client(&self) -> &ControlClient {
        &self.client
    }

    /// The control endpoint.
    pub fn endpoint(&self) -> &ControlEndpoint {
        &self.endpoint
    }

    /// Instance description captured by the successful probe.
    pub fn instance(&self) -> &InstanceInfo {
        &self.instance
    }

    /// Hypervisor process id.
    pub fn pid(&self) -> Option<u32> {
        self.process.pid()
    }

    /// Terminate the hypervisor and remove the socket file.
    ///
    /// Termination is best-effort forceful with a bounded wait; teardown
    /// problems come back as warnings, not errors.
    pub async fn shutdown(mut self) -> TeardownReport {
        self.torn_down = true;
        let report = teardown(&mut self.process, self.endpoint.socket_path()).await;
        log_warnings(&report);
        report
    }
}

impl Drop for VmSupervisor {
    fn drop(&mut self) {
        if self.torn_down {
            return;
        }
        // kill_on_drop reclaims the process; the socket file still needs
        // removing by hand.
        let _ = std::fs::remove_file(self.endpoint.socket_path());
        tracing::debug!(socket = %self.endpoint, "supervisor dropped without shutdown");
    }
}

async fn teardown(process: &mut VmProcess, socket_path: &Path) -> TeardownReport {
    let mut warnings = Vec::new();

    if let Err(err) = process.terminate(TERMINATE_GRACE).await {
        warnings.push(format!("terminate hypervisor: {}", err));
    }

    if let Err(err) = std::fs::remove_file(socket_path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            warnings.push(format!(
                "remove socket {}: {}",
                socket_path.display(),
                err
            ));
        }
    }

    TeardownReport { warnings }
}

fn log_warnings(report: &TeardownReport) {
    for warning in &report.warnings {
        tracing::warn!(%warning, "teardown issue");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_spec_defaults() {
        let spec = LaunchSpec::new(VmCommand::new("/usr/bin/firecracker"), "/run/fc.sock");
        assert_eq!(spec.ready_timeout, DEFAULT_READY_TIMEOUT);
        assert!(spec.configuration.is_none());
    }

    #[test]
    fn test_empty_teardown_report_is_clean() {
        assert!(TeardownReport::default().is_clean());
    }
}
