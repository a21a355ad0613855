//! Hypervisor process launching.
//!
//! [`VmCommand`] assembles the hypervisor command line; [`VmProcess`] is
//! the exclusive owner of the spawned OS process. Launching does not wait
//! for the control API; readiness is a separate concern (see
//! [`crate::readiness`]).

use crate::error::{Error, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::{Child, Command};

/// Builder for the hypervisor command line.
#[derive(Debug, Clone)]
pub struct VmCommand {
    program: PathBuf,
    api_socket: Option<PathBuf>,
    config_file: Option<PathBuf>,
    extra_args: Vec<OsString>,
}

impl VmCommand {
    /// Start a command for the given hypervisor executable.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            api_socket: None,
            config_file: None,
            extra_args: Vec::new(),
        }
    }

    /// Pass `--api-sock <path>`; the hypervisor creates the socket file
    /// at this path once its control API is up.
    pub fn with_api_socket(mut self, path: impl Into<PathBuf>) -> Self {
        self.api_socket = Some(path.into());
        self
    }

    /// Pass `--config-file <path>` pointing at a rendered
    /// [`crate::config::VmConfiguration`].
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Append one raw argument.
    pub fn with_arg(mut self, arg: impl Into<OsString>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    /// Append raw arguments.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// The hypervisor executable path.
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// The assembled argument list, in the order it is passed to exec.
    pub fn command_line(&self) -> Vec<OsString> {
        let mut args = Vec::new();
        if let Some(socket) = &self.api_socket {
            args.push(OsString::from("--api-sock"));
            args.push(socket.as_os_str().to_os_string());
        }
        if let Some(config) = &self.config_file {
            args.push(OsString::from("--config-file"));
            args.push(config.as_os_str().to_os_string());
        }
        args.extend(self.extra_args.iter().cloned());
        args
    }

    /// Spawn the hypervisor.
    ///
    /// The child is spawned with `kill_on_drop`, so the OS process cannot
    /// outlive its [`VmProcess`] handle.
    pub fn spawn(&self) -> Result<VmProcess> {
        let args = self.command_line();
        tracing::debug!(
            program = %self.program.display(),
            args = ?args,
            "spawning hypervisor"
        );

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::launch(format!("{}: {}", self.program.display(), e)))?;

        let pid = child.id();
        tracing::info!(program = %self.program.display(), pid, "hypervisor process started");
        Ok(VmProcess { child, pid })
    }
}

/// Exclusive owner of a spawned hypervisor process.
///
/// Termination is reserved for the lifecycle supervisor; everyone else
/// only observes the process.
#[derive(Debug)]
pub struct VmProcess {
    child: Child,
    pid: Option<u32>,
}

impl VmProcess {
    /// OS process id, captured at spawn time.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Check for process exit without blocking.
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        self.child.try_wait().map_err(Error::from)
    }

    /// Wait for the process to exit.
    pub async fn wait(&mut self) -> Result<ExitStatus> {
        self.child.wait().await.map_err(Error::from)
    }

    /// Forcefully terminate the process and reap it, waiting at most
    /// `grace` for the exit status. Best effort: an already-dead process
    /// is not an error.
    pub(crate) async fn terminate(&mut self, grace: Duration) -> Result<()> {
        if let Some(status) = self.child.try_wait()? {
            tracing::debug!(pid = self.pid, %status, "hypervisor already exited");
            return Ok(());
        }

        self.child.start_kill()?;
        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(pid = self.pid, %status, "hypervisor terminated");
                Ok(())
            }
            Ok(Err(e)) => Err(Error::from(e)),
            Err(_) => Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("hypervisor did not exit within {:?} of kill", grace),
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_orders_socket_then_config_then_extras() {
        let command = VmCommand::new("/usr/bin/firecracker")
            .with_api_socket("/run/fc.sock")
            .with_config_file("/run/vm-config.json")
            .with_args(["--level", "Debug"]);

        let args: Vec<String> = command
            .command_line()
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            [
                "--api-sock",
                "/run/fc.sock",
                "--config-file",
                "/run/vm-config.json",
                "--level",
                "Debug",
            ]
        );
    }

    #[test]
    fn test_command_line_omits_unset_flags() {
        let command = VmCommand::new("/usr/bin/firecracker");
        assert!(command.command_line().is_empty());
    }

    #[tokio::test]
    async fn test_spawn_missing_executable_is_launch_error() {
        let err = VmCommand::new("/nonexistent/hypervisor")
            .spawn()
            .unwrap_err();
        match err {
            Error::Launch { message } => assert!(message.contains("/nonexistent/hypervisor")),
            other => panic!("expected Launch error, got {:?}", other),
        }
    }
}
