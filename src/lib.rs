//! fcrun - bootstrap and control for Firecracker-style microVMs.
//!
//! One [`VmSupervisor`] drives one hypervisor process: render the
//! declarative [`VmConfiguration`] to disk, spawn the binary, poll the
//! control socket until the API answers, then issue typed calls through
//! the [`ControlClient`]. Teardown (kill the process, remove the socket)
//! is guaranteed on every exit path.
//!
//! Independent lifecycles share nothing; run as many concurrently as the
//! host allows.

pub mod client;
pub mod config;
pub mod error;
pub mod launcher;
pub mod readiness;
pub mod supervisor;

pub use client::{ControlClient, ControlEndpoint, DriveUpdate, InstanceInfo};
pub use config::{
    BootSource, Drive, Logger, MachineConfig, NetworkInterface, VmConfiguration, Vsock,
};
pub use error::{Error, Result};
pub use launcher::{VmCommand, VmProcess};
pub use readiness::{wait_until_ready, wait_until_ready_with, ReadinessPolicy};
pub use supervisor::{LaunchSpec, TeardownReport, VmSupervisor};

/// Crate version, surfaced by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
