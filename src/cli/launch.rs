//! Launch command implementation.

use clap::Args;
use fcrun::launcher::VmCommand;
use fcrun::supervisor::{LaunchSpec, VmSupervisor};
use fcrun::VmConfiguration;
use std::path::PathBuf;
use std::time::Duration;

/// Launch a microVM and supervise it until interrupted.
#[derive(Args, Debug)]
pub struct LaunchCmd {
    /// Path to the hypervisor binary.
    #[arg(long)]
    pub hypervisor: PathBuf,

    /// VM configuration file (JSON).
    #[arg(long)]
    pub config: PathBuf,

    /// Control socket path the hypervisor will create.
    #[arg(long)]
    pub socket: PathBuf,

    /// Readiness budget (e.g. "2s", "500ms").
    #[arg(long, default_value = "5s", value_parser = humantime::parse_duration)]
    pub ready_timeout: Duration,
}

impl LaunchCmd {
    /// Execute the launch command.
    pub fn run(self) -> fcrun::Result<()> {
        // Parse up front so a broken file fails before anything spawns.
        let configuration = VmConfiguration::from_file(&self.config)?;
        configuration.validate()?;

        let command = VmCommand::new(&self.hypervisor)
            .with_api_socket(&self.socket)
            .with_config_file(&self.config);
        let spec =
            LaunchSpec::new(command, &self.socket).with_ready_timeout(self.ready_timeout);

        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(async move {
            let supervisor = VmSupervisor::launch(spec).await?;

            match supervisor.client().machine_configuration().await {
                Ok(machine) => println!(
                    "machine config: {} vcpus, {} MiB",
                    machine.vcpu_count, machine.mem_size_mib
                ),
                Err(e) => tracing::warn!(error = %e, "machine configuration not readable"),
            }

            println!(
                "VM ready on {} (instance {}); Ctrl-C to stop",
                supervisor.endpoint(),
                supervisor.instance().id
            );
            tokio::signal::ctrl_c().await?;

            let report = supervisor.shutdown().await;
            for warning in &report.warnings {
                eprintln!("teardown warning: {}", warning);
            }
            Ok(())
        })
    }
}
