//! Check command implementation.

use clap::Args;
use fcrun::VmConfiguration;
use std::path::PathBuf;

/// Validate a VM configuration file.
#[derive(Args, Debug)]
pub struct CheckCmd {
    /// VM configuration file (JSON).
    pub config: PathBuf,
}

impl CheckCmd {
    /// Execute the check command.
    pub fn run(self) -> fcrun::Result<()> {
        let configuration = VmConfiguration::from_file(&self.config)?;
        configuration.validate()?;

        println!(
            "{}: ok ({} drive(s), machine-config {})",
            self.config.display(),
            configuration.drives.len(),
            if configuration.machine_config.is_some() {
                "present"
            } else {
                "absent"
            }
        );
        Ok(())
    }
}
