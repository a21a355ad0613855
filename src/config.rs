//! Declarative VM configuration and its on-disk rendering.
//!
//! A [`VmConfiguration`] is built once by the caller, validated, rendered
//! to JSON, and handed to the hypervisor through its `--config-file`
//! argument. Top-level keys are kebab-case and optional sections are
//! omitted entirely when unset; the hypervisor rejects explicit nulls.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Kernel image and boot arguments for the microVM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootSource {
    /// Host path to the uncompressed kernel image.
    pub kernel_image_path: String,

    /// Kernel command line.
    pub boot_args: String,
}

/// Block device attached to the microVM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Drive {
    /// Identifier, unique within the drive list.
    pub drive_id: String,

    /// Host path of the backing file.
    pub path_on_host: String,

    /// Whether the guest boots from this drive.
    pub is_root_device: bool,

    /// Whether the guest sees the drive read-only.
    pub is_read_only: bool,
}

/// Target for the hypervisor's own log output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Logger {
    /// Host path the hypervisor logs to.
    pub log_path: String,

    /// Log level name understood by the hypervisor (e.g. "Info").
    pub level: String,

    /// Include the level in each line.
    pub show_level: bool,

    /// Include the file/line origin in each line.
    pub show_log_origin: bool,
}

/// Virtio network interface backed by a host tap device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInterface {
    /// Identifier, unique within the interface list.
    pub iface_id: String,

    /// Host tap device name.
    pub host_dev_name: String,

    /// Fixed guest MAC address; the hypervisor picks one when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guest_mac: Option<String>,
}

/// Virtio vsock device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vsock {
    /// Identifier for the device.
    pub vsock_id: String,

    /// Guest-side context id.
    pub guest_cid: u32,

    /// Host Unix socket backing the vsock connection.
    pub uds_path: String,
}

/// Machine sizing. Also the typed response of `GET /machine-config`;
/// values are integers on the wire, MiB in and MiB out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineConfig {
    /// Number of vCPUs.
    pub vcpu_count: u64,

    /// Hyperthreading exposed to the guest.
    pub ht_enabled: bool,

    /// Memory size in MiB.
    pub mem_size_mib: u64,
}

/// Declarative configuration document the hypervisor reads at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmConfiguration {
    /// Kernel and boot arguments.
    #[serde(rename = "boot-source")]
    pub boot_source: BootSource,

    /// Ordered block devices.
    pub drives: Vec<Drive>,

    /// Hypervisor log target.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logger: Option<Logger>,

    /// Ordered network interfaces.
    #[serde(
        rename = "network-interfaces",
        skip_serializing_if = "Option::is_none"
    )]
    pub network_interfaces: Option<Vec<NetworkInterface>>,

    /// vsock device.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vsock: Option<Vsock>,

    /// Machine sizing.
    #[serde(rename = "machine-config", skip_serializing_if = "Option::is_none")]
    pub machine_config: Option<MachineConfig>,
}

impl VmConfiguration {
    /// Start a configuration with the required boot source. Drives are
    /// added with [`VmConfiguration::with_drive`].
    pub fn new(boot_source: BootSource) -> Self {
        Self {
            boot_source,
            drives: Vec::new(),
            logger: None,
            network_interfaces: None,
            vsock: None,
            machine_config: None,
        }
    }

    /// Append a drive.
    pub fn with_drive(mut self, drive: Drive) -> Self {
        self.drives.push(drive);
        self
    }

    /// Set the hypervisor log target.
    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Append a network interface.
    pub fn with_network_interface(mut self, iface: NetworkInterface) -> Self {
        self.network_interfaces
            .get_or_insert_with(Vec::new)
            .push(iface);
        self
    }

    /// Set the vsock device.
    pub fn with_vsock(mut self, vsock: Vsock) -> Self {
        self.vsock = Some(vsock);
        self
    }

    /// Set the machine sizing.
    pub fn with_machine_config(mut self, machine_config: MachineConfig) -> Self {
        self.machine_config = Some(machine_config);
        self
    }

    /// Check the invariants the hypervisor will enforce anyway, before a
    /// process gets spawned: at least one drive, unique drive ids, at
    /// most one root device.
    pub fn validate(&self) -> Result<()> {
        if self.drives.is_empty() {
            return Err(Error::invalid_config("at least one drive is required"));
        }

        let mut seen = HashSet::new();
        let mut root: Option<&str> = None;
        for drive in &self.drives {
            if !seen.insert(drive.drive_id.as_str()) {
                return Err(Error::invalid_config(format!(
                    "duplicate drive id {:?}",
                    drive.drive_id
                )));
            }
            if drive.is_root_device {
                if let Some(first) = root {
                    return Err(Error::invalid_config(format!(
                        "drives {:?} and {:?} both claim the root device",
                        first, drive.drive_id
                    )));
                }
                root = Some(drive.drive_id.as_str());
            }
        }

        Ok(())
    }

    /// Render the document to JSON bytes.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| Error::invalid_config(format!("serialize configuration: {}", e)))
    }

    /// Render the document and write it to `path`.
    ///
    /// There is no partial-write recovery; on failure the caller decides
    /// whether to retry with a fresh path.
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.to_json()?;
        std::fs::write(path, bytes)?;
        tracing::debug!(path = %path.display(), "rendered vm configuration");
        Ok(())
    }

    /// Load a configuration document from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        serde_json::from_slice(&bytes)
            .map_err(|e| Error::invalid_config(format!("{}: {}", path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> VmConfiguration {
        VmConfiguration::new(BootSource {
            kernel_image_path: "/images/vmlinux".to_string(),
            boot_args: "console=ttyS0 reboot=k panic=1 pci=off".to_string(),
        })
        .with_drive(Drive {
            drive_id: "rootfs".to_string(),
            path_on_host: "/images/root.img".to_string(),
            is_root_device: true,
            is_read_only: false,
        })
    }

    fn full() -> VmConfiguration {
        minimal()
            .with_drive(Drive {
                drive_id: "data".to_string(),
                path_on_host: "/images/data.img".to_string(),
                is_root_device: false,
                is_read_only: true,
            })
            .with_logger(Logger {
                log_path: "/tmp/fc.log".to_string(),
                level: "Info".to_string(),
                show_level: true,
                show_log_origin: false,
            })
            .with_network_interface(NetworkInterface {
                iface_id: "eth0".to_string(),
                host_dev_name: "fc-tap0".to_string(),
                guest_mac: None,
            })
            .with_vsock(Vsock {
                vsock_id: "vsock0".to_string(),
                guest_cid: 3,
                uds_path: "/tmp/fc-vsock.sock".to_string(),
            })
            .with_machine_config(MachineConfig {
                vcpu_count: 2,
                ht_enabled: false,
                mem_size_mib: 1024,
            })
    }

    #[test]
    fn test_top_level_keys_are_kebab_case() {
        let value: serde_json::Value = serde_json::from_slice(&full().to_json().unwrap()).unwrap();
        let object = value.as_object().unwrap();
        for key in [
            "boot-source",
            "drives",
            "logger",
            "network-interfaces",
            "vsock",
            "machine-config",
        ] {
            assert!(object.contains_key(key), "missing top-level key {:?}", key);
        }
    }

    #[test]
    fn test_optional_sections_omitted_when_unset() {
        let value: serde_json::Value =
            serde_json::from_slice(&minimal().to_json().unwrap()).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(
            object.keys().collect::<Vec<_>>(),
            ["boot-source", "drives"],
            "unset sections must not appear, not even as null"
        );
    }

    #[test]
    fn test_presence_pattern_round_trips() {
        for config in [minimal(), full()] {
            let bytes = config.to_json().unwrap();
            let parsed: VmConfiguration = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(parsed, config);
        }
    }

    #[test]
    fn test_nested_fields_are_snake_case() {
        let value: serde_json::Value = serde_json::from_slice(&full().to_json().unwrap()).unwrap();
        assert!(value["boot-source"].get("kernel_image_path").is_some());
        assert!(value["drives"][0].get("is_root_device").is_some());
        assert!(value["machine-config"].get("mem_size_mib").is_some());
    }

    #[test]
    fn test_validate_accepts_two_drives_one_root() {
        assert!(full().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_duplicate_drive_ids() {
        let config = minimal().with_drive(Drive {
            drive_id: "rootfs".to_string(),
            path_on_host: "/images/other.img".to_string(),
            is_root_device: false,
            is_read_only: false,
        });
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate drive id"));
    }

    #[test]
    fn test_validate_rejects_two_root_devices() {
        let config = minimal().with_drive(Drive {
            drive_id: "second-root".to_string(),
            path_on_host: "/images/other.img".to_string(),
            is_root_device: true,
            is_read_only: false,
        });
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("root device"));
    }

    #[test]
    fn test_validate_rejects_empty_drive_list() {
        let config = VmConfiguration::new(BootSource {
            kernel_image_path: "/images/vmlinux".to_string(),
            boot_args: String::new(),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_write_to_renders_parseable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vm-config.json");
        full().write_to(&path).unwrap();
        let reloaded = VmConfiguration::from_file(&path).unwrap();
        assert_eq!(reloaded, full());
    }

    #[test]
    fn test_write_to_missing_directory_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("vm-config.json");
        let err = minimal().write_to(&path).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
