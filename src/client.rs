//! Typed client for the hypervisor control API.
//!
//! Requests are HTTP/1.1 over a Unix domain socket: the socket path is
//! the virtual host and only the method, resource path, and JSON body
//! matter. All resource methods are thin wrappers over one dispatch
//! path, so framing and fault decoding live in exactly one place.
//!
//! The client is single-attempt by contract: no retries, no implicit
//! timeouts. Retry policy belongs to callers; the readiness prober
//! builds its bounded loop on top of this client, not inside it.

use crate::config::{BootSource, Drive, Logger, MachineConfig, NetworkInterface, Vsock};
use crate::error::{Error, Result};
use hyper::body::Bytes;
use hyper::{Body, Client, Method, Request, StatusCode};
use hyperlocal::{UnixClientExt, UnixConnector, Uri};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Address of a hypervisor control socket.
///
/// The socket file itself belongs to the launcher/supervisor pairing:
/// the hypervisor creates it, the supervisor removes it. The endpoint is
/// a read-only reference shared by the prober and the client.
#[derive(Debug, Clone)]
pub struct ControlEndpoint {
    socket_path: PathBuf,
}

impl ControlEndpoint {
    /// Endpoint for the given socket path.
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    /// The control socket path.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Bind a client to this endpoint.
    pub fn client(&self) -> ControlClient {
        ControlClient::new(self.clone())
    }
}

impl std::fmt::Display for ControlEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.socket_path.display())
    }
}

/// Instance description returned by `GET /`; the readiness probe uses
/// this as its lightweight health query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceInfo {
    /// Instance id.
    pub id: String,

    /// Lifecycle state as reported by the hypervisor.
    pub state: String,

    /// Hypervisor version.
    #[serde(default)]
    pub vmm_version: Option<String>,

    /// Hypervisor application name.
    #[serde(default)]
    pub app_name: Option<String>,
}

/// Patch body for re-pointing a live drive at a new backing file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveUpdate {
    /// Drive to patch.
    pub drive_id: String,

    /// New backing file on the host.
    pub path_on_host: String,
}

/// Error body shape the hypervisor uses for non-2xx responses.
#[derive(Debug, Deserialize)]
struct Fault {
    fault_message: String,
}

/// Decode a non-2xx response into an API fault. The message comes from
/// the fault body when present, otherwise from the status line.
fn decode_fault(status: StatusCode, body: &[u8]) -> Error {
    let message = serde_json::from_slice::<Fault>(body)
        .map(|fault| fault.fault_message)
        .ok()
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("unrecognized status")
                .to_string()
        });

    Error::Api {
        code: status.as_u16().to_string(),
        message,
    }
}

/// Typed client for the control API. Cheap to clone; every clone talks
/// to the same endpoint.
#[derive(Clone)]
pub struct ControlClient {
    endpoint: ControlEndpoint,
    http: Client<UnixConnector>,
}

impl std::fmt::Debug for ControlClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlClient")
            .field("socket", &self.endpoint.socket_path())
            .finish()
    }
}

impl ControlClient {
    /// Client bound to the given endpoint.
    pub fn new(endpoint: ControlEndpoint) -> Self {
        Self {
            endpoint,
            http: Client::unix(),
        }
    }

    /// The endpoint this client talks to.
    pub fn endpoint(&self) -> &ControlEndpoint {
        &self.endpoint
    }

    /// One framed request/response exchange. Transport failures (socket
    /// missing, connection refused, resets) surface as
    /// [`Error::Transport`]; status handling is left to the caller.
    async fn dispatch(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<(StatusCode, Bytes)> {
        let uri: hyper::Uri = Uri::new(self.endpoint.socket_path(), path).into();
        let builder = Request::builder().method(method.clone()).uri(uri);
        let request = match body {
            Some(bytes) => builder
                .header(hyper::header::CONTENT_TYPE, "application/json")
                .body(Body::from(bytes)),
            None => builder.body(Body::empty()),
        }
        .map_err(|e| Error::protocol(format!("build request: {}", e)))?;

        tracing::trace!(method = %method, path, "control api request");
        let response = self
            .http
            .request(request)
            .await
            .map_err(|e| Error::transport(format!("{} {}: {}", method, path, e)))?;

        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body())
            .await
            .map_err(|e| Error::transport(format!("read response body: {}", e)))?;
        tracing::trace!(method = %method, path, status = status.as_u16(), "control api response");

        Ok((status, bytes))
    }

    /// Issue a request whose success response carries no interesting
    /// body (the hypervisor answers configuration writes with 204).
    ///
    /// Public so callers can reach resources this client has no named
    /// method for; the typed methods below are thin wrappers over this.
    pub async fn send<B: Serialize>(&self, method: Method, path: &str, body: &B) -> Result<()> {
        let bytes = serde_json::to_vec(body)
            .map_err(|e| Error::protocol(format!("encode request body: {}", e)))?;
        let (status, body) = self.dispatch(method, path, Some(bytes)).await?;
        if status.is_success() {
            Ok(())
        } else {
            Err(decode_fault(status, &body))
        }
    }

    /// Issue a request and decode the 2xx JSON body into `R`.
    pub async fn fetch<R: DeserializeOwned>(&self, method: Method, path: &str) -> Result<R> {
        let (status, body) = self.dispatch(method, path, None).await?;
        if !status.is_success() {
            return Err(decode_fault(status, &body));
        }
        serde_json::from_slice(&body)
            .map_err(|e| Error::protocol(format!("decode {} response: {}", path, e)))
    }

    /// Describe the running instance.
    pub async fn instance_info(&self) -> Result<InstanceInfo> {
        self.fetch(Method::GET, "/").await
    }

    /// Read back the live machine configuration.
    pub async fn machine_configuration(&self) -> Result<MachineConfig> {
        self.fetch(Method::GET, "/machine-config").await
    }

    /// Set the machine configuration.
    pub async fn put_machine_configuration(&self, config: &MachineConfig) -> Result<()> {
        self.send(Method::PUT, "/machine-config", config).await
    }

    /// Set the boot source.
    pub async fn put_boot_source(&self, boot_source: &BootSource) -> Result<()> {
        self.send(Method::PUT, "/boot-source", boot_source).await
    }

    /// Attach or replace a drive.
    pub async fn put_drive(&self, drive: &Drive) -> Result<()> {
        self.send(Method::PUT, &format!("/drives/{}", drive.drive_id), drive)
            .await
    }

    /// Re-point a live drive at a new backing file.
    pub async fn patch_drive(&self, update: &DriveUpdate) -> Result<()> {
        self.send(
            Method::PATCH,
            &format!("/drives/{}", update.drive_id),
            update,
        )
        .await
    }

    /// Attach a network interface.
    pub async fn put_network_interface(&self, iface: &NetworkInterface) -> Result<()> {
        self.send(
            Method::PUT,
            &format!("/network-interfaces/{}", iface.iface_id),
            iface,
        )
        .await
    }

    /// Set the hypervisor log target.
    pub async fn put_logger(&self, logger: &Logger) -> Result<()> {
        self.send(Method::PUT, "/logger", logger).await
    }

    /// Attach a vsock device.
    pub async fn put_vsock(&self, vsock: &Vsock) -> Result<()> {
        self.send(Method::PUT, "/vsock", vsock).await
    }

    /// Boot the configured instance. Config-file bootstrap boots on its
    /// own; socket-driven flows call this after pushing resources.
    pub async fn start_instance(&self) -> Result<()> {
        self.send(
            Method::PUT,
            "/actions",
            &serde_json::json!({ "action_type": "InstanceStart" }),
        )
        .await
    }
}
