// SPDX-License-Identifier: GPL-3.0-only

use std::{io, path::PathBuf};

/// Coarse classification of a failed sysfs/procfs operation, independent of
/// the underlying `std::io::ErrorKind` so drivers and the arbiter can match
/// on it without caring about OS-specific errno values.
#[derive(Copy, Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum IoErrorKind {
    #[error("permission denied")]
    PermissionDenied,
    #[error("not found")]
    NotFound,
    #[error("io failed")]
    IoFailed,
}

impl From<&io::Error> for IoErrorKind {
    fn from(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            io::ErrorKind::NotFound => Self::NotFound,
            _ => Self::IoFailed,
        }
    }
}

/// Errors surfaced by the sysfs/procfs gateway (§4.1).
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("failed to read {path:?}: {kind}")]
    Read { path: PathBuf, kind: IoErrorKind, #[source] source: io::Error },
    #[error("failed to write {path:?}: {kind}")]
    Write { path: PathBuf, kind: IoErrorKind, #[source] source: io::Error },
}

impl GatewayError {
    pub fn kind(&self) -> IoErrorKind {
        match self {
            Self::Read { kind, .. } | Self::Write { kind, .. } => *kind,
        }
    }

    pub fn path(&self) -> &PathBuf {
        match self {
            Self::Read { path, .. } | Self::Write { path, .. } => path,
        }
    }
}

/// Errors returned by a profile driver's `activate`. Carries enough context
/// for the arbiter to roll back and to report a typed bus error.
#[derive(Debug, thiserror::Error)]
#[error("driver {driver} failed to write {path:?}: {kind}")]
pub struct DriverIoFailed {
    pub driver: &'static str,
    pub path: PathBuf,
    pub kind: IoErrorKind,
    #[source]
    pub source: io::Error,
}

impl From<GatewayError> for DriverIoFailed {
    fn from(err: GatewayError) -> Self { Self::from_gateway("unknown", err) }
}

impl DriverIoFailed {
    pub fn from_gateway(driver: &'static str, err: GatewayError) -> Self {
        let kind = err.kind();
        let path = err.path().clone();
        let source = match err {
            GatewayError::Read { source, .. } | GatewayError::Write { source, .. } => source,
        };
        Self { driver, path, kind, source }
    }
}

/// Errors the arbiter can surface to a bus caller. These map 1:1 onto §7.
#[derive(Debug, thiserror::Error)]
pub enum ArbiterError {
    #[error("driver activation failed: {0}")]
    DriverIoFailed(#[from] DriverIoFailed),

    #[error("permission denied")]
    PermissionDenied,

    #[error("unknown power profile '{0}'")]
    UnknownProfile(String),

    #[error("profile '{0}' is not supported by any driver on this system")]
    UnsupportedProfile(&'static str),
}

/// Startup-only failure: the process should exit non-zero (§7 `StartupFailed`).
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("failed to acquire bus name '{0}'")]
    NameTaken(&'static str),
    #[error("failed to connect to the system bus: {0}")]
    BusConnection(#[source] anyhow::Error),
    #[error("failed to serve an object on the bus: {0}")]
    ServeFailed(#[source] anyhow::Error),
}
