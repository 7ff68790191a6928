//! Remote store seam of the reconciler.
//!
//! The engine only talks to the remote tree through [`RemoteGateway`];
//! [`YadiskGateway`] is the production implementation on top of
//! `yadisk_core`, tests substitute an in-memory store.

pub mod backoff;
pub mod transfer;
mod yadisk;

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;
use yadisk_core::YadiskError;

use crate::sync::model::EntryKind;
use crate::sync::paths::PathError;
use crate::sync::result::FailureKind;
use transfer::TransferError;

pub use yadisk::YadiskGateway;

/// One immediate child as reported by the remote listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteItem {
    pub name: String,
    pub path: String,
    pub kind: EntryKind,
    pub size: Option<u64>,
    /// Raw timestamp string; normalization happens in the lister so that
    /// unparsable values fall back uniformly.
    pub modified: Option<String>,
    pub md5: Option<String>,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("api error: {0}")]
    Api(#[from] YadiskError),
    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),
    #[error("path error: {0}")]
    Path(#[from] PathError),
    #[error("remote path not found: {0}")]
    NotFound(String),
    #[error("remote operation failed: {0}")]
    OperationFailed(String),
    #[error("remote store unavailable: {0}")]
    Unavailable(String),
}

impl GatewayError {
    pub fn is_not_found(&self) -> bool {
        match self {
            GatewayError::NotFound(_) => true,
            GatewayError::Api(err) => err.is_not_found(),
            _ => false,
        }
    }

    pub fn is_transient(&self) -> bool {
        match self {
            GatewayError::Api(err) => err.is_retryable(),
            GatewayError::Transfer(err) => err.is_transient(),
            GatewayError::Unavailable(_) => true,
            GatewayError::Path(_) | GatewayError::NotFound(_) | GatewayError::OperationFailed(_) => {
                false
            }
        }
    }

    pub fn failure_kind(&self) -> FailureKind {
        if self.is_not_found() {
            FailureKind::RemoteNotFound
        } else if matches!(self, GatewayError::Transfer(TransferError::Io(_))) {
            FailureKind::LocalIo
        } else if self.is_transient() {
            FailureKind::RemoteTransient
        } else {
            FailureKind::Remote
        }
    }
}

/// Operations the reconciler needs from the remote tree. None of them is
/// assumed to be transactional; every failure comes back as a typed error.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    async fn list(&self, path: &str) -> Result<Vec<RemoteItem>, GatewayError>;

    async fn upload(&self, local: &Path, remote: &str, overwrite: bool)
    -> Result<(), GatewayError>;

    /// `expected_md5`, when known, is verified before the local file is
    /// replaced.
    async fn download(
        &self,
        remote: &str,
        local: &Path,
        expected_md5: Option<&str>,
    ) -> Result<(), GatewayError>;

    async fn create_directory(&self, path: &str) -> Result<(), GatewayError>;

    async fn exists(&self, path: &str) -> Result<bool, GatewayError>;

    /// Soft, recoverable deletion.
    async fn trash(&self, path: &str) -> Result<(), GatewayError>;

    /// Only used for directories confirmed empty.
    async fn remove_permanently(&self, path: &str) -> Result<(), GatewayError>;
}
