use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use yadisk_core::{DiskInfo, OperationStatus, Resource, ResourceType, YadiskClient, YadiskError};

use super::backoff::{Backoff, RetryPolicy};
use super::transfer::TransferClient;
use super::{GatewayError, RemoteGateway, RemoteItem};
use crate::sync::model::EntryKind;
use crate::sync::paths::normalize_remote;

const LIST_PAGE_SIZE: u32 = 100;
const OPERATION_POLL_ATTEMPTS: u32 = 10;

/// [`RemoteGateway`] backed by the Yandex Disk REST API.
#[derive(Clone)]
pub struct YadiskGateway {
    client: YadiskClient,
    transfer: TransferClient,
    retry: RetryPolicy,
    poll: Backoff,
}

impl YadiskGateway {
    pub fn new(client: YadiskClient, transfer: TransferClient) -> Self {
        Self {
            client,
            transfer,
            retry: RetryPolicy::new(
                3,
                Backoff::new(Duration::from_millis(500), Duration::from_secs(8), true),
            ),
            poll: Backoff::new(Duration::from_millis(250), Duration::from_secs(10), true),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_poll_backoff(mut self, poll: Backoff) -> Self {
        self.poll = poll;
        self
    }

    /// Verifies the token works before a pass starts.
    pub async fn check_connection(&self) -> Result<DiskInfo, GatewayError> {
        let info = self.client.get_disk_info().await?;
        tracing::info!(
            total_gb = info.total_space as f64 / 1024f64.powi(3),
            used_gb = info.used_space as f64 / 1024f64.powi(3),
            "connected to Yandex Disk"
        );
        Ok(info)
    }

    async fn delete(&self, path: &str, permanently: bool) -> Result<(), GatewayError> {
        let client = &self.client;
        let api_path = normalize_remote(path);
        let api_path = api_path.as_str();
        let link = self
            .retry
            .run("delete", GatewayError::is_transient, move || async move {
                Ok::<_, GatewayError>(client.delete_resource(api_path, permanently).await?)
            })
            .await?;
        if let Some(link) = link {
            self.wait_for_operation(link.href.as_str(), api_path).await?;
        }
        Ok(())
    }

    async fn wait_for_operation(&self, operation_url: &str, path: &str) -> Result<(), GatewayError> {
        for attempt in 0..OPERATION_POLL_ATTEMPTS {
            match self.client.get_operation_status(operation_url).await? {
                OperationStatus::Success => return Ok(()),
                OperationStatus::Failure => {
                    return Err(GatewayError::OperationFailed(path.to_string()));
                }
                OperationStatus::InProgress => {
                    tokio::time::sleep(self.poll.delay(attempt)).await;
                }
            }
        }
        Err(GatewayError::Unavailable(format!(
            "operation on {path} still in progress"
        )))
    }
}

#[async_trait]
impl RemoteGateway for YadiskGateway {
    async fn list(&self, path: &str) -> Result<Vec<RemoteItem>, GatewayError> {
        let client = &self.client;
        let api_path = normalize_remote(path);
        let api_path = api_path.as_str();
        let resources = self
            .retry
            .run("list", GatewayError::is_transient, move || async move {
                Ok::<_, GatewayError>(
                    client
                        .list_directory_all(api_path, LIST_PAGE_SIZE, None)
                        .await?,
                )
            })
            .await?;
        Ok(resources.into_iter().map(remote_item).collect())
    }

    async fn upload(
        &self,
        local: &Path,
        remote: &str,
        overwrite: bool,
    ) -> Result<(), GatewayError> {
        let client = &self.client;
        let transfer = &self.transfer;
        let api_path = normalize_remote(remote);
        let api_path = api_path.as_str();
        self.retry
            .run("upload", GatewayError::is_transient, move || async move {
                let link = client.get_upload_link(api_path, overwrite).await?;
                transfer.upload_from_path(link.href.as_str(), local).await?;
                Ok::<_, GatewayError>(())
            })
            .await
    }

    async fn download(
        &self,
        remote: &str,
        local: &Path,
        expected_md5: Option<&str>,
    ) -> Result<(), GatewayError> {
        let client = &self.client;
        let transfer = &self.transfer;
        let api_path = normalize_remote(remote);
        let api_path = api_path.as_str();
        self.retry
            .run("download", GatewayError::is_transient, move || async move {
                let link = client.get_download_link(api_path).await?;
                transfer
                    .download_to_path(link.href.as_str(), local, expected_md5)
                    .await?;
                Ok::<_, GatewayError>(())
            })
            .await
    }

    async fn create_directory(&self, path: &str) -> Result<(), GatewayError> {
        let api_path = normalize_remote(path);
        match self.client.create_folder(&api_path).await {
            Ok(_) => Ok(()),
            // 409: something already sits at the path
            Err(YadiskError::Api { status, .. }) if status == StatusCode::CONFLICT => {
                if self.client.path_exists(&api_path).await? {
                    Ok(())
                } else {
                    Err(GatewayError::OperationFailed(api_path))
                }
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn exists(&self, path: &str) -> Result<bool, GatewayError> {
        let client = &self.client;
        let api_path = normalize_remote(path);
        let api_path = api_path.as_str();
        self.retry
            .run("exists", GatewayError::is_transient, move || async move {
                Ok::<_, GatewayError>(client.path_exists(api_path).await?)
            })
            .await
    }

    async fn trash(&self, path: &str) -> Result<(), GatewayError> {
        self.delete(path, false).await
    }

    async fn remove_permanently(&self, path: &str) -> Result<(), GatewayError> {
        self.delete(path, true).await
    }
}

fn remote_item(resource: Resource) -> RemoteItem {
    RemoteItem {
        path: normalize_remote(&resource.path),
        name: resource.name,
        kind: match resource.resource_type {
            ResourceType::File => EntryKind::File,
            ResourceType::Dir => EntryKind::Dir,
        },
        size: resource.size,
        modified: resource.modified,
        md5: resource.md5,
    }
}

#[cfg(test)]
#[path = "yadisk_tests.rs"]
mod tests;
