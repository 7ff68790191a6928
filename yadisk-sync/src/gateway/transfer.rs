use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use futures_util::StreamExt;
use md5::Context;
use reqwest::Client;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tokio_util::io::ReaderStream;
use url::Url;

use crate::config::read_usize_env;

/// Suffix of in-flight downloads. Together with the leading dot and the
/// random tag it forms a name the listers reserve; see [`is_partial_name`].
pub const PARTIAL_SUFFIX: &str = ".yadisk-partial";

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("concurrency limiter is closed")]
    ConcurrencyClosed,
    #[error("download integrity check failed: expected {expected_md5}, got {actual_md5}")]
    IntegrityMismatch {
        expected_md5: String,
        actual_md5: String,
    },
}

impl TransferError {
    pub fn is_transient(&self) -> bool {
        match self {
            TransferError::Request(err) => {
                err.is_timeout()
                    || err.is_connect()
                    || err.is_body()
                    || err.status().is_some_and(|status| {
                        status.is_server_error()
                            || status == reqwest::StatusCode::TOO_MANY_REQUESTS
                    })
            }
            TransferError::IntegrityMismatch { .. } => true,
            TransferError::Io(_) | TransferError::Url(_) | TransferError::ConcurrencyClosed => false,
        }
    }
}

/// Streams file bodies to and from the hrefs the API hands out, with
/// separate limits on concurrent downloads and uploads.
#[derive(Clone)]
pub struct TransferClient {
    http: Client,
    download_limit: Arc<Semaphore>,
    upload_limit: Arc<Semaphore>,
}

#[derive(Debug, Clone, Copy)]
pub struct TransferConfig {
    pub download_concurrency: usize,
    pub upload_concurrency: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            download_concurrency: read_usize_env("YADISK_DOWNLOAD_CONCURRENCY", 4),
            upload_concurrency: read_usize_env("YADISK_UPLOAD_CONCURRENCY", 2),
        }
    }
}

impl TransferClient {
    pub fn new() -> Self {
        Self::with_config(TransferConfig::default())
    }

    pub fn with_config(config: TransferConfig) -> Self {
        Self {
            http: Client::new(),
            download_limit: Arc::new(Semaphore::new(config.download_concurrency.max(1))),
            upload_limit: Arc::new(Semaphore::new(config.upload_concurrency.max(1))),
        }
    }

    /// Downloads into a sibling `.partial` file and renames it over `target`
    /// only once the body is complete and, when an MD5 is known, verified.
    pub async fn download_to_path(
        &self,
        href: &str,
        target: &Path,
        expected_md5: Option<&str>,
    ) -> Result<(), TransferError> {
        let _permit = self
            .download_limit
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| TransferError::ConcurrencyClosed)?;
        let url = Url::parse(href)?;
        let response = self.http.get(url).send().await?.error_for_status()?;

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let partial = partial_path(target);
        let written = write_body(response, &partial, expected_md5.is_some()).await;
        let actual_md5 = match written {
            Ok(actual_md5) => actual_md5,
            Err(err) => {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(err);
            }
        };

        if let (Some(expected), Some(actual)) = (expected_md5, actual_md5) {
            let expected = expected.to_ascii_lowercase();
            if actual != expected {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(TransferError::IntegrityMismatch {
                    expected_md5: expected,
                    actual_md5: actual,
                });
            }
        }

        tokio::fs::rename(partial, target).await?;
        Ok(())
    }

    pub async fn upload_from_path(&self, href: &str, source: &Path) -> Result<(), TransferError> {
        let _permit = self
            .upload_limit
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| TransferError::ConcurrencyClosed)?;
        let url = Url::parse(href)?;
        let file = tokio::fs::File::open(source).await?;
        let length = file.metadata().await?.len();
        let stream = ReaderStream::new(file);
        let body = reqwest::Body::wrap_stream(stream);
        self.http
            .put(url)
            .header(reqwest::header::CONTENT_LENGTH, length)
            .body(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

impl Default for TransferClient {
    fn default() -> Self {
        Self::new()
    }
}

async fn write_body(
    response: reqwest::Response,
    partial: &Path,
    hash: bool,
) -> Result<Option<String>, TransferError> {
    let mut file = tokio::fs::File::create(partial).await?;
    let mut stream = response.bytes_stream();
    let mut md5 = hash.then(Context::new);

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        if let Some(ctx) = md5.as_mut() {
            ctx.consume(&chunk);
        }
    }

    file.flush().await?;
    file.sync_all().await?;
    Ok(md5.map(|ctx| format!("{:x}", ctx.compute())))
}

/// Hidden sibling `.{name}.{tag}.yadisk-partial` with a random 8-digit hex
/// tag.
pub fn partial_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tag: u32 = rand::random();
    target.with_file_name(format!(".{name}.{tag:08x}{PARTIAL_SUFFIX}"))
}

/// Whether `name` has the exact shape produced by [`partial_path`]. Plain
/// `*.partial` files belong to the user and are synchronized.
pub fn is_partial_name(name: &str) -> bool {
    let Some(rest) = name
        .strip_prefix('.')
        .and_then(|rest| rest.strip_suffix(PARTIAL_SUFFIX))
    else {
        return false;
    };
    let Some((stem, tag)) = rest.rsplit_once('.') else {
        return false;
    };
    !stem.is_empty() && tag.len() == 8 && tag.bytes().all(|b| b.is_ascii_hexdigit())
}
