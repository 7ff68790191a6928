//! In-memory remote tree for engine tests.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::gateway::{GatewayError, RemoteGateway, RemoteItem};
use crate::sync::model::EntryKind;
use crate::sync::paths::normalize_remote;

#[derive(Debug, Clone)]
struct FakeFile {
    content: Vec<u8>,
    modified: String,
}

#[derive(Default)]
struct Tree {
    files: BTreeMap<String, FakeFile>,
    dirs: BTreeSet<String>,
    trashed: Vec<String>,
    ops: Vec<String>,
    failing_lists: BTreeSet<String>,
    failing_uploads: BTreeSet<String>,
}

pub struct FakeRemote {
    tree: Mutex<Tree>,
    list_delay: Duration,
    lists_in_flight: AtomicUsize,
    peak_lists: AtomicUsize,
}

pub fn rfc3339(unix_seconds: i64) -> String {
    OffsetDateTime::from_unix_timestamp(unix_seconds)
        .unwrap()
        .format(&Rfc3339)
        .unwrap()
}

fn parent_of(path: &str) -> String {
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
    }
}

fn name_of(path: &str) -> String {
    path.rsplit('/').next().unwrap_or_default().to_string()
}

fn is_within(path: &str, dir: &str) -> bool {
    path == dir || path.starts_with(&format!("{dir}/"))
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::with_list_delay(Duration::ZERO)
    }

    pub fn with_list_delay(list_delay: Duration) -> Self {
        let mut tree = Tree::default();
        tree.dirs.insert("/".to_string());
        Self {
            tree: Mutex::new(tree),
            list_delay,
            lists_in_flight: AtomicUsize::new(0),
            peak_lists: AtomicUsize::new(0),
        }
    }

    fn tree(&self) -> std::sync::MutexGuard<'_, Tree> {
        self.tree.lock().unwrap()
    }

    /// Creates the directory and any missing ancestors.
    pub fn mkdir(&self, path: &str) {
        let path = normalize_remote(path);
        let mut tree = self.tree();
        let mut current = String::new();
        for component in path.split('/').filter(|c| !c.is_empty()) {
            current.push('/');
            current.push_str(component);
            tree.dirs.insert(current.clone());
        }
    }

    pub fn put_file(&self, path: &str, content: &[u8], modified_unix: i64) {
        let path = normalize_remote(path);
        self.mkdir(&parent_of(&path));
        self.tree().files.insert(
            path,
            FakeFile {
                content: content.to_vec(),
                modified: rfc3339(modified_unix),
            },
        );
    }

    /// Removes a file or a whole subtree outside of the gateway, the way a
    /// user would through the web interface.
    pub fn remove(&self, path: &str) {
        let path = normalize_remote(path);
        let mut tree = self.tree();
        tree.files.retain(|p, _| !is_within(p, &path));
        tree.dirs.retain(|p| !is_within(p, &path));
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.tree()
            .files
            .get(&normalize_remote(path))
            .map(|f| f.content.clone())
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.tree().dirs.contains(&normalize_remote(path))
    }

    pub fn trashed(&self) -> Vec<String> {
        self.tree().trashed.clone()
    }

    /// Mutating calls in order, e.g. `upload /Sync/a.txt`.
    pub fn ops(&self) -> Vec<String> {
        self.tree().ops.clone()
    }

    pub fn fail_listing(&self, path: &str) {
        self.tree().failing_lists.insert(normalize_remote(path));
    }

    pub fn fail_upload(&self, path: &str) {
        self.tree().failing_uploads.insert(normalize_remote(path));
    }

    pub fn clear_failures(&self) {
        let mut tree = self.tree();
        tree.failing_lists.clear();
        tree.failing_uploads.clear();
    }

    pub fn peak_lists(&self) -> usize {
        self.peak_lists.load(Ordering::SeqCst)
    }

    fn log(&self, op: &str, path: &str) {
        self.tree().ops.push(format!("{op} {path}"));
    }
}

#[async_trait]
impl RemoteGateway for FakeRemote {
    async fn list(&self, path: &str) -> Result<Vec<RemoteItem>, GatewayError> {
        let path = normalize_remote(path);
        let now = self.lists_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_lists.fetch_max(now, Ordering::SeqCst);
        if !self.list_delay.is_zero() {
            tokio::time::sleep(self.list_delay).await;
        }
        self.lists_in_flight.fetch_sub(1, Ordering::SeqCst);

        let tree = self.tree();
        if tree.failing_lists.contains(&path) {
            return Err(GatewayError::Unavailable(format!("listing {path} failed")));
        }
        if !tree.dirs.contains(&path) {
            return Err(GatewayError::NotFound(path));
        }
        let mut items = Vec::new();
        for dir in tree.dirs.iter().filter(|d| *d != "/" && parent_of(d) == path) {
            items.push(RemoteItem {
                name: name_of(dir),
                path: dir.clone(),
                kind: EntryKind::Dir,
                size: None,
                modified: None,
                md5: None,
            });
        }
        for (file_path, file) in tree.files.iter().filter(|(p, _)| parent_of(p) == path) {
            items.push(RemoteItem {
                name: name_of(file_path),
                path: file_path.clone(),
                kind: EntryKind::File,
                size: Some(file.content.len() as u64),
                modified: Some(file.modified.clone()),
                md5: Some(format!("{:x}", md5::compute(&file.content))),
            });
        }
        Ok(items)
    }

    async fn upload(
        &self,
        local: &Path,
        remote: &str,
        _overwrite: bool,
    ) -> Result<(), GatewayError> {
        let remote = normalize_remote(remote);
        let content = tokio::fs::read(local)
            .await
            .map_err(|err| GatewayError::OperationFailed(err.to_string()))?;
        let mut tree = self.tree();
        if tree.failing_uploads.contains(&remote) {
            return Err(GatewayError::Unavailable(format!("upload of {remote} failed")));
        }
        if !tree.dirs.contains(&parent_of(&remote)) {
            return Err(GatewayError::NotFound(parent_of(&remote)));
        }
        tree.files.insert(
            remote.clone(),
            FakeFile {
                content,
                modified: OffsetDateTime::now_utc().format(&Rfc3339).unwrap(),
            },
        );
        tree.ops.push(format!("upload {remote}"));
        Ok(())
    }

    async fn download(
        &self,
        remote: &str,
        local: &Path,
        expected_md5: Option<&str>,
    ) -> Result<(), GatewayError> {
        let remote = normalize_remote(remote);
        let content = self
            .tree()
            .files
            .get(&remote)
            .map(|f| f.content.clone())
            .ok_or_else(|| GatewayError::NotFound(remote.clone()))?;
        if let Some(expected) = expected_md5 {
            let actual = format!("{:x}", md5::compute(&content));
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(GatewayError::OperationFailed(format!(
                    "md5 mismatch for {remote}"
                )));
            }
        }
        if let Some(parent) = local.parent() {
            tokio::fs::create_dir_all(parent).await.unwrap();
        }
        tokio::fs::write(local, content).await.unwrap();
        self.log("download", &remote);
        Ok(())
    }

    async fn create_directory(&self, path: &str) -> Result<(), GatewayError> {
        let path = normalize_remote(path);
        let mut tree = self.tree();
        if !tree.dirs.contains(&parent_of(&path)) {
            return Err(GatewayError::NotFound(parent_of(&path)));
        }
        tree.dirs.insert(path.clone());
        tree.ops.push(format!("mkdir {path}"));
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool, GatewayError> {
        let path = normalize_remote(path);
        let tree = self.tree();
        Ok(tree.dirs.contains(&path) || tree.files.contains_key(&path))
    }

    async fn trash(&self, path: &str) -> Result<(), GatewayError> {
        let path = normalize_remote(path);
        let mut tree = self.tree();
        let existed = tree.files.contains_key(&path) || tree.dirs.contains(&path);
        if !existed {
            return Err(GatewayError::NotFound(path));
        }
        tree.files.retain(|p, _| !is_within(p, &path));
        tree.dirs.retain(|p| !is_within(p, &path));
        tree.trashed.push(path.clone());
        tree.ops.push(format!("trash {path}"));
        Ok(())
    }

    async fn remove_permanently(&self, path: &str) -> Result<(), GatewayError> {
        let path = normalize_remote(path);
        let mut tree = self.tree();
        if !tree.dirs.contains(&path) {
            return Err(GatewayError::NotFound(path));
        }
        let occupied = tree.files.keys().any(|p| parent_of(p) == path)
            || tree.dirs.iter().any(|d| d != &path && parent_of(d) == path);
        if occupied {
            return Err(GatewayError::OperationFailed(format!("{path} is not empty")));
        }
        tree.dirs.remove(&path);
        tree.ops.push(format!("rmdir {path}"));
        Ok(())
    }
}
