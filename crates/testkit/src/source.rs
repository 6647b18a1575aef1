//! In-memory versioned-source client.

use benchkube_ports::{BoxFuture, SourceBlob, SourceClient, SourceEntry, SourceLocation};
use benchkube_shared::{ErrorEnvelope, RequestContext, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// An in-memory repository: paths to `(content, commit)`.
#[derive(Debug, Default, Clone)]
pub struct InMemorySourceClient {
    files: Arc<RwLock<BTreeMap<Box<str>, (Vec<u8>, Box<str>)>>>,
    commit_seq: Arc<AtomicU64>,
    fail_listing: Arc<std::sync::atomic::AtomicBool>,
}

impl InMemorySourceClient {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file at `path` with `content`, returning its commit.
    pub async fn set_file(&self, path: &str, content: &[u8]) -> Box<str> {
        let commit = self.next_commit();
        self.files
            .write()
            .await
            .insert(path.into(), (content.to_vec(), commit.clone()));
        commit
    }

    /// Remove a file (simulates deletion in the source).
    pub async fn remove_file(&self, path: &str) {
        self.files.write().await.remove(path);
    }

    /// Make every listing fail with `upstream` until called again.
    pub fn set_fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }

    /// Content currently stored at `path`, if any.
    pub async fn content_at(&self, path: &str) -> Option<Vec<u8>> {
        self.files
            .read()
            .await
            .get(path)
            .map(|(content, _)| content.clone())
    }

    fn next_commit(&self) -> Box<str> {
        let n = self.commit_seq.fetch_add(1, Ordering::Relaxed);
        format!("commit-{n}").into_boxed_str()
    }
}

impl SourceClient for InMemorySourceClient {
    fn list_folder<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        _location: &'a SourceLocation,
        folder: &'a str,
    ) -> BoxFuture<'a, Result<Vec<SourceEntry>>> {
        Box::pin(async move {
            if self.fail_listing.load(Ordering::SeqCst) {
                return Err(ErrorEnvelope::upstream("scripted listing failure"));
            }
            let prefix = format!("{folder}/");
            Ok(self
                .files
                .read()
                .await
                .iter()
                .filter(|(path, _)| {
                    path.starts_with(&prefix) && !path[prefix.len()..].contains('/')
                })
                .map(|(path, (_, sha))| SourceEntry {
                    path: path.clone(),
                    name: path.rsplit('/').next().unwrap_or(path).into(),
                    sha: sha.clone(),
                })
                .collect())
        })
    }

    fn fetch_file<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        _location: &'a SourceLocation,
        path: &'a str,
    ) -> BoxFuture<'a, Result<SourceBlob>> {
        Box::pin(async move {
            self.files
                .read()
                .await
                .get(path)
                .map(|(content, commit)| SourceBlob {
                    content: content.clone(),
                    commit: commit.clone(),
                })
                .ok_or_else(|| ErrorEnvelope::not_found("no such source file"))
        })
    }

    fn put_file<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        _location: &'a SourceLocation,
        path: &'a str,
        content: &'a [u8],
        _message: &'a str,
    ) -> BoxFuture<'a, Result<Box<str>>> {
        Box::pin(async move {
            let commit = self.next_commit();
            self.files
                .write()
                .await
                .insert(path.into(), (content.to_vec(), commit.clone()));
            Ok(commit)
        })
    }
}
