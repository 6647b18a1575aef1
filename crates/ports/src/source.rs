//! Versioned-source boundary contract.

use crate::BoxFuture;
use benchkube_shared::{RequestContext, Result};

/// A source location: repository plus ref.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    /// Owner (organisation or user).
    pub owner: Box<str>,
    /// Repository name.
    pub repository: Box<str>,
    /// Branch or ref.
    pub reference: Box<str>,
}

/// A directory entry listed from the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    /// Path within the repository.
    pub path: Box<str>,
    /// File name (final path segment).
    pub name: Box<str>,
    /// Blob SHA of the entry.
    pub sha: Box<str>,
}

/// A fetched file with its commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceBlob {
    /// Raw content bytes.
    pub content: Vec<u8>,
    /// Commit SHA the content was read at.
    pub commit: Box<str>,
}

/// Boundary contract to the external versioned source.
///
/// Implementations are rate-limited (10 rps per token) and carry per-call
/// timeouts. Rate limiting and auth failures surface as `upstream` /
/// `unauthorized` errors; they never panic the poller.
pub trait SourceClient: Send + Sync {
    /// List files directly under `folder` at the location's ref.
    fn list_folder<'a>(
        &'a self,
        ctx: &'a RequestContext,
        location: &'a SourceLocation,
        folder: &'a str,
    ) -> BoxFuture<'a, Result<Vec<SourceEntry>>>;

    /// Fetch one file's bytes and the head commit of its ref.
    fn fetch_file<'a>(
        &'a self,
        ctx: &'a RequestContext,
        location: &'a SourceLocation,
        path: &'a str,
    ) -> BoxFuture<'a, Result<SourceBlob>>;

    /// Create or update a file, committing with `message`.
    ///
    /// Returns the new commit SHA.
    fn put_file<'a>(
        &'a self,
        ctx: &'a RequestContext,
        location: &'a SourceLocation,
        path: &'a str,
        content: &'a [u8],
        message: &'a str,
    ) -> BoxFuture<'a, Result<Box<str>>>;
}
