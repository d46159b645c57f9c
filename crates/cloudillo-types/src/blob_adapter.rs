//! `BlobStore`: content-addressed storage for file variants (§4.5).
//!
//! Writing a blob whose content hash disagrees with its announced `fileId` is
//! rejected (§3 invariant 6); writing at an existing hash is a no-op (§5).

use async_trait::async_trait;
use futures_core::Stream;
use std::fmt::Debug;
use std::pin::Pin;

use crate::prelude::*;

#[derive(Debug, Clone, Copy, Default)]
pub struct WriteBlobOptions {
	/// Overwrite even if a blob already exists at this id (normally a no-op).
	pub force: bool,
	/// Materialize the blob in the public-mirrored tree alongside the private one.
	pub public: bool,
}

/// A streamed chunk of blob bytes, as returned by `open_blob`.
pub type BlobChunk = ClResult<Vec<u8>>;

#[async_trait]
pub trait BlobStore: Debug + Send + Sync {
	/// Writes `bytes` under `(tn_id, file_id, label)`. Rejects with
	/// `Error::Conflict` if `hash(bytes) != file_id`. A write at an id that
	/// already exists with matching content is a no-op.
	async fn write_blob(
		&self,
		tn_id: TnId,
		file_id: &str,
		label: &str,
		bytes: &[u8],
		opts: WriteBlobOptions,
	) -> ClResult<()>;

	/// Reads the full contents of a blob into memory.
	async fn read_blob(&self, tn_id: TnId, file_id: &str, label: &str) -> ClResult<Vec<u8>>;

	/// Opens a blob as a stream of chunks, for large-file serving without
	/// buffering the whole file.
	async fn open_blob(
		&self,
		tn_id: TnId,
		file_id: &str,
		label: &str,
	) -> ClResult<Pin<Box<dyn Stream<Item = BlobChunk> + Send>>>;

	/// Checks whether a blob variant exists without reading its bytes.
	async fn check_blob(&self, tn_id: TnId, file_id: &str, label: &str) -> ClResult<bool>;

	/// Removes a blob variant. Used when a file or variant is deleted.
	async fn delete_blob(&self, tn_id: TnId, file_id: &str, label: &str) -> ClResult<()>;
}

// vim: ts=4
