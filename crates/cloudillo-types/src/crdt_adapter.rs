//! `CRDTStore`: per-document persistence for the `CRDTRelay` sub-plane (§4.4, §4.5).
//!
//! Stores binary Yjs sync-protocol updates and lets a room reconstruct a
//! document's state by replaying them, or subscribe for real-time change
//! notifications.

use async_trait::async_trait;
use futures_core::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Debug;
use std::pin::Pin;

use crate::prelude::*;

/// A binary CRDT update (a Yjs sync-protocol message). Commutative: updates
/// can be applied in any order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrdtUpdate {
	pub data: Vec<u8>,
	pub timestamp: Timestamp,
	pub client_id: Option<Box<str>>,
}

impl CrdtUpdate {
	pub fn new(data: Vec<u8>) -> Self {
		Self { data, timestamp: Timestamp::now(), client_id: None }
	}

	pub fn with_client(data: Vec<u8>, client_id: impl Into<Box<str>>) -> Self {
		Self { data, timestamp: Timestamp::now(), client_id: Some(client_id.into()) }
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrdtDocMeta {
	#[serde(default)]
	pub initialized: bool,
	#[serde(default)]
	pub created_at: u64,
	#[serde(default)]
	pub updated_at: u64,
	#[serde(default)]
	pub size_bytes: u64,
	#[serde(default)]
	pub update_count: u32,
	#[serde(default)]
	pub custom: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrdtChangeEvent {
	pub doc_id: Box<str>,
	pub update: CrdtUpdate,
}

#[derive(Debug, Clone)]
pub struct CrdtSubscriptionOptions {
	pub doc_id: Box<str>,
	/// If true, send existing updates as an initial snapshot before live updates.
	pub send_snapshot: bool,
}

impl CrdtSubscriptionOptions {
	pub fn with_snapshot(doc_id: impl Into<Box<str>>) -> Self {
		Self { doc_id: doc_id.into(), send_snapshot: true }
	}

	pub fn updates_only(doc_id: impl Into<Box<str>>) -> Self {
		Self { doc_id: doc_id.into(), send_snapshot: false }
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrdtDocStats {
	pub doc_id: Box<str>,
	pub size_bytes: u64,
	pub update_count: u32,
	pub meta: CrdtDocMeta,
}

/// Tenant-scoped CRDT document backend. All operations are tenant-aware:
/// implementations must keep updates, subscriptions, and metadata isolated
/// per `tn_id`.
#[async_trait]
pub trait CRDTStore: Debug + Send + Sync {
	/// All stored updates for a document, in storage order; replaying them
	/// onto a fresh Y.Doc reconstructs current state. Empty if the document
	/// doesn't exist yet (safe to treat as a new, empty doc).
	async fn get_updates(&self, tn_id: TnId, doc_id: &str) -> ClResult<Vec<CrdtUpdate>>;

	/// Appends an update. If the document doesn't exist, it's implicitly created.
	async fn store_update(&self, tn_id: TnId, doc_id: &str, update: CrdtUpdate) -> ClResult<()>;

	async fn get_meta(&self, tn_id: TnId, doc_id: &str) -> ClResult<CrdtDocMeta>;
	async fn set_meta(&self, tn_id: TnId, doc_id: &str, meta: CrdtDocMeta) -> ClResult<()>;

	async fn get_meta_field(
		&self,
		tn_id: TnId,
		doc_id: &str,
		key: &str,
	) -> ClResult<Option<Value>> {
		let meta = self.get_meta(tn_id, doc_id).await?;
		Ok(meta.custom.get(key).cloned())
	}

	async fn set_meta_field(
		&self,
		tn_id: TnId,
		doc_id: &str,
		key: &str,
		value: Value,
	) -> ClResult<()> {
		let mut meta = self.get_meta(tn_id, doc_id).await?;
		meta.custom[key] = value;
		self.set_meta(tn_id, doc_id, meta).await
	}

	/// Subscribes to updates for a document, optionally preceded by a snapshot
	/// of already-stored updates.
	async fn subscribe(
		&self,
		tn_id: TnId,
		opts: CrdtSubscriptionOptions,
	) -> ClResult<Pin<Box<dyn Stream<Item = CrdtChangeEvent> + Send>>>;

	async fn stats(&self, tn_id: TnId, doc_id: &str) -> ClResult<CrdtDocStats> {
		let meta = self.get_meta(tn_id, doc_id).await?;
		Ok(CrdtDocStats {
			doc_id: doc_id.into(),
			size_bytes: meta.size_bytes,
			update_count: meta.update_count,
			meta,
		})
	}

	/// Deletes a document and all its stored updates.
	async fn delete_doc(&self, tn_id: TnId, doc_id: &str) -> ClResult<()>;

	/// Flushes an in-memory document instance before shutdown. No-op for
	/// backends that persist every update immediately.
	async fn close_doc(&self, _tn_id: TnId, _doc_id: &str) -> ClResult<()> {
		Ok(())
	}

	async fn list_docs(&self, tn_id: TnId) -> ClResult<Vec<Box<str>>>;
}

// vim: ts=4
