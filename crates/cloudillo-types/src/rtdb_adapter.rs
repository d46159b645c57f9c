//! `DatabaseStore`: a per-document, hierarchical JSON document store addressed
//! by path (`posts/abc123/comments/xyz789`), backing the `/db/*` routes (§4.5, §6).
//!
//! Reads (`get`, `query`, `subscribe`) work directly on the store; writes go
//! through a `Transaction` so multi-document changes commit atomically.

use async_trait::async_trait;
use futures_core::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Debug;
use std::pin::Pin;

use crate::prelude::*;

/// A filter for selecting documents under a path. A document matches if every
/// specified constraint holds (AND logic).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryFilter {
	#[serde(default, skip_serializing_if = "HashMap::is_empty")]
	pub equals: HashMap<String, Value>,
	#[serde(default, skip_serializing_if = "HashMap::is_empty", rename = "inArray")]
	pub in_array: HashMap<String, Vec<Value>>,
}

impl QueryFilter {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_equals(mut self, field: impl Into<String>, value: Value) -> Self {
		self.equals.insert(field.into(), value);
		self
	}

	pub fn with_in_array(mut self, field: impl Into<String>, values: Vec<Value>) -> Self {
		self.in_array.insert(field.into(), values);
		self
	}

	pub fn is_empty(&self) -> bool {
		self.equals.is_empty() && self.in_array.is_empty()
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortField {
	pub field: String,
	pub ascending: bool,
}

impl SortField {
	pub fn asc(field: impl Into<String>) -> Self {
		Self { field: field.into(), ascending: true }
	}

	pub fn desc(field: impl Into<String>) -> Self {
		Self { field: field.into(), ascending: false }
	}
}

#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
	pub filter: Option<QueryFilter>,
	pub sort: Option<Vec<SortField>>,
	pub limit: Option<u32>,
	pub offset: Option<u32>,
}

impl QueryOptions {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_filter(mut self, filter: QueryFilter) -> Self {
		self.filter = Some(filter);
		self
	}

	pub fn with_sort(mut self, sort: Vec<SortField>) -> Self {
		self.sort = Some(sort);
		self
	}

	pub fn with_limit(mut self, limit: u32) -> Self {
		self.limit = Some(limit);
		self
	}
}

#[derive(Debug, Clone)]
pub struct SubscriptionOptions {
	pub path: Box<str>,
	pub filter: Option<QueryFilter>,
}

impl SubscriptionOptions {
	pub fn all(path: impl Into<Box<str>>) -> Self {
		Self { path: path.into(), filter: None }
	}

	pub fn filtered(path: impl Into<Box<str>>, filter: QueryFilter) -> Self {
		Self { path: path.into(), filter: Some(filter) }
	}
}

/// A real-time change to a document, pushed to subscribers of its path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ChangeEvent {
	Create { path: Box<str>, data: Value },
	Update { path: Box<str>, data: Value },
	Delete { path: Box<str> },
	/// Signals that all pre-existing documents have been yielded for a subscription.
	Ready { path: Box<str> },
}

impl ChangeEvent {
	pub fn path(&self) -> &str {
		match self {
			ChangeEvent::Create { path, .. }
			| ChangeEvent::Update { path, .. }
			| ChangeEvent::Delete { path }
			| ChangeEvent::Ready { path } => path,
		}
	}

	pub fn data(&self) -> Option<&Value> {
		match self {
			ChangeEvent::Create { data, .. } | ChangeEvent::Update { data, .. } => Some(data),
			ChangeEvent::Delete { .. } | ChangeEvent::Ready { .. } => None,
		}
	}
}

/// Atomic multi-document write. Reads within a transaction see its own
/// uncommitted writes (read-your-own-writes).
#[async_trait]
pub trait Transaction: Send + Sync {
	/// Creates a document with an auto-generated id under `path`. Returns the id.
	async fn create(&mut self, path: &str, data: Value) -> ClResult<Box<str>>;
	async fn update(&mut self, path: &str, data: Value) -> ClResult<()>;
	async fn delete(&mut self, path: &str) -> ClResult<()>;
	async fn get(&self, path: &str) -> ClResult<Option<Value>>;
	async fn commit(&mut self) -> ClResult<()>;
	async fn rollback(&mut self) -> ClResult<()>;
}

#[async_trait]
pub trait DatabaseStore: Debug + Send + Sync {
	async fn transaction(&self, tn_id: TnId, db_id: &str) -> ClResult<Box<dyn Transaction>>;
	async fn close_db(&self, tn_id: TnId, db_id: &str) -> ClResult<()>;

	async fn query(
		&self,
		tn_id: TnId,
		db_id: &str,
		path: &str,
		opts: QueryOptions,
	) -> ClResult<Vec<Value>>;

	async fn get(&self, tn_id: TnId, db_id: &str, path: &str) -> ClResult<Option<Value>>;

	async fn subscribe(
		&self,
		tn_id: TnId,
		db_id: &str,
		opts: SubscriptionOptions,
	) -> ClResult<Pin<Box<dyn Stream<Item = ChangeEvent> + Send>>>;
}

// vim: ts=4
