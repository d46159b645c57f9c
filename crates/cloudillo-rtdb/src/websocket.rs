//! Structured-database WebSocket relay. A connection is scoped to one
//! `(tenant, fileId)` pair and exchanges JSON command/response frames for
//! the hierarchical document store described by `DatabaseStore` (§6):
//! transactional create/update/delete, query, get-by-path and subscribe.
//!
//! Message format:
//! ```json
//! { "id": "msg-123", "type": "query", "path": "posts", "filter": {...} }
//! ```

use crate::prelude::*;
use axum::extract::ws::{Message, WebSocket};
use cloudillo_types::rtdb_adapter::{
	ChangeEvent, QueryFilter, QueryOptions, SortField, SubscriptionOptions,
};
use cloudillo_types::utils::random_id;
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// A message in the RTDB protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RtdbMessage {
	/// Unique message id, echoed back in the response for request/response matching.
	pub id: Value,
	#[serde(rename = "type")]
	pub msg_type: String,
	/// Every other field (path, data, filter, ...) flattened into this map.
	#[serde(flatten)]
	pub payload: serde_json::Map<String, Value>,
}

impl RtdbMessage {
	pub fn new(msg_type: impl Into<String>, payload: Value) -> Self {
		let map = match payload {
			Value::Object(obj) => obj,
			_ => serde_json::Map::new(),
		};
		Self { id: Value::String(random_id().unwrap_or_default()), msg_type: msg_type.into(), payload: map }
	}

	pub fn response(id: Value, msg_type: impl Into<String>, fields: serde_json::Map<String, Value>) -> Self {
		Self { id, msg_type: msg_type.into(), payload: fields }
	}

	fn to_ws_message(&self) -> Result<Message, serde_json::Error> {
		Ok(Message::Text(serde_json::to_string(self)?.into()))
	}

	fn from_ws_message(msg: &Message) -> Option<Self> {
		match msg {
			Message::Text(text) => serde_json::from_str::<RtdbMessage>(text).ok(),
			Message::Close(_) | Message::Ping(_) | Message::Pong(_) | Message::Binary(_) => None,
		}
	}
}

struct RtdbConnection {
	user_id: String,
	file_id: String,
	tn_id: TnId,
	read_only: bool,
	aggregated_tx: tokio::sync::mpsc::UnboundedSender<(String, ChangeEvent)>,
	subscription_handles: RwLock<HashMap<String, tokio::task::JoinHandle<()>>>,
}

/// Drives one structured-database connection end to end: dispatches incoming
/// commands and forwards subscription change events until the socket closes.
///
/// `read_only` mirrors the CRDTRelay's per-connection access check (§4.4):
/// access is resolved once at upgrade time by the caller and passed in here,
/// rather than re-checked per message.
pub async fn handle_rtdb_connection(
	ws: WebSocket,
	user_id: String,
	file_id: String,
	app: App,
	tn_id: TnId,
	read_only: bool,
) {
	info!(%user_id, %file_id, read_only, "rtdb connection opened");

	let (aggregated_tx, mut aggregated_rx) =
		tokio::sync::mpsc::unbounded_channel::<(String, ChangeEvent)>();

	let conn = Arc::new(RtdbConnection {
		user_id: user_id.clone(),
		file_id: file_id.clone(),
		tn_id,
		read_only,
		aggregated_tx,
		subscription_handles: RwLock::new(HashMap::new()),
	});

	let (ws_tx, mut ws_rx) = ws.split();
	let ws_tx = Arc::new(Mutex::new(ws_tx));

	let conn_clone = conn.clone();
	let app_clone = app.clone();
	let ws_tx_clone = ws_tx.clone();
	let recv_task = tokio::spawn(async move {
		while let Some(Ok(ws_msg)) = ws_rx.next().await {
			let Some(msg) = RtdbMessage::from_ws_message(&ws_msg) else { continue };
			let response = handle_command(&conn_clone, &msg, &app_clone).await;
			if let Ok(frame) = response.to_ws_message() {
				if ws_tx_clone.lock().await.send(frame).await.is_err() {
					break;
				}
			}
		}
	});

	let ws_tx_clone = ws_tx.clone();
	let forward_task = tokio::spawn(async move {
		while let Some((subscription_id, event)) = aggregated_rx.recv().await {
			let (action, data) = match &event {
				ChangeEvent::Create { data, .. } => ("create", Some(data.clone())),
				ChangeEvent::Update { data, .. } => ("update", Some(data.clone())),
				ChangeEvent::Delete { .. } => ("delete", None),
				ChangeEvent::Ready { .. } => ("ready", None),
			};
			let mut event_obj = json!({ "action": action, "path": event.path() });
			if let Some(d) = data {
				event_obj["data"] = d;
			}
			let msg = RtdbMessage::new("change", json!({ "subscriptionId": subscription_id, "event": event_obj }));
			if let Ok(frame) = msg.to_ws_message() {
				if ws_tx_clone.lock().await.send(frame).await.is_err() {
					break;
				}
			}
		}
	});

	tokio::select! {
		_ = recv_task => {}
		_ = forward_task => {}
	}

	let handles = conn.subscription_handles.write().await;
	for handle in handles.values() {
		handle.abort();
	}
	drop(handles);

	info!(%user_id, "rtdb connection closed");
}

fn read_only_error() -> RtdbMessage {
	RtdbMessage::new("error", json!({ "code": 403, "message": "write access denied on a read-only connection" }))
}

async fn handle_command(conn: &Arc<RtdbConnection>, msg: &RtdbMessage, app: &App) -> RtdbMessage {
	match msg.msg_type.as_str() {
		"transaction" => handle_transaction(conn, msg, app).await,
		"query" => handle_query(conn, msg, app).await,
		"get" => handle_get(conn, msg, app).await,
		"subscribe" => handle_subscribe(conn, msg, app).await,
		"unsubscribe" => {
			let subscription_id = msg.payload.get("subscriptionId").and_then(|v| v.as_str()).unwrap_or("");
			if let Some(handle) = conn.subscription_handles.write().await.remove(subscription_id) {
				handle.abort();
			}
			RtdbMessage::response(msg.id.clone(), "unsubscribeResult", serde_json::Map::new())
		}
		"ping" => RtdbMessage::response(msg.id.clone(), "pong", serde_json::Map::new()),
		other => RtdbMessage::new("error", json!({ "code": 400, "message": format!("unknown command: {other}") })),
	}
}

async fn handle_transaction(conn: &Arc<RtdbConnection>, msg: &RtdbMessage, app: &App) -> RtdbMessage {
	if conn.read_only {
		return read_only_error();
	}
	let Some(operations) = msg.payload.get("operations").and_then(|v| v.as_array()) else {
		return RtdbMessage::new("error", json!({ "code": 400, "message": "missing operations" }));
	};

	let mut txn = match app.rtdb_adapter.transaction(conn.tn_id, &conn.file_id).await {
		Ok(t) => t,
		Err(e) => {
			return RtdbMessage::new("error", json!({ "code": 500, "message": format!("transaction start failed: {e}") }));
		}
	};

	let mut results = Vec::new();
	for op in operations {
		let op_type = op.get("type").and_then(|v| v.as_str()).unwrap_or("");
		let path = op.get("path").and_then(|v| v.as_str()).unwrap_or("").to_string();

		let result = match op_type {
			"create" => {
				let data = op.get("data").cloned().unwrap_or(Value::Null);
				txn.create(&path, data).await.map(|id| json!({ "id": id }))
			}
			"update" => {
				let patch = op.get("data").cloned().unwrap_or(Value::Null);
				match txn.get(&path).await {
					Ok(Some(mut existing)) => match crate::merge::shallow_merge(&mut existing, &patch) {
						Ok(_) => txn.update(&path, existing).await.map(|_| json!({ "id": Value::Null })),
						Err(e) => Err(Error::BadInput(e.message)),
					},
					Ok(None) => txn.update(&path, patch).await.map(|_| json!({ "id": Value::Null })),
					Err(e) => Err(e),
				}
			}
			"delete" => txn.delete(&path).await.map(|_| json!({ "id": Value::Null })),
			_ => {
				warn!("unknown transaction operation type: {op_type}");
				Err(Error::BadInput(format!("unknown operation type: {op_type}")))
			}
		};

		match result {
			Ok(r) => results.push(r),
			Err(e) => {
				let _ = txn.rollback().await;
				return RtdbMessage::new("error", json!({ "code": 500, "message": format!("transaction failed: {e}") }));
			}
		}
	}

	if let Err(e) = txn.commit().await {
		return RtdbMessage::new("error", json!({ "code": 500, "message": format!("commit failed: {e}") }));
	}

	let mut fields = serde_json::Map::new();
	fields.insert("results".to_string(), Value::Array(results));
	RtdbMessage::response(msg.id.clone(), "transactionResult", fields)
}

fn parse_query_options(payload: &serde_json::Map<String, Value>) -> QueryOptions {
	let mut opts = QueryOptions::new();
	if let Some(filter) = payload.get("filter").and_then(|v| serde_json::from_value::<QueryFilter>(v.clone()).ok()) {
		opts = opts.with_filter(filter);
	}
	if let Some(sort_arr) = payload.get("sort").and_then(|v| v.as_array()) {
		let fields = sort_arr
			.iter()
			.filter_map(|item| {
				let field = item.get("field")?.as_str()?.to_string();
				let ascending = item.get("ascending").and_then(Value::as_bool).unwrap_or(true);
				Some(SortField { field, ascending })
			})
			.collect::<Vec<_>>();
		if !fields.is_empty() {
			opts = opts.with_sort(fields);
		}
	}
	if let Some(limit) = payload.get("limit").and_then(Value::as_u64) {
		opts = opts.with_limit(u32::try_from(limit).unwrap_or(u32::MAX));
	}
	opts.offset = payload.get("offset").and_then(Value::as_u64).and_then(|v| u32::try_from(v).ok());
	opts
}

async fn handle_query(conn: &Arc<RtdbConnection>, msg: &RtdbMessage, app: &App) -> RtdbMessage {
	let path = msg.payload.get("path").and_then(|v| v.as_str()).unwrap_or("");
	let opts = parse_query_options(&msg.payload);

	match app.rtdb_adapter.query(conn.tn_id, &conn.file_id, path, opts).await {
		Ok(documents) => {
			let mut fields = serde_json::Map::new();
			fields.insert("data".to_string(), Value::Array(documents));
			RtdbMessage::response(msg.id.clone(), "queryResult", fields)
		}
		Err(e) => {
			warn!("rtdb query failed: {e}");
			RtdbMessage::new("error", json!({ "code": 500, "message": "query failed" }))
		}
	}
}

async fn handle_get(conn: &Arc<RtdbConnection>, msg: &RtdbMessage, app: &App) -> RtdbMessage {
	let path = msg.payload.get("path").and_then(|v| v.as_str()).unwrap_or("");
	match app.rtdb_adapter.get(conn.tn_id, &conn.file_id, path).await {
		Ok(document) => {
			let mut fields = serde_json::Map::new();
			fields.insert("data".to_string(), document.unwrap_or(Value::Null));
			RtdbMessage::response(msg.id.clone(), "getResult", fields)
		}
		Err(_) => RtdbMessage::new("error", json!({ "code": 404, "message": "document not found" })),
	}
}

async fn handle_subscribe(conn: &Arc<RtdbConnection>, msg: &RtdbMessage, app: &App) -> RtdbMessage {
	let path = msg.payload.get("path").and_then(|v| v.as_str()).unwrap_or("");
	let filter = msg.payload.get("filter").and_then(|v| serde_json::from_value::<QueryFilter>(v.clone()).ok());
	let sub_opts = match &filter {
		Some(f) => SubscriptionOptions::filtered(path, f.clone()),
		None => SubscriptionOptions::all(path),
	};
	let subscription_id = format!("sub-{}", random_id().unwrap_or_default());

	match app.rtdb_adapter.subscribe(conn.tn_id, &conn.file_id, sub_opts).await {
		Ok(mut stream) => {
			let agg_tx = conn.aggregated_tx.clone();
			let sub_id = subscription_id.clone();
			let handle = tokio::spawn(async move {
				while let Some(event) = stream.next().await {
					if agg_tx.send((sub_id.clone(), event)).is_err() {
						break;
					}
				}
			});
			conn.subscription_handles.write().await.insert(subscription_id.clone(), handle);

			let mut fields = serde_json::Map::new();
			fields.insert("subscriptionId".to_string(), Value::String(subscription_id));
			RtdbMessage::response(msg.id.clone(), "subscribeResult", fields)
		}
		Err(e) => RtdbMessage::new("error", json!({ "code": 500, "message": format!("subscribe failed: {e}") })),
	}
}

// vim: ts=4
