//! CRDTRelay sub-plane (§4.4): one WebSocket connection per
//! `(tenant, docId, user)`, routed into a per-document room that owns the
//! authoritative Yjs document. Rooms are process-local; every external
//! entry point enqueues onto the room's inbox rather than touching the
//! document directly (§4.5 shared-resource policy).
//!
//! Wire format, binary frames only:
//! ```text
//! [msg_type: u8] [payload: bytes]
//! msg_type: 0 = sync step 1 (state vector)
//! msg_type: 1 = sync step 2 / update (Yjs update)
//! msg_type: 2 = awareness (presence, not persisted)
//! ```

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use futures::sink::SinkExt;
use futures::stream::{SplitSink, StreamExt};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock};
use yrs::updates::decoder::Decode;
use yrs::{Doc, ReadTxn, StateVector, Transact, Update};

use cloudillo_types::auth_adapter::AuthCtx;
use cloudillo_types::crdt_adapter::CrdtUpdate;

use crate::prelude::*;

/// Close code: token missing, expired or otherwise unauthenticated (§4.4).
pub const CLOSE_AUTH: u16 = 4401;
/// Close code: token valid but access level insufficient for the requested room.
pub const CLOSE_DENIED: u16 = 4403;
/// Close code: the document (or the room backing it) does not exist / failed to load.
pub const CLOSE_NOT_FOUND: u16 = 4404;

/// Grace period a room survives with zero members before it's evicted, so a
/// client reconnecting immediately after a blip rejoins a warm room instead
/// of paying a fresh `CRDTStore::get_updates` replay (§4.4 step 5).
const ROOM_EVICTION_GRACE: Duration = Duration::from_secs(30);

#[derive(Clone, Copy, PartialEq, Eq)]
enum SyncMsg {
	Step1 = 0,
	Update = 1,
	Awareness = 2,
}

impl SyncMsg {
	fn from_u8(b: u8) -> Option<Self> {
		match b {
			0 => Some(SyncMsg::Step1),
			1 => Some(SyncMsg::Update),
			2 => Some(SyncMsg::Awareness),
			_ => None,
		}
	}
}

/// A presence/awareness frame, relayed to other room members but never
/// persisted (§4.4 step 3).
#[derive(Clone, Debug)]
struct AwarenessFrame {
	from: Box<str>,
	payload: Vec<u8>,
}

/// Authoritative in-memory state for one `(tenant, docId)` pair. All
/// mutation goes through `doc`'s own lock; nothing else touches the Yjs
/// state directly (§4.5 shared-resource policy).
struct Room {
	doc: Mutex<Doc>,
	members: RwLock<usize>,
	updates_tx: broadcast::Sender<(Box<str>, Vec<u8>)>,
	awareness_tx: broadcast::Sender<AwarenessFrame>,
}

type RoomKey = (TnId, Box<str>);
type RoomRegistry = RwLock<HashMap<RoomKey, Arc<Room>>>;

static ROOMS: LazyLock<RoomRegistry> = LazyLock::new(|| RwLock::new(HashMap::new()));

/// Joins the room for `(tn_id, doc_id)`, creating it and replaying its
/// persisted updates onto a fresh `Doc` if this is the first member (§4.4
/// step 2: "the room owns the authoritative CRDT state loaded from
/// `CRDTStore`").
async fn join_room(app: &App, tn_id: TnId, doc_id: &str) -> ClResult<Arc<Room>> {
	let key: RoomKey = (tn_id, Box::from(doc_id));

	{
		let rooms = ROOMS.read().await;
		if let Some(room) = rooms.get(&key) {
			*room.members.write().await += 1;
			return Ok(room.clone());
		}
	}

	let mut rooms = ROOMS.write().await;
	if let Some(room) = rooms.get(&key) {
		*room.members.write().await += 1;
		return Ok(room.clone());
	}

	let stored = app.crdt_adapter.get_updates(tn_id, doc_id).await?;
	let doc = Doc::new();
	{
		let mut txn = doc.transact_mut();
		for update in &stored {
			let update = Update::decode_v1(&update.data)
				.map_err(|e| Error::StoreError(format!("corrupt CRDT update for {doc_id}: {e}")))?;
			txn
				.apply_update(update)
				.map_err(|e| Error::StoreError(format!("failed to replay CRDT update for {doc_id}: {e}")))?;
		}
	}

	let room = Arc::new(Room {
		doc: Mutex::new(doc),
		members: RwLock::new(1),
		updates_tx: broadcast::channel(256).0,
		awareness_tx: broadcast::channel(256).0,
	});
	rooms.insert(key, room.clone());
	Ok(room)
}

/// Leaves a room. If it was the last member, schedules eviction after a
/// grace period (§4.4 step 5). A member who rejoins during the grace period
/// keeps the room alive, since the member count is re-checked when the
/// timer fires.
async fn leave_room(tn_id: TnId, doc_id: Box<str>) {
	let key: RoomKey = (tn_id, doc_id);
	let remaining = {
		let rooms = ROOMS.read().await;
		match rooms.get(&key) {
			Some(room) => {
				let mut members = room.members.write().await;
				*members = members.saturating_sub(1);
				*members
			}
			None => return,
		}
	};
	if remaining != 0 {
		return;
	}

	tokio::spawn(async move {
		tokio::time::sleep(ROOM_EVICTION_GRACE).await;
		let mut rooms = ROOMS.write().await;
		if let Some(room) = rooms.get(&key) {
			if *room.members.read().await == 0 {
				rooms.remove(&key);
				debug!(doc_id = %key.1, "evicted idle CRDT room");
			}
		}
	});
}

#[derive(Debug, Deserialize)]
pub struct CrdtQuery {
	pub token: Box<str>,
}

/// `GET /ws/crdt/{docId}?token=...`: upgrades to a CRDTRelay connection
/// after verifying the access token against the requested document (§4.4,
/// §6). Authentication and scope failures never reach the WebSocket layer:
/// the upgrade itself fails with `401`/`403`, so only a successfully scoped
/// connection can receive the in-band 4404 close code.
pub async fn crdt_ws_handler(
	State(app): State<App>,
	tn_id: TnId,
	Path(doc_id): Path<String>,
	Query(query): Query<CrdtQuery>,
	ws: WebSocketUpgrade,
) -> Response {
	let auth = match app.auth_adapter.verify_access_token(tn_id, &query.token).await {
		Ok(auth) => auth,
		Err(_) => return (axum::http::StatusCode::UNAUTHORIZED, "invalid or expired token").into_response(),
	};
	if auth.resource.as_deref() != Some(doc_id.as_str()) {
		return (axum::http::StatusCode::FORBIDDEN, "token not scoped to this document").into_response();
	}
	if !auth.access.satisfies(Access::Read) {
		return (axum::http::StatusCode::FORBIDDEN, "insufficient access").into_response();
	}

	ws.on_upgrade(move |socket| handle_crdt_connection(socket, app, tn_id, doc_id.into(), auth))
}

/// Drives one CRDTRelay connection end to end: two-step sync on join, then
/// streaming updates and awareness until the socket closes (§4.4).
pub async fn handle_crdt_connection(socket: WebSocket, app: App, tn_id: TnId, doc_id: Box<str>, auth: AuthCtx) {
	let room = match join_room(&app, tn_id, &doc_id).await {
		Ok(room) => room,
		Err(e) => {
			warn!(doc_id = %doc_id, error = %e, "failed to load CRDT room");
			let mut socket = socket;
			let _ = socket.send(Message::Close(Some(CloseFrame { code: CLOSE_NOT_FOUND, reason: "".into() }))).await;
			return;
		}
	};

	let user_id = auth.id_tag.clone();
	let (ws_tx, mut ws_rx) = socket.split();
	let ws_tx = Arc::new(Mutex::new(ws_tx));

	let mut updates_rx = room.updates_tx.subscribe();
	let mut awareness_rx = room.awareness_tx.subscribe();

	let relay_tx = ws_tx.clone();
	let relay_user = user_id.clone();
	let relay_task = tokio::spawn(async move {
		loop {
			tokio::select! {
				update = updates_rx.recv() => {
					match update {
						Ok((from, bytes)) if from.as_ref() != relay_user.as_ref() => {
							if send_frame(&relay_tx, SyncMsg::Update, &bytes).await.is_err() {
								break;
							}
						}
						Ok(_) => continue,
						Err(broadcast::error::RecvError::Lagged(_)) => continue,
						Err(broadcast::error::RecvError::Closed) => break,
					}
				}
				awareness = awareness_rx.recv() => {
					match awareness {
						Ok(frame) if frame.from.as_ref() != relay_user.as_ref() => {
							if send_frame(&relay_tx, SyncMsg::Awareness, &frame.payload).await.is_err() {
								break;
							}
						}
						Ok(_) => continue,
						Err(broadcast::error::RecvError::Lagged(_)) => continue,
						Err(broadcast::error::RecvError::Closed) => break,
					}
				}
			}
		}
	});

	while let Some(frame) = ws_rx.next().await {
		let frame = match frame {
			Ok(frame) => frame,
			Err(e) => {
				debug!(doc_id = %doc_id, error = %e, "CRDT socket error");
				break;
			}
		};
		match frame {
			Message::Close(close) => {
				if let Some(close) = close {
					if (4400..4500).contains(&close.code) {
						debug!(doc_id = %doc_id, code = close.code, "peer closed with a permanent error code");
					}
				}
				break;
			}
			Message::Ping(_) | Message::Pong(_) => continue,
			Message::Text(_) => {
				warn!(doc_id = %doc_id, "CRDTRelay expects binary frames, ignoring text frame");
				continue;
			}
			Message::Binary(data) => {
				if let Err(close_code) =
					handle_frame(&app, &room, tn_id, &doc_id, &user_id, &auth, &ws_tx, &data).await
				{
					let _ = close_with(&ws_tx, close_code).await;
					break;
				}
			}
		}
	}

	relay_task.abort();
	leave_room(tn_id, doc_id.clone()).await;
	info!(doc_id = %doc_id, user = %user_id, "CRDT connection closed");
}

/// Applies one incoming binary frame. Access is revalidated against the
/// connection's cached `AuthCtx` on every update frame (§4.4 revalidation
/// policy) rather than only once at upgrade time; a write attempt with a
/// read-only grant is refused here instead of being silently accepted.
async fn handle_frame(
	app: &App,
	room: &Arc<Room>,
	tn_id: TnId,
	doc_id: &str,
	user_id: &str,
	auth: &AuthCtx,
	ws_tx: &Arc<Mutex<SplitSink<WebSocket, Message>>>,
	data: &[u8],
) -> Result<(), u16> {
	if data.is_empty() {
		return Ok(());
	}
	let msg_type = SyncMsg::from_u8(data[0]).ok_or(CLOSE_DENIED)?;
	let payload = &data[1..];

	match msg_type {
		SyncMsg::Step1 => {
			// Client sent its state vector; reply with the diff it's missing
			// (§4.4 step 3: "the server responds with the diff").
			let sv = StateVector::decode_v1(payload).map_err(|_| CLOSE_DENIED)?;
			let diff = {
				let doc = room.doc.lock().await;
				let txn = doc.transact();
				txn.encode_state_as_update_v1(&sv)
			};
			send_frame(ws_tx, SyncMsg::Update, &diff).await.map_err(|_| CLOSE_AUTH)?;
			Ok(())
		}
		SyncMsg::Update => {
			if !auth.access.satisfies(Access::Write) {
				return Err(CLOSE_DENIED);
			}
			let update = Update::decode_v1(payload).map_err(|_| CLOSE_DENIED)?;
			{
				let doc = room.doc.lock().await;
				let mut txn = doc.transact_mut();
				txn.apply_update(update).map_err(|_| CLOSE_DENIED)?;
			}
			let stored = CrdtUpdate::with_client(payload.to_vec(), user_id);
			if let Err(e) = app.crdt_adapter.store_update(tn_id, doc_id, stored).await {
				warn!(doc_id = %doc_id, error = %e, "failed to persist CRDT update");
			}
			let _ = room.updates_tx.send((user_id.into(), payload.to_vec()));
			Ok(())
		}
		SyncMsg::Awareness => {
			let _ = room.awareness_tx.send(AwarenessFrame { from: user_id.into(), payload: payload.to_vec() });
			Ok(())
		}
	}
}

async fn send_frame(
	ws_tx: &Arc<Mutex<SplitSink<WebSocket, Message>>>,
	msg_type: SyncMsg,
	payload: &[u8],
) -> Result<(), axum::Error> {
	let mut frame = Vec::with_capacity(payload.len() + 1);
	frame.push(msg_type as u8);
	frame.extend_from_slice(payload);
	ws_tx.lock().await.send(Message::Binary(frame.into())).await
}

async fn close_with(ws_tx: &Arc<Mutex<SplitSink<WebSocket, Message>>>, code: u16) -> Result<(), axum::Error> {
	ws_tx.lock().await.send(Message::Close(Some(CloseFrame { code, reason: "".into() }))).await
}

// vim: ts=4
