//! CRDTRelay sub-plane: per-document collaborative editing rooms over
//! WebSocket, using the Yjs sync protocol (§4.4).

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

mod prelude;
pub mod websocket;

pub use websocket::{crdt_ws_handler, handle_crdt_connection, CrdtQuery, CLOSE_AUTH, CLOSE_DENIED, CLOSE_NOT_FOUND};

// vim: ts=4
