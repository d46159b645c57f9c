//! Crate-wide error type and HTTP mapping.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::prelude::*;

pub type ClResult<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
	// E-AUTH-*
	AuthMissing,
	AuthExpired,
	AuthBadSignature,
	AuthUnknownKid,
	AuthWrongScope,

	// E-CORE-*
	NotFound,
	Conflict(String),
	Denied,
	UnknownIssuer,
	BadInput(String),

	// E-FED-*
	FedTransient(String),
	FedPermanent(String),

	// E-STORE-*
	StoreError(String),

	// Infrastructure
	DbError,
	Io(std::io::Error),
	Internal(String),
}

impl From<std::io::Error> for Error {
	fn from(err: std::io::Error) -> Self {
		warn!("io error: {}", err);
		Self::Io(err)
	}
}

impl std::fmt::Display for Error {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{:?}", self)
	}
}

impl std::error::Error for Error {}

#[derive(Serialize)]
struct ErrorBody {
	error: &'static str,
	message: String,
}

impl IntoResponse for Error {
	fn into_response(self) -> axum::response::Response {
		let (status, code, message): (StatusCode, &'static str, String) = match self {
			Error::AuthMissing => {
				(StatusCode::UNAUTHORIZED, "E-AUTH-MISSING", "authentication required".into())
			}
			Error::AuthExpired => {
				(StatusCode::UNAUTHORIZED, "E-AUTH-EXPIRED", "token expired".into())
			}
			Error::AuthBadSignature => {
				(StatusCode::UNAUTHORIZED, "E-AUTH-BADSIG", "invalid token signature".into())
			}
			Error::AuthUnknownKid => {
				(StatusCode::UNAUTHORIZED, "E-AUTH-UNKNOWNKID", "unknown signing key".into())
			}
			Error::AuthWrongScope => {
				(StatusCode::UNAUTHORIZED, "E-AUTH-SCOPE", "token does not cover this resource".into())
			}
			Error::NotFound => {
				(StatusCode::NOT_FOUND, "E-CORE-NOTFOUND", "resource not found".into())
			}
			Error::Conflict(msg) => (StatusCode::CONFLICT, "E-CORE-CONFLICT", msg),
			Error::Denied => {
				(StatusCode::FORBIDDEN, "E-CORE-DENIED", "permission denied".into())
			}
			Error::UnknownIssuer => {
				(StatusCode::FORBIDDEN, "E-CORE-UNKNOWN-ISSUER", "issuer not trusted".into())
			}
			Error::BadInput(msg) => (StatusCode::UNPROCESSABLE_ENTITY, "E-CORE-BADINPUT", msg),
			Error::FedTransient(msg) => {
				warn!("federation transient error: {}", msg);
				(StatusCode::BAD_GATEWAY, "E-FED-TRANSIENT", "peer temporarily unreachable".into())
			}
			Error::FedPermanent(msg) => {
				warn!("federation permanent error: {}", msg);
				(StatusCode::BAD_GATEWAY, "E-FED-PERMANENT", "peer rejected request".into())
			}
			Error::StoreError(msg) => {
				warn!("store error: {}", msg);
				(StatusCode::INTERNAL_SERVER_ERROR, "E-STORE-FAIL", "storage failure".into())
			}
			Error::DbError => {
				(StatusCode::INTERNAL_SERVER_ERROR, "E-STORE-DBERR", "storage failure".into())
			}
			Error::Internal(msg) => {
				warn!("internal error: {}", msg);
				(StatusCode::INTERNAL_SERVER_ERROR, "E-CORE-INTERNAL", "internal server error".into())
			}
			Error::Io(_) => {
				(StatusCode::INTERNAL_SERVER_ERROR, "E-STORE-IO", "internal server error".into())
			}
		};

		(status, Json(ErrorBody { error: code, message })).into_response()
	}
}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		warn!("json error: {}", err);
		Error::BadInput("malformed JSON".into())
	}
}

#[cfg(feature = "server")]
impl From<jsonwebtoken::errors::Error> for Error {
	fn from(err: jsonwebtoken::errors::Error) -> Self {
		warn!("jwt error: {}", err);
		use jsonwebtoken::errors::ErrorKind;
		match err.kind() {
			ErrorKind::ExpiredSignature => Error::AuthExpired,
			ErrorKind::InvalidSignature => Error::AuthBadSignature,
			_ => Error::AuthBadSignature,
		}
	}
}

impl From<axum::Error> for Error {
	fn from(err: axum::Error) -> Self {
		warn!("axum error: {}", err);
		Error::FedTransient("websocket/transport error".into())
	}
}

impl From<axum::http::Error> for Error {
	fn from(err: axum::http::Error) -> Self {
		warn!("http error: {}", err);
		Error::FedTransient("http error".into())
	}
}

#[cfg(feature = "server")]
impl From<hyper::Error> for Error {
	fn from(err: hyper::Error) -> Self {
		warn!("hyper error: {}", err);
		Error::FedTransient("http client error".into())
	}
}

#[cfg(feature = "server")]
impl From<hyper_util::client::legacy::Error> for Error {
	fn from(err: hyper_util::client::legacy::Error) -> Self {
		warn!("hyper client error: {}", err);
		Error::FedTransient("http client error".into())
	}
}

#[cfg(feature = "server")]
impl From<instant_acme::Error> for Error {
	fn from(err: instant_acme::Error) -> Self {
		warn!("acme error: {}", err);
		Error::Internal("ACME certificate error".into())
	}
}

#[cfg(feature = "server")]
impl From<pem::PemError> for Error {
	fn from(err: pem::PemError) -> Self {
		warn!("pem error: {}", err);
		Error::Internal("PEM parsing error".into())
	}
}

#[cfg(feature = "server")]
impl From<rustls::Error> for Error {
	fn from(err: rustls::Error) -> Self {
		warn!("rustls error: {}", err);
		Error::Internal("TLS error".into())
	}
}

#[cfg(feature = "server")]
impl From<rustls_pki_types::pem::Error> for Error {
	fn from(err: rustls_pki_types::pem::Error) -> Self {
		warn!("pem error: {}", err);
		Error::Internal("PEM parsing error".into())
	}
}

#[cfg(feature = "server")]
impl From<x509_parser::asn1_rs::Err<x509_parser::error::X509Error>> for Error {
	fn from(err: x509_parser::asn1_rs::Err<x509_parser::error::X509Error>) -> Self {
		warn!("x509 error: {}", err);
		Error::Internal("X.509 certificate error".into())
	}
}

impl From<std::num::ParseIntError> for Error {
	fn from(err: std::num::ParseIntError) -> Self {
		warn!("parse int error: {}", err);
		Error::BadInput("invalid integer".into())
	}
}

impl From<std::time::SystemTimeError> for Error {
	fn from(err: std::time::SystemTimeError) -> Self {
		warn!("system time error: {}", err);
		Error::Internal("system clock error".into())
	}
}

impl From<tokio::task::JoinError> for Error {
	fn from(err: tokio::task::JoinError) -> Self {
		warn!("tokio join error: {}", err);
		Error::Internal("task execution failed".into())
	}
}

/// Locks a mutex, converting poisoning into `Error::Internal` with optional context.
#[macro_export]
macro_rules! lock {
	($mutex:expr) => {
		$mutex.lock().map_err(|_| $crate::error::Error::Internal("mutex poisoned".into()))
	};
	($mutex:expr, $context:expr) => {
		$mutex
			.lock()
			.map_err(|_| $crate::error::Error::Internal(format!("mutex poisoned: {}", $context)))
	};
}

// vim: ts=4
