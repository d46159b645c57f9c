//! Outbound HTTP client for federation calls to peer instances (§4.3
//! FederationClient): action delivery, profile sync, attachment fetch.
//!
//! idTags are DNS-routable - the tag itself doubles as the peer's base
//! domain, so a call to `bob.example.com` hits `https://bob.example.com`.

use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::Request as HyperRequest;
use hyper_rustls::HttpsConnectorBuilder;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

use crate::prelude::*;

const REQUEST_TIMEOUT_SECS: u64 = 10;
const MAX_RETRIES: u32 = 3;
const RETRY_BASE_DELAY_MS: u64 = 200;

type HttpsClient = Client<
	hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>,
	Full<Bytes>,
>;

/// Thin wrapper around a pooled HTTPS client, shared across the server.
#[derive(Clone)]
pub struct Request {
	client: HttpsClient,
}

impl Request {
	pub fn new() -> Self {
		let https = HttpsConnectorBuilder::new()
			.with_webpki_roots()
			.https_only()
			.enable_http1()
			.enable_http2()
			.build();
		let client = Client::builder(TokioExecutor::new()).build(https);
		Self { client }
	}

	/// POST a JSON body to a peer's route, retrying transient failures with
	/// bounded backoff (§4.3 "timeout+retry+backoff").
	pub async fn post<T: DeserializeOwned>(
		&self,
		_tn_id: TnId,
		target_id_tag: &str,
		path: &str,
		body: &impl Serialize,
	) -> ClResult<T> {
		let payload = serde_json::to_vec(body)?;
		self.send_with_retry(target_id_tag, path, "POST", Some(payload)).await
	}

	/// GET a JSON resource from a peer's route.
	pub async fn get<T: DeserializeOwned>(&self, target_id_tag: &str, path: &str) -> ClResult<T> {
		self.send_with_retry(target_id_tag, path, "GET", None).await
	}

	/// GET a raw attachment blob from a peer instance.
	pub async fn fetch_attachment(&self, target_id_tag: &str, file_id: &str) -> ClResult<Vec<u8>> {
		let url = format!("https://{}/api/file/{}", target_id_tag, file_id);
		let resp = self.execute(&url, "GET", None).await?;
		Ok(resp.to_vec())
	}

	async fn send_with_retry<T: DeserializeOwned>(
		&self,
		target_id_tag: &str,
		path: &str,
		method: &str,
		body: Option<Vec<u8>>,
	) -> ClResult<T> {
		let url = format!("https://{}{}", target_id_tag, path);
		let mut last_err = Error::FedTransient("no attempt made".into());

		for attempt in 0..MAX_RETRIES {
			match self.execute(&url, method, body.clone()).await {
				Ok(bytes) => return Ok(serde_json::from_slice(&bytes)?),
				Err(Error::FedPermanent(msg)) => {
					// A 4xx from the peer won't improve on retry.
					return Err(Error::FedPermanent(msg));
				}
				Err(e) => {
					last_err = e;
					let delay = RETRY_BASE_DELAY_MS * 2u64.pow(attempt);
					tokio::time::sleep(Duration::from_millis(delay)).await;
				}
			}
		}
		warn!("federation request to {} exhausted retries: {}", target_id_tag, last_err);
		Err(last_err)
	}

	async fn execute(&self, url: &str, method: &str, body: Option<Vec<u8>>) -> ClResult<Bytes> {
		let body_bytes = body.unwrap_or_default();
		let req = HyperRequest::builder()
			.method(method)
			.uri(url)
			.header("content-type", "application/json")
			.body(Full::new(Bytes::from(body_bytes)))
			.map_err(|e| Error::FedPermanent(format!("bad request: {}", e)))?;

		let fut = self.client.request(req);
		let resp = tokio::time::timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS), fut)
			.await
			.map_err(|_| Error::FedTransient(format!("timeout calling {}", url)))?
			.map_err(|e| Error::FedTransient(format!("{}", e)))?;

		let status = resp.status();
		let bytes = resp
			.into_body()
			.collect()
			.await
			.map_err(|e| Error::FedTransient(format!("{}", e)))?
			.to_bytes();

		if status.is_server_error() || status == hyper::StatusCode::TOO_MANY_REQUESTS {
			return Err(Error::FedTransient(format!("{} returned {}", url, status)));
		}
		if status.is_client_error() {
			return Err(Error::FedPermanent(format!("{} returned {}", url, status)));
		}
		Ok(bytes)
	}
}

impl Default for Request {
	fn default() -> Self {
		Self::new()
	}
}

impl std::fmt::Debug for Request {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Request").finish_non_exhaustive()
	}
}

// vim: ts=4
