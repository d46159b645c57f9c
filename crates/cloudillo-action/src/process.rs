//! Inbound action-token verification: signature, freshness, and issuer
//! trust (§4.2 step 1-3).

use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::OnceLock;

use cloudillo_types::action_types::ActionTokenPayload;
use cloudillo_types::auth_adapter::AuthKey;

use crate::key_cache::KeyFetchCache;
use crate::prelude::*;

const KEY_CACHE_CAPACITY: usize = 256;

/// Caches public keys fetched from peer instances, keyed by `(issuer, kid)`.
/// Separate from `KeyFetchCache`, which only remembers *failed* lookups.
pub struct IssuerKeyCache {
	keys: parking_lot::RwLock<LruCache<(Box<str>, Box<str>), Box<str>>>,
}

impl IssuerKeyCache {
	pub fn new() -> Self {
		let capacity = NonZeroUsize::new(KEY_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN);
		Self { keys: parking_lot::RwLock::new(LruCache::new(capacity)) }
	}

	fn get(&self, issuer: &str, kid: &str) -> Option<Box<str>> {
		self.keys.write().get(&(issuer.into(), kid.into())).cloned()
	}

	fn put(&self, issuer: &str, kid: &str, public_key: Box<str>) {
		self.keys.write().put((issuer.into(), kid.into()), public_key);
	}
}

impl Default for IssuerKeyCache {
	fn default() -> Self {
		Self::new()
	}
}

/// Response shape of a peer's `/api/me` (profile + current signing keys).
#[derive(Debug, serde::Deserialize)]
struct RemoteProfile {
	#[serde(default)]
	keys: Vec<AuthKey>,
}

/// Resolves the public key for `(issuer, kid)`: local tenant's own key store
/// first, then the issuer's local-adapter cache, then a live federation
/// fetch of the issuer's profile (§4.3 `syncProfile`).
async fn resolve_issuer_key(
	app: &App,
	key_cache: &IssuerKeyCache,
	failure_cache: &KeyFetchCache,
	issuer: &str,
	kid: &str,
) -> ClResult<Box<str>> {
	if let Some(key) = key_cache.get(issuer, kid) {
		return Ok(key);
	}

	if let Some(failure) = failure_cache.check_failure(issuer, kid) {
		return Err(Error::FedTransient(format!(
			"key fetch for {}:{} on cooldown, retry in {}s",
			issuer,
			kid,
			failure.seconds_until_retry()
		)));
	}

	// Local tenant? The adapter already holds the key, no network round trip.
	if let Ok(tn_id) = app.auth_adapter.read_tn_id(issuer).await {
		if let Ok(key) = app.auth_adapter.read_profile_key(tn_id, kid).await {
			key_cache.put(issuer, kid, key.public_key.clone());
			return Ok(key.public_key);
		}
	}

	match app.request.get::<RemoteProfile>(issuer, "/api/me").await {
		Ok(profile) => {
			let Some(key) = profile.keys.into_iter().find(|k| k.key_id.as_ref() == kid) else {
				failure_cache.record_failure(issuer, kid, &Error::NotFound);
				return Err(Error::AuthUnknownKid);
			};
			key_cache.put(issuer, kid, key.public_key.clone());
			Ok(key.public_key)
		}
		Err(e) => {
			failure_cache.record_failure(issuer, kid, &e);
			Err(e)
		}
	}
}

/// Verifies a raw action-token string against its issuer's public key,
/// returning the decoded payload on success. Does not check schema or
/// issuer trust policy (`allowUnknown`) - callers apply those next.
///
/// Matches `cloudillo_core::ActionVerifyFn`'s shape so it can be registered
/// as an extension for the auth crate's token-exchange flow; `_tn_id` and
/// `_remote_ip` are unused here (verification is issuer-scoped, not
/// tenant-scoped) but kept so the signatures line up exactly.
pub async fn verify_action_token(
	app: &App,
	_tn_id: TnId,
	token: &str,
	_remote_ip: Option<&std::net::IpAddr>,
) -> ClResult<ActionTokenPayload> {
	let key_cache = issuer_key_cache();
	let failure_cache = key_fetch_cache();
	let unverified = cloudillo_types::utils::decode_jwt_no_verify::<ActionTokenPayload>(token)?;
	let public_key =
		resolve_issuer_key(app, key_cache, failure_cache, &unverified.iss, &unverified.kid).await?;

	let decoding_key = DecodingKey::from_ec_pem(public_key.as_bytes())
		.map_err(|_| Error::AuthBadSignature)?;
	let mut validation = Validation::new(Algorithm::ES384);
	validation.validate_exp = false; // exp is action-specific, checked by the caller against `now`
	validation.required_spec_claims.clear();

	let data = jsonwebtoken::decode::<ActionTokenPayload>(token, &decoding_key, &validation)
		.map_err(|_| Error::AuthBadSignature)?;

	if let Some(exp) = data.claims.exp {
		if exp < Timestamp::now().0 {
			return Err(Error::AuthExpired);
		}
	}

	Ok(data.claims)
}

/// Process-wide issuer public-key cache, lazily built on first verification.
fn issuer_key_cache() -> &'static IssuerKeyCache {
	static CACHE: OnceLock<IssuerKeyCache> = OnceLock::new();
	CACHE.get_or_init(IssuerKeyCache::new)
}

/// Process-wide key-fetch failure cache, shared with federation delivery
/// so a dead peer's cooldown applies to both inbound verification and
/// outbound key lookups.
pub fn key_fetch_cache() -> &'static KeyFetchCache {
	static CACHE: OnceLock<KeyFetchCache> = OnceLock::new();
	CACHE.get_or_init(KeyFetchCache::default)
}

// vim: ts=4
