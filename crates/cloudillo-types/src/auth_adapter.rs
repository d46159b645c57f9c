//! `AuthStore`: the facade that owns sensitive, per-tenant authentication and
//! authorization state (§4.5, §4.1) - tenant identity, the four token kinds,
//! certificates, WebAuthn credentials, and VAPID push keys.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::fmt::Debug;

use crate::{
	prelude::*,
	types::{serialize_timestamp_iso, serialize_timestamp_iso_opt, Access},
};

pub const ACCESS_TOKEN_EXPIRY: i64 = 3600;

/// Browser-session capability for one `{resourceId, accessLevel}` pair (§4.1).
#[skip_serializing_none]
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AccessToken<S> {
	/// Issuer - local idTag.
	pub t: S,
	/// The authenticated user's idTag.
	pub u: S,
	/// Roles granted to the session.
	pub r: Option<Vec<S>>,
	/// Resource id the token is scoped to.
	pub res: Option<S>,
	/// Access level granted for `res`.
	pub acc: Option<Access>,
	pub sub: Option<S>,
	pub exp: Timestamp,
}

/// Outbound-call capability minted to act as the local tenant toward a peer (§4.1, §4.3).
#[skip_serializing_none]
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ProxyToken<S> {
	/// Issuer - local idTag.
	pub t: S,
	/// The authenticated local user on whose behalf the call is made.
	pub u: S,
	/// Target peer idTag (the audience).
	pub p: S,
	pub exp: Timestamp,
}

/// Anonymous/guest capability distributed by URL (§4.1, §4.5 Refs).
#[skip_serializing_none]
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RefToken<S> {
	pub res: S,
	pub acc: Access,
	pub quota: Option<u32>,
	pub exp: Option<Timestamp>,
}

/// Represents a profile signing key
#[skip_serializing_none]
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthKey {
	#[serde(rename = "keyId")]
	pub key_id: Box<str>,
	#[serde(rename = "publicKey")]
	pub public_key: Box<str>,
	#[serde(rename = "expiresAt", serialize_with = "serialize_timestamp_iso_opt")]
	pub expires_at: Option<Timestamp>,
}

/// Represents an auth profile
#[skip_serializing_none]
#[derive(Debug, Deserialize, Serialize)]
pub struct AuthProfile {
	pub id_tag: Box<str>,
	pub roles: Option<Box<[Box<str>]>>,
	pub keys: Vec<AuthKey>,
}

/// Context struct for an authenticated user, attached to every request/connection.
#[derive(Clone, Debug)]
pub struct AuthCtx {
	pub tn_id: TnId,
	pub id_tag: Box<str>,
	pub roles: Box<[Box<str>]>,
	pub resource: Option<Box<str>>,
	pub access: Access,
}

impl AuthCtx {
	/// Checks this context's access level against a route's required level (§4.7).
	pub fn check(&self, required: Access) -> ClResult<()> {
		if self.access.satisfies(required) {
			Ok(())
		} else {
			Err(Error::Denied)
		}
	}
}

#[derive(Debug)]
pub struct AuthLogin {
	pub tn_id: TnId,
	pub id_tag: Box<str>,
	pub roles: Option<Box<[Box<str>]>>,
	pub token: Box<str>,
}

/// A private/public key pair (profile signing keys, VAPID keys).
#[derive(Debug)]
pub struct KeyPair {
	pub private_key: Box<str>,
	pub public_key: Box<str>,
}

#[derive(Debug, Clone)]
pub struct WebauthnCredential {
	pub credential_id: Box<str>,
	pub counter: u32,
	pub public_key: Box<str>,
	pub description: Option<Box<str>>,
}

/// Data needed to create a new tenant (bootstrap or `/register`).
#[derive(Debug)]
pub struct CreateTenantData<'a> {
	pub vfy_code: Option<&'a str>,
	pub email: Option<&'a str>,
	pub password: Option<&'a str>,
	pub roles: Option<&'a [&'a str]>,
}

/// Tenant list item from the auth store (admin use).
#[skip_serializing_none]
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantListItem {
	pub tn_id: TnId,
	pub id_tag: Box<str>,
	pub email: Option<Box<str>>,
	pub roles: Option<Box<[Box<str>]>>,
	pub status: Option<Box<str>>,
	#[serde(serialize_with = "serialize_timestamp_iso")]
	pub created_at: Timestamp,
}

#[derive(Debug, Default)]
pub struct ListTenantsOptions<'a> {
	pub status: Option<&'a str>,
	pub q: Option<&'a str>,
	pub limit: Option<u32>,
	pub offset: Option<u32>,
}

/// A TLS certificate for a tenant's domain, renewed by the worker via ACME (§4.1, §4.6).
#[derive(Debug)]
pub struct CertData {
	pub tn_id: TnId,
	pub id_tag: Box<str>,
	pub domain: Box<str>,
	pub cert: Box<str>,
	pub key: Box<str>,
	pub expires_at: Timestamp,
}

/// A pending ACME HTTP-01 challenge response, served at
/// `/.well-known/acme-challenge/{token}`.
#[derive(Debug)]
pub struct AcmeChallenge {
	pub token: Box<str>,
	pub key_authorization: Box<str>,
}

/// A `Cloudillo` auth store.
///
/// Every `AuthStore` implementation is required to implement this trait. It is
/// the exclusive owner of sensitive per-tenant state: passwords, WebAuthn
/// credentials, signing keys, and certificates.
#[async_trait]
pub trait AuthStore: Debug + Send + Sync {
	// Tenant resolution and identity
	//********************************
	async fn read_id_tag(&self, tn_id: TnId) -> ClResult<Box<str>>;
	async fn read_tn_id(&self, id_tag: &str) -> ClResult<TnId>;
	async fn read_tenant(&self, id_tag: &str) -> ClResult<AuthProfile>;
	async fn create_tenant_registration(&self, email: &str) -> ClResult<()>;
	async fn create_tenant(&self, id_tag: &str, data: CreateTenantData<'_>) -> ClResult<TnId>;
	async fn delete_tenant(&self, id_tag: &str) -> ClResult<()>;
	async fn list_tenants(&self, opts: &ListTenantsOptions<'_>) -> ClResult<Vec<TenantListItem>>;

	// Password management
	//*********************
	async fn create_tenant_login(&self, id_tag: &str) -> ClResult<AuthLogin>;
	async fn check_tenant_password(&self, id_tag: &str, password: &str) -> ClResult<AuthLogin>;
	async fn update_tenant_password(&self, id_tag: &str, password: &str) -> ClResult<()>;

	// Certificate management (§4.1 Certificate lifecycle)
	//*****************************************************
	async fn create_cert(&self, cert_data: &CertData) -> ClResult<()>;
	async fn read_cert_by_tn_id(&self, tn_id: TnId) -> ClResult<CertData>;
	async fn read_cert_by_id_tag(&self, id_tag: &str) -> ClResult<CertData>;
	async fn read_cert_by_domain(&self, domain: &str) -> ClResult<CertData>;
	async fn list_all_certs(&self) -> ClResult<Vec<CertData>>;
	async fn list_tenants_needing_cert_renewal(
		&self,
		renewal_days: u32,
	) -> ClResult<Vec<(TnId, Box<str>)>>;
	async fn store_acme_challenge(&self, challenge: &AcmeChallenge) -> ClResult<()>;
	async fn read_acme_challenge(&self, token: &str) -> ClResult<Option<Box<str>>>;
	async fn clear_acme_challenge(&self, token: &str) -> ClResult<()>;

	// Signing key management
	//************************
	async fn list_profile_keys(&self, tn_id: TnId) -> ClResult<Vec<AuthKey>>;
	async fn read_profile_key(&self, tn_id: TnId, key_id: &str) -> ClResult<AuthKey>;
	async fn create_profile_key(
		&self,
		tn_id: TnId,
		expires_at: Option<Timestamp>,
	) -> ClResult<AuthKey>;

	// Token issuance and verification (§4.1 Token kinds)
	//****************************************************
	async fn issue_access_token(&self, tn_id: TnId, data: &AccessToken<&str>) -> ClResult<Box<str>>;
	async fn verify_access_token(&self, tn_id: TnId, token: &str) -> ClResult<AuthCtx>;
	async fn issue_proxy_token(&self, tn_id: TnId, data: &ProxyToken<&str>) -> ClResult<Box<str>>;
	async fn verify_proxy_token(&self, token: &str) -> ClResult<ProxyToken<Box<str>>>;
	async fn issue_ref_token(&self, tn_id: TnId, data: &RefToken<&str>) -> ClResult<Box<str>>;
	async fn verify_ref_token(&self, token: &str) -> ClResult<RefToken<Box<str>>>;

	/// Signs an outbound action token with the tenant's current profile key
	/// (§4.2, §9 wire format). `unsigned.kid`/`unsigned.sig` are ignored and
	/// overwritten; the adapter fills them from its held private key.
	async fn sign_action_token(
		&self,
		tn_id: TnId,
		unsigned: &crate::action_types::ActionTokenPayload,
	) -> ClResult<Box<str>>;

	// Vapid keys (push subscription support, §10.5)
	//************************************************
	async fn read_vapid_key(&self, tn_id: TnId) -> ClResult<KeyPair>;
	async fn read_vapid_public_key(&self, tn_id: TnId) -> ClResult<Box<str>>;
	async fn create_vapid_key(&self, tn_id: TnId) -> ClResult<KeyPair>;

	// Variables
	//**********
	async fn read_var(&self, tn_id: TnId, var: &str) -> ClResult<Box<str>>;
	async fn update_var(&self, tn_id: TnId, var: &str, value: &str) -> ClResult<()>;

	// WebAuthn credential management (§10.5)
	//****************************************
	async fn list_webauthn_credentials(&self, tn_id: TnId) -> ClResult<Vec<WebauthnCredential>>;
	async fn read_webauthn_credential(
		&self,
		tn_id: TnId,
		credential_id: &str,
	) -> ClResult<WebauthnCredential>;
	async fn create_webauthn_credential(
		&self,
		tn_id: TnId,
		data: &WebauthnCredential,
	) -> ClResult<()>;
	async fn update_webauthn_credential_counter(
		&self,
		tn_id: TnId,
		credential_id: &str,
		counter: u32,
	) -> ClResult<()>;
	async fn delete_webauthn_credential(&self, tn_id: TnId, credential_id: &str) -> ClResult<()>;

	async fn cleanup_expired_verification_codes(&self) -> ClResult<u32>;
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn access_token_carries_resource_scope() {
		let token: AccessToken<&str> = AccessToken {
			t: "alice.example.com",
			u: "alice.example.com",
			r: None,
			res: Some("docX"),
			acc: Some(Access::Read),
			sub: None,
			exp: Timestamp::now(),
		};

		assert_eq!(token.res, Some("docX"));
		assert_eq!(token.acc, Some(Access::Read));
	}

	#[test]
	fn auth_ctx_check_rejects_insufficient_access() {
		let ctx = AuthCtx {
			tn_id: TnId(1),
			id_tag: "alice.example.com".into(),
			roles: Box::new([]),
			resource: Some("docX".into()),
			access: Access::Read,
		};

		assert!(ctx.check(Access::Read).is_ok());
		assert!(matches!(ctx.check(Access::Write), Err(Error::Denied)));
	}
}

// vim: ts=4
