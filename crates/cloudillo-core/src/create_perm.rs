//! Collection-level permission middleware for CREATE operations.
//!
//! A CREATE targets a resource that doesn't exist yet, so there's nothing to
//! look up an access grant against; the check instead falls back to the
//! caller's own `Access` level on their own tenant space (§4.7).

use axum::{
	extract::{Request, State},
	middleware::Next,
	response::Response,
};

use crate::{app::App, extract::Auth, middleware::PermissionCheckOutput};
use cloudillo_types::types::Access;
use cloudillo_types::prelude::*;

/// Middleware factory for collection permission checks.
///
/// Returns a middleware function that rejects the request unless the caller
/// holds at least `required` access. `resource_type` and `action` are carried
/// only for the warn-log, to identify which route denied the request.
pub fn check_perm_create(
	resource_type: &'static str,
	action: &'static str,
	required: Access,
) -> impl Fn(State<App>, Auth, Request, Next) -> PermissionCheckOutput + Clone {
	move |state, auth, req, next| {
		Box::pin(check_create_permission(state, auth, req, next, resource_type, action, required))
	}
}

async fn check_create_permission(
	State(_app): State<App>,
	Auth(auth_ctx): Auth,
	req: Request,
	next: Next,
	resource_type: &str,
	action: &str,
	required: Access,
) -> Result<Response, Error> {
	if let Err(err) = auth_ctx.check(required) {
		warn!(
			subject = %auth_ctx.id_tag,
			resource_type = resource_type,
			action = action,
			access = %auth_ctx.access,
			required = %required,
			"CREATE permission denied"
		);
		return Err(err);
	}

	Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
	use super::*;
	use cloudillo_types::auth_adapter::AuthCtx;

	fn ctx(access: Access) -> AuthCtx {
		AuthCtx { tn_id: TnId(1), id_tag: "alice.example.com".into(), roles: Box::new([]), resource: None, access }
	}

	#[test]
	fn write_access_satisfies_create_requiring_write() {
		assert!(ctx(Access::Write).check(Access::Write).is_ok());
		assert!(ctx(Access::Admin).check(Access::Write).is_ok());
	}

	#[test]
	fn read_access_is_rejected_for_create_requiring_write() {
		assert!(ctx(Access::Read).check(Access::Write).is_err());
	}
}

// vim: ts=4
