//! Periodic cleanup of expired auth verification codes.

use async_trait::async_trait;
use cloudillo_core::scheduler::{Task, TaskId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::prelude::*;

/// Scheduled daily; removes verification codes past their expiry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthCleanupTask;

#[async_trait]
impl Task<App> for AuthCleanupTask {
	fn kind() -> &'static str {
		"auth.cleanup"
	}

	fn kind_of(&self) -> &'static str {
		Self::kind()
	}

	fn build(_id: TaskId, _context: &str) -> ClResult<Arc<dyn Task<App>>> {
		Ok(Arc::new(AuthCleanupTask))
	}

	fn serialize(&self) -> String {
		String::new()
	}

	async fn run(&self, app: &App) -> ClResult<()> {
		let count = app.auth_adapter.cleanup_expired_verification_codes().await?;
		if count > 0 {
			info!("cleaned up {count} expired verification codes");
		}
		Ok(())
	}
}

// vim: ts=4
