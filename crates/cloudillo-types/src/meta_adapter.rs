//! `MetaStore`: the facade for everything that isn't a secret or a blob -
//! tenants, profiles, actions, file metadata, refs, settings, tags, push
//! subscriptions, and the task-scheduler's persistence (§4.5, §3).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::collections::HashMap;
use std::fmt::Debug;

use crate::{
	action_types::ActionKind,
	prelude::*,
	types::Patch,
};

// Profiles
//**********

/// Profile status (§3): `T`=trusted-local, `A`=active-remote, `F`=follower,
/// `C`=connected, `M`=muted, `B`=blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProfileStatus {
	#[serde(rename = "T")]
	TrustedLocal,
	#[serde(rename = "A")]
	ActiveRemote,
	#[serde(rename = "F")]
	Follower,
	#[serde(rename = "C")]
	Connected,
	#[serde(rename = "M")]
	Muted,
	#[serde(rename = "B")]
	Blocked,
}

impl ProfileStatus {
	pub fn as_char(self) -> char {
		match self {
			ProfileStatus::TrustedLocal => 'T',
			ProfileStatus::ActiveRemote => 'A',
			ProfileStatus::Follower => 'F',
			ProfileStatus::Connected => 'C',
			ProfileStatus::Muted => 'M',
			ProfileStatus::Blocked => 'B',
		}
	}
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
	pub id_tag: Box<str>,
	pub name: Option<Box<str>>,
	pub profile_pic: Option<Box<str>>,
	pub status: ProfileStatus,
	pub following: bool,
	pub connected: bool,
	/// Cache-validation tag for remote profiles; `None` for local tenants.
	pub e_tag: Option<Box<str>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateProfileData {
	#[serde(default)]
	pub status: Patch<ProfileStatus>,
	#[serde(default)]
	pub following: Patch<bool>,
	#[serde(default)]
	pub connected: Patch<bool>,
	#[serde(default)]
	pub e_tag: Patch<Box<str>>,
}

#[derive(Debug, Default)]
pub struct ListProfileOptions<'a> {
	pub status: Option<&'a [ProfileStatus]>,
	pub connected: Option<bool>,
	pub following: Option<bool>,
	pub q: Option<&'a str>,
}

// Actions
//*********

#[derive(Debug, Clone)]
pub struct Action<S: AsRef<str>> {
	pub action_id: S,
	pub typ: ActionKind,
	pub sub_typ: Option<S>,
	pub issuer_tag: S,
	pub parent_id: Option<S>,
	pub root_id: Option<S>,
	pub audience_tag: Option<S>,
	pub subject: Option<S>,
	pub token: S,
	pub status: char,
	pub created_at: Timestamp,
	pub expires_at: Option<Timestamp>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateActionDataOptions {
	pub subject: Option<Box<str>>,
	pub status: Option<char>,
}

fn deserialize_split<'de, D>(deserializer: D) -> Result<Option<Vec<Box<str>>>, D::Error>
where
	D: serde::Deserializer<'de>,
{
	let s = String::deserialize(deserializer)?;
	Ok(Some(s.split(',').map(|v| v.trim().into()).collect()))
}

fn deserialize_split_chars<'de, D>(deserializer: D) -> Result<Option<Vec<char>>, D::Error>
where
	D: serde::Deserializer<'de>,
{
	let s = String::deserialize(deserializer)?;
	Ok(Some(s.split(',').filter_map(|v| v.trim().chars().next()).collect()))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListActionOptions {
	#[serde(default, rename = "type", deserialize_with = "deserialize_split")]
	pub typ: Option<Vec<Box<str>>>,
	#[serde(default, deserialize_with = "deserialize_split_chars")]
	pub status: Option<Vec<char>>,
	pub issuer: Option<Box<str>>,
	pub audience: Option<Box<str>>,
	#[serde(rename = "parentId")]
	pub parent_id: Option<Box<str>>,
	#[serde(rename = "rootId")]
	pub root_id: Option<Box<str>>,
	pub subject: Option<Box<str>>,
	pub cursor: Option<Box<str>>,
	pub limit: Option<u32>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
pub struct ActionView {
	#[serde(rename = "actionId")]
	pub action_id: Box<str>,
	#[serde(rename = "type")]
	pub typ: Box<str>,
	#[serde(rename = "subType")]
	pub sub_typ: Option<Box<str>>,
	#[serde(rename = "parentId")]
	pub parent_id: Option<Box<str>>,
	#[serde(rename = "rootId")]
	pub root_id: Option<Box<str>>,
	pub issuer: Box<str>,
	pub audience: Option<Box<str>>,
	pub subject: Option<Box<str>>,
	#[serde(rename = "createdAt")]
	pub created_at: Timestamp,
	#[serde(rename = "expiresAt")]
	pub expires_at: Option<Timestamp>,
	pub status: char,
}

// Files
//*******

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum FileStatus {
	#[serde(rename = "I")]
	Immutable,
	#[serde(rename = "M")]
	Mutable,
	#[serde(rename = "P")]
	Pending,
	#[serde(rename = "D")]
	Deleted,
}

/// File kind, distinguishing a plain content-addressed blob from a live
/// CRDT document or RTDB database file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum FileTp {
	Blob,
	Crdt,
	Rtdb,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
pub struct FileView {
	#[serde(rename = "fileId")]
	pub file_id: Box<str>,
	pub owner_tag: Box<str>,
	#[serde(rename = "contentType")]
	pub content_type: Option<Box<str>>,
	#[serde(rename = "fileName")]
	pub file_name: Box<str>,
	#[serde(rename = "createdAt")]
	pub created_at: Timestamp,
	pub status: FileStatus,
	pub file_tp: FileTp,
	pub tags: Vec<Box<str>>,
}

#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
pub struct FileVariant {
	pub variant: Box<str>,
	pub format: Box<str>,
	pub size: u64,
	pub resolution: Option<(u32, u32)>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListFileOptions {
	pub tag: Option<Box<str>>,
	pub file_tp: Option<FileTp>,
	pub status: Option<FileStatus>,
	pub cursor: Option<Box<str>>,
	pub limit: Option<u32>,
	/// Include per-user overlay data (e.g. read/seen flags) in the response.
	pub with_user_data: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateFileOptions {
	#[serde(default, rename = "fileName")]
	pub file_name: Patch<String>,
	#[serde(default, rename = "contentType")]
	pub content_type: Patch<String>,
	#[serde(default)]
	pub status: Patch<FileStatus>,
}

#[derive(Debug, Clone, Default)]
pub struct CreateFile {
	pub file_id: Box<str>,
	pub owner_tag: Box<str>,
	pub content_type: Box<str>,
	pub file_name: Box<str>,
	pub file_tp: Option<FileTp>,
	pub tags: Vec<Box<str>>,
}

// Refs (capability links, §3, §10.5)
//*************************************

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
pub struct RefData {
	#[serde(rename = "refId")]
	pub ref_id: Box<str>,
	pub resource_id: Box<str>,
	pub access: crate::types::Access,
	#[serde(rename = "createdAt")]
	pub created_at: Timestamp,
	#[serde(rename = "expiresAt")]
	pub expires_at: Option<Timestamp>,
	pub quota: Option<u32>,
	pub uses: u32,
}

pub struct CreateRefOptions {
	pub resource_id: Box<str>,
	pub access: crate::types::Access,
	pub expires_at: Option<Timestamp>,
	pub quota: Option<u32>,
}

// Push subscriptions (§10.5)
//*****************************

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PushSubscription {
	pub sub_id: Box<str>,
	pub endpoint: Box<str>,
	pub p256dh: Box<str>,
	pub auth: Box<str>,
	pub created_at: Timestamp,
}

// Tasks (scheduler persistence, §4.6)
//**************************************

pub struct Task {
	pub task_id: u64,
	pub kind: Box<str>,
	pub status: char,
	pub created_at: Timestamp,
	pub next_at: Option<Timestamp>,
	pub input: Box<str>,
	pub deps: Box<[u64]>,
	pub retry: Option<Box<str>>,
	pub cron: Option<Box<str>>,
}

#[derive(Debug, Default)]
pub struct ListTaskOptions {
	pub status: Option<char>,
	pub since: Option<Timestamp>,
}

#[derive(Debug, Default)]
pub struct TaskPatch {
	pub input: Patch<String>,
	pub next_at: Patch<Timestamp>,
	pub deps: Patch<Box<[u64]>>,
	pub retry: Patch<String>,
	pub cron: Patch<String>,
}

#[async_trait]
pub trait MetaAdapter: Debug + Send + Sync {
	// Tenant and profile management
	//********************************
	async fn create_tenant(&self, tn_id: TnId, id_tag: &str) -> ClResult<()>;
	async fn delete_tenant(&self, tn_id: TnId) -> ClResult<()>;

	async fn list_profiles(&self, tn_id: TnId, opts: &ListProfileOptions<'_>) -> ClResult<Vec<Profile>>;
	async fn read_profile(&self, tn_id: TnId, id_tag: &str) -> ClResult<Profile>;
	async fn create_profile(&self, tn_id: TnId, profile: &Profile) -> ClResult<()>;
	async fn update_profile(
		&self,
		tn_id: TnId,
		id_tag: &str,
		patch: &UpdateProfileData,
	) -> ClResult<()>;
	async fn read_profile_public_key(&self, id_tag: &str, key_id: &str) -> ClResult<(Box<str>, Timestamp)>;
	async fn add_profile_public_key(&self, id_tag: &str, key_id: &str, public_key: &str) -> ClResult<()>;

	// Action management (§4.2)
	//***************************
	async fn list_actions(&self, tn_id: TnId, opts: &ListActionOptions) -> ClResult<Vec<ActionView>>;
	async fn get_action(&self, tn_id: TnId, action_id: &str) -> ClResult<Option<ActionView>>;
	async fn get_action_by_key(&self, tn_id: TnId, key: &str) -> ClResult<Option<Action<Box<str>>>>;
	async fn get_action_token(&self, tn_id: TnId, action_id: &str) -> ClResult<Option<Box<str>>>;
	async fn create_action(&self, tn_id: TnId, action: &Action<&str>, key: Option<&str>) -> ClResult<()>;
	async fn get_action_root_id(&self, tn_id: TnId, action_id: &str) -> ClResult<Option<Box<str>>>;
	async fn update_action_data(&self, tn_id: TnId, action_id: &str, opts: &UpdateActionDataOptions) -> ClResult<()>;
	async fn update_action_status(&self, tn_id: TnId, action_id: &str, status: char) -> ClResult<()>;

	// File management
	//*****************
	async fn list_files(&self, tn_id: TnId, opts: &ListFileOptions) -> ClResult<Vec<FileView>>;
	async fn read_file(&self, tn_id: TnId, file_id: &str) -> ClResult<Option<FileView>>;
	async fn create_file(&self, tn_id: TnId, file: &CreateFile) -> ClResult<()>;
	async fn update_file_data(&self, tn_id: TnId, file_id: &str, patch: &UpdateFileOptions) -> ClResult<()>;
	async fn create_file_variant(&self, tn_id: TnId, file_id: &str, variant: &FileVariant) -> ClResult<()>;
	async fn list_file_variants(&self, tn_id: TnId, file_id: &str) -> ClResult<Vec<FileVariant>>;
	async fn delete_file(&self, tn_id: TnId, file_id: &str) -> ClResult<()>;
	async fn add_tag(&self, tn_id: TnId, file_id: &str, tag: &str) -> ClResult<()>;
	async fn remove_tag(&self, tn_id: TnId, file_id: &str, tag: &str) -> ClResult<()>;
	async fn list_tags(&self, tn_id: TnId, prefix: Option<&str>) -> ClResult<Vec<Box<str>>>;

	// Refs
	//******
	async fn list_refs(&self, tn_id: TnId) -> ClResult<Vec<RefData>>;
	async fn get_ref(&self, tn_id: TnId, ref_id: &str) -> ClResult<Option<RefData>>;
	async fn create_ref(&self, tn_id: TnId, ref_id: &str, opts: &CreateRefOptions) -> ClResult<RefData>;
	async fn delete_ref(&self, tn_id: TnId, ref_id: &str) -> ClResult<()>;
	async fn increment_ref_uses(&self, tn_id: TnId, ref_id: &str) -> ClResult<()>;

	// Settings
	//**********
	async fn list_settings(&self, tn_id: TnId, prefix: Option<&str>) -> ClResult<HashMap<String, serde_json::Value>>;
	async fn read_setting(&self, tn_id: TnId, name: &str) -> ClResult<Option<serde_json::Value>>;
	async fn update_setting(&self, tn_id: TnId, name: &str, value: Option<serde_json::Value>) -> ClResult<()>;

	// Push subscriptions
	//********************
	async fn list_subscriptions(&self, tn_id: TnId) -> ClResult<Vec<PushSubscription>>;
	async fn create_subscription(&self, tn_id: TnId, sub: &PushSubscription) -> ClResult<()>;
	async fn delete_subscription(&self, tn_id: TnId, sub_id: &str) -> ClResult<()>;

	// Task scheduler persistence (§4.6)
	//************************************
	async fn list_tasks(&self, opts: ListTaskOptions) -> ClResult<Vec<Task>>;
	async fn find_task_by_key(&self, key: &str) -> ClResult<Option<Task>>;
	async fn create_task(&self, kind: &'static str, key: Option<&str>, input: &str, deps: &[u64]) -> ClResult<u64>;
	async fn update_task(&self, task_id: u64, patch: &TaskPatch) -> ClResult<()>;
	async fn update_task_finished(&self, task_id: u64, output: &str) -> ClResult<()>;
	async fn update_task_error(&self, task_id: u64, output: &str, next_at: Option<Timestamp>) -> ClResult<()>;
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn deserialize_list_action_options_splits_comma_lists() {
		let query = "status=C,N&type=POST,CMNT";
		let opts: ListActionOptions = serde_urlencoded::from_str(query).unwrap();

		let statuses = opts.status.unwrap();
		assert_eq!(statuses, vec!['C', 'N']);

		let types = opts.typ.unwrap();
		assert_eq!(types[0].as_ref(), "POST");
		assert_eq!(types[1].as_ref(), "CMNT");
	}

	#[test]
	fn deserialize_list_action_options_without_status() {
		let opts: ListActionOptions = serde_urlencoded::from_str("issuer=alice").unwrap();
		assert!(opts.status.is_none());
		assert_eq!(opts.issuer.as_deref(), Some("alice"));
	}
}

// vim: ts=4
