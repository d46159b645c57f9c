//! Core value types shared across every crate: tenant ids, timestamps, PATCH semantics,
//! and the permission levels checked by the HTTP gateway and the CRDT relay.

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::time::SystemTime;

// TnId //
//******//
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct TnId(pub u32);

impl std::fmt::Display for TnId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl Serialize for TnId {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_u32(self.0)
	}
}

impl<'de> Deserialize<'de> for TnId {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		Ok(TnId(u32::deserialize(deserializer)?))
	}
}

// Timestamp //
//***********//
/// Whole-second Unix timestamp. Action tokens need centisecond precision for their
/// `iat` claim; that narrower representation lives in `action_types` since it is
/// only ever used on the wire, not as a general-purpose clock value.
#[derive(Clone, Copy, Debug, Default)]
pub struct Timestamp(pub i64);

impl Timestamp {
	pub fn now() -> Timestamp {
		let res = SystemTime::now().duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default();
		Timestamp(res.as_secs() as i64)
	}

	pub fn from_now(delta_secs: i64) -> Timestamp {
		Timestamp(Timestamp::now().0 + delta_secs)
	}

	pub fn add_seconds(&self, seconds: i64) -> Timestamp {
		Timestamp(self.0 + seconds)
	}

	pub fn is_past(&self) -> bool {
		self.0 < Timestamp::now().0
	}
}

impl std::fmt::Display for Timestamp {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl PartialEq for Timestamp {
	fn eq(&self, other: &Self) -> bool {
		self.0 == other.0
	}
}
impl Eq for Timestamp {}

impl PartialOrd for Timestamp {
	fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for Timestamp {
	fn cmp(&self, other: &Self) -> std::cmp::Ordering {
		self.0.cmp(&other.0)
	}
}

impl Serialize for Timestamp {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_i64(self.0)
	}
}

impl<'de> Deserialize<'de> for Timestamp {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		Ok(Timestamp(i64::deserialize(deserializer)?))
	}
}

/// Serializes a `Timestamp` as an RFC3339 string, for JSON response bodies that mirror
/// the reference implementation's human-readable timestamps.
pub fn serialize_timestamp_iso<S: Serializer>(ts: &Timestamp, s: S) -> Result<S::Ok, S::Error> {
	let dt = Utc.timestamp_opt(ts.0, 0).single().unwrap_or_else(Utc::now);
	s.serialize_str(&dt.to_rfc3339())
}

pub fn serialize_timestamp_iso_opt<S: Serializer>(
	ts: &Option<Timestamp>,
	s: S,
) -> Result<S::Ok, S::Error> {
	match ts {
		Some(ts) => serialize_timestamp_iso(ts, s),
		None => s.serialize_none(),
	}
}

// Patch<T> - PATCH semantics //
//*****************************//
/// A field in a PATCH request: absent (no change), present-null (clear), or present-value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Patch<T> {
	#[default]
	Undefined,
	Null,
	Value(T),
}

impl<T> Patch<T> {
	pub fn is_undefined(&self) -> bool {
		matches!(self, Patch::Undefined)
	}

	pub fn is_null(&self) -> bool {
		matches!(self, Patch::Null)
	}

	pub fn is_value(&self) -> bool {
		matches!(self, Patch::Value(_))
	}

	pub fn value(&self) -> Option<&T> {
		match self {
			Patch::Value(v) => Some(v),
			_ => None,
		}
	}

	pub fn as_option(&self) -> Option<Option<&T>> {
		match self {
			Patch::Undefined => None,
			Patch::Null => Some(None),
			Patch::Value(v) => Some(Some(v)),
		}
	}

	pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Patch<U> {
		match self {
			Patch::Undefined => Patch::Undefined,
			Patch::Null => Patch::Null,
			Patch::Value(v) => Patch::Value(f(v)),
		}
	}
}

impl<T: Serialize> Serialize for Patch<T> {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		match self {
			Patch::Undefined | Patch::Null => serializer.serialize_none(),
			Patch::Value(v) => v.serialize(serializer),
		}
	}
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		Option::<T>::deserialize(deserializer)
			.map(|opt| opt.map_or(Patch::Null, Patch::Value))
	}
}

// Access //
//********//
/// The four permission levels a route or CRDT room checks against a resource:
/// read, write, admin, or no requirement at all (public).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Access {
	None,
	Read,
	Write,
	Admin,
}

impl Access {
	/// True if a caller holding `self` satisfies a route that requires `required`.
	pub fn satisfies(&self, required: Access) -> bool {
		*self >= required
	}
}

impl std::fmt::Display for Access {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let s = match self {
			Access::None => "none",
			Access::Read => "R",
			Access::Write => "W",
			Access::Admin => "A",
		};
		write!(f, "{s}")
	}
}

impl std::str::FromStr for Access {
	type Err = crate::error::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"none" | "" => Ok(Access::None),
			"R" | "r" | "read" => Ok(Access::Read),
			"W" | "w" | "write" => Ok(Access::Write),
			"A" | "a" | "admin" => Ok(Access::Admin),
			_ => Err(crate::error::Error::BadInput(format!("invalid access level: {s}"))),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn patch_roundtrips_through_option() {
		let p: Patch<i32> = Patch::Value(42);
		assert_eq!(p.as_option(), Some(Some(&42)));
		assert_eq!(Patch::<i32>::Null.as_option(), Some(None));
		assert_eq!(Patch::<i32>::Undefined.as_option(), None);
	}

	#[test]
	fn access_ordering_satisfies_lower_requirements() {
		assert!(Access::Admin.satisfies(Access::Write));
		assert!(Access::Write.satisfies(Access::Read));
		assert!(!Access::Read.satisfies(Access::Write));
		assert!(Access::None.satisfies(Access::None));
	}

	#[test]
	fn access_parses_short_and_long_forms() {
		assert_eq!("W".parse::<Access>().unwrap(), Access::Write);
		assert_eq!("read".parse::<Access>().unwrap(), Access::Read);
		assert!("bogus".parse::<Access>().is_err());
	}
}

// vim: ts=4
