//! Common imports re-exported for `use crate::prelude::*;` across the workspace.

pub use crate::error::{ClResult, Error};
pub use crate::types::{Timestamp, TnId};
pub use tracing::{debug, error, info, trace, warn};

// vim: ts=4
