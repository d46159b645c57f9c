//! Common imports re-exported for `use crate::prelude::*;` across this crate.

pub use cloudillo_core::app::App;
pub use cloudillo_types::prelude::*;
pub use cloudillo_types::types::{Access, TnId};

// vim: ts=4
