//! Common imports re-exported for `use crate::prelude::*;` across this crate.

pub use crate::app::App;
pub use cloudillo_types::prelude::*;
pub use cloudillo_types::types::TnId;

// vim: ts=4
