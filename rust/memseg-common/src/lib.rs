//! Core definitions (error taxonomy, result helpers and alignment arithmetic),
//! relied upon by all memseg-* crates.

pub mod align;
pub mod error;
pub mod result;

pub use result::Result;
