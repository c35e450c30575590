// crates/types/src/lib.rs
//! Shared view-state records for the dashboard.
//!
//! Everything here is handed to the view layer by value and serialized
//! camelCase. Enable the `codegen` feature to export TypeScript declarations.

pub mod activity;
pub mod dashboard;
pub mod source;
pub mod view;

pub use activity::*;
pub use dashboard::*;
pub use source::*;
pub use view::*;
