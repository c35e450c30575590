// crates/core/src/lib.rs
pub mod activity;
pub mod aliases;
pub mod auth;
pub mod batch;
pub mod config;
pub mod error;
pub mod normalizer;
pub mod paths;
pub mod payload;

pub use activity::*;
pub use aliases::*;
pub use auth::*;
pub use batch::*;
pub use config::*;
pub use error::*;
pub use normalizer::*;
