//! loadpilot-state — shared domain types for loadpilot.
//!
//! Everything that crosses a crate boundary lives here: the autoscaler
//! mode and configuration, the host metrics snapshot, the decoded queue
//! status, and the bounded history that seeds newly connected observers.
//!
//! # Architecture
//!
//! All types are plain data with serde derives. Field names serialize in
//! camelCase because the primary consumer is a browser-side observer.
//! Nothing in this crate performs I/O.

pub mod error;
pub mod history;
pub mod types;

pub use error::{ConfigError, ConfigResult};
pub use history::{HISTORY_CAPACITY, HistoryBuffer};
pub use types::*;
