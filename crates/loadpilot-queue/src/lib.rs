//! loadpilot-queue — the command port toward the external task queue.
//!
//! The autoscaler never talks to the queue directly. It goes through
//! [`QueueCommandPort`], a narrow async interface covering exactly what
//! the control loop and the observers need.
//!
//! # Architecture
//!
//! ```text
//! QueueCommandPort (trait)
//!   ├── PueueCli       → shells out to `pueue` with a per-call timeout
//!   └── InMemoryQueue  → in-process task table for tests and dry runs
//!
//! status::decode_status()
//!   └── raw `pueue status --json` → QueueStatus (closed TaskStatus variant)
//! ```
//!
//! Every call may fail. The two read helpers on the trait
//! (`running_task_ids`, `current_concurrency`) absorb failures into safe
//! defaults so callers in the control loop never see an error.

pub mod error;
pub mod memory;
pub mod port;
pub mod pueue;
pub mod status;

pub use error::{QueueError, QueueResult};
pub use memory::{InMemoryQueue, QueueCall};
pub use port::{DEFAULT_LOG_LINES, QueueCommandPort};
pub use pueue::PueueCli;
pub use status::decode_status;
