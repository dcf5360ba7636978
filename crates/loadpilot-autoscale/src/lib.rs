//! loadpilot-autoscale — CPU-driven concurrency control for the task queue.
//!
//! Each tick feeds one CPU sample into a [`LoadWindow`] and, in `auto`
//! mode, reacts by pausing, resuming, or resizing through the
//! [`QueueCommandPort`](loadpilot_queue::QueueCommandPort).
//!
//! # Scaling Algorithm
//!
//! ```text
//! cpu    = latest sample
//! median = median(last 40 samples)
//!
//! if no task is running:
//!     parallel := 1                      // idle reset
//! elif cpu > cpu_high and running > min_parallel:
//!     pause(max(running ids))            // newest task
//!     parallel := max(running - 1, min_parallel)
//! elif median < cpu_resume and paused stack not empty:
//!     resume(pop(paused stack))          // LIFO
//!     parallel := min(parallel + 1, max_parallel)
//! elif median < cpu_low and paused stack empty:
//!     parallel := min(parallel + 1, max_parallel)
//! ```
//!
//! Switching to `manual` resumes every task the autoscaler paused. The
//! mode is re-read after every queue call, and a tick that finds the
//! operator has taken over stops where it is.

pub mod controller;
pub mod window;

pub use controller::{AutoscalerController, Command, Origin, TickOutcome};
pub use window::{LOAD_WINDOW_SIZE, LoadWindow};
