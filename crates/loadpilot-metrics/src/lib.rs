//! loadpilot-metrics — host readings for the autoscaler and its observers.
//!
//! # Architecture
//!
//! ```text
//! MetricsSource
//!   ├── HostSampler    ← sysinfo, used by loadpilotd
//!   └── ScriptedSource ← fixed CPU sequence, used by tests
//!
//! Prometheus exposition
//!   └── render_prometheus() → text/plain for /metrics endpoint
//! ```

pub mod prometheus;
pub mod sampler;
pub mod source;

pub use prometheus::render_prometheus;
pub use sampler::{HostSampler, format_uptime};
pub use source::{MetricsSource, ScriptedSource};
