pub mod arbiter;
pub mod clock;
pub mod config;
pub mod identity;
pub mod types;

pub use arbiter::{is_live_foreign_claim, should_yield, yield_verdict, LocalSession, Verdict};
pub use clock::{Clock, ManualClock, MonotonicStamper, SystemClock};
pub use config::{ConfigError, SessionConfig};
pub use types::*;
