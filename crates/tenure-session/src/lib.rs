pub mod context;
pub mod error;
pub mod handler;
pub mod listener;
pub mod notice;
pub mod writer;

pub use context::{ActiveSession, SessionContext};
pub use error::SessionError;
pub use handler::{CollectHandler, ConflictHandler, NoticeOnConflict};
pub use listener::{ConflictListener, SessionPhase, SessionState};
pub use notice::NoticeHandoff;
pub use writer::{ClaimWriter, HeartbeatSchedule, ReleaseOutcome};
