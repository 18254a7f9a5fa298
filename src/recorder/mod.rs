//! Recording engine
//!
//! Per-camera sessions and the manager that runs them as a batch:
//! - `CameraSession`: state machine owning a camera, video sink and marker stream
//! - capture loop and liveness monitor, one of each per session
//! - `SessionManager`: create/start/stop a batch of sessions

mod capture_loop;
pub mod config;
pub mod error;
pub mod events;
mod liveness;
pub mod manager;
pub mod session;
pub mod sink;
pub mod state;

pub use config::{RecorderConfig, SessionOptions};
pub use error::{SessionError, SessionResult};
pub use events::{PreviewEvent, SessionNotice};
pub use manager::{BatchFailure, BatchReport, SessionManager};
pub use session::CameraSession;
pub use sink::VideoSink;
pub use state::{CameraSelection, SessionState, SessionStatus, StopReport};
