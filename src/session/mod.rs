//! # Session Management
//!
//! Everything scoped to one client connection's lifetime:
//!
//! - **Session Registry**: the process-wide client id → session map, the only
//!   state shared across sessions
//! - **Session Metrics**: per-session audio accounting and the derived
//!   optimization figures
//! - **Session Controller**: the per-session state machine that owns the
//!   pipeline and drives it strictly in order
//!
//! Sessions are the unit of isolation: a failure inside one session's
//! pipeline never affects another session or the process.

pub mod controller;
pub mod metrics;
pub mod registry;

pub use controller::{ControllerCommand, SessionController};
pub use registry::{SessionRegistry, SessionState};
