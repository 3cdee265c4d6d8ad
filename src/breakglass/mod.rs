//! Supervised emergency access ("break glass").
//!
//! A break-glass session moves through `Pending → Active → {Expired |
//! Revoked}` (a denial revokes a pending session immediately). Once active,
//! the session is intrinsically time-boxed: a monitor sweep expires it even
//! with no further input. Actions execute only while the session is active
//! and only when the procedure's allow-list permits the action/resource
//! pair, and every outcome: success or failure: lands in the session's
//! ordered action log, its append-only audit trail, and the system-wide
//! event stream.

pub mod controller;
pub mod procedure;
pub mod session;

pub use controller::{ActionResult, BreakGlassController, BreakGlassRequest};
pub use procedure::{AllowedAction, BreakGlassProcedure, EmergencyActionKind, Urgency};
pub use session::{ActionLogEntry, ApprovalVote, BreakGlassSession, SessionStatus};
