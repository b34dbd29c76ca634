//! pgpeek - live, `top`-like view of PostgreSQL sessions.
//!
//! - `session` - server connection with tracked, leak-free result handles
//! - `activity` - snapshot statement, session rows and administrative calls
//! - `tui` - the interactive dashboard

pub mod activity;
pub mod logging;
pub mod session;
pub mod tui;
