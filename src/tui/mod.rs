//! Terminal user interface.
//!
//! A `top`-like view of the server's sessions, refreshed on a fixed
//! cadence, with cancel/terminate/explain/copy actions on the selected row.

mod actions;
mod app;
mod clipboard;
mod event;
mod input;
mod render;
mod state;
mod style;
mod table;
mod widgets;
mod worker;

pub use app::{App, AppError, AppOptions};
pub use table::{ActivityTable, FIXED_MARGIN, allocate_widths};
