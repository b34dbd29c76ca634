//! Application state management.

use std::time::{Duration, Instant};

use chrono::{DateTime, Local};

use crate::activity::ServerVersion;

use super::actions::ConfirmationIntent;
use super::table::ActivityTable;

/// How long a toast stays on screen.
pub const TOAST_DURATION: Duration = Duration::from_secs(1);

/// Button of the confirmation popup that has focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfirmChoice {
    Yes,
    #[default]
    No,
}

impl ConfirmChoice {
    pub fn toggle(self) -> Self {
        match self {
            ConfirmChoice::Yes => ConfirmChoice::No,
            ConfirmChoice::No => ConfirmChoice::Yes,
        }
    }
}

/// Modal shown above the table.
#[derive(Debug, Default)]
pub enum PopupState {
    #[default]
    None,
    Confirm {
        intent: ConfirmationIntent,
        selected: ConfirmChoice,
    },
    Plan {
        query: String,
        plan: String,
        scroll: u16,
    },
}

impl PopupState {
    pub fn is_open(&self) -> bool {
        !matches!(self, PopupState::None)
    }
}

#[derive(Debug, Clone)]
pub struct Toast {
    pub message: String,
    pub shown_at: Instant,
}

#[derive(Debug)]
pub struct AppState {
    pub table: ActivityTable,
    pub server_version: ServerVersion,
    /// Live refresh is suspended; the last snapshot stays actionable.
    pub paused: bool,
    /// An activity request is queued or running on the worker.
    pub fetch_in_flight: bool,
    pub popup: PopupState,
    pub toast: Option<Toast>,
    /// Last non-fatal snapshot failure, cleared by the next good poll.
    pub last_error: Option<String>,
    pub last_refresh: Option<DateTime<Local>>,
}

impl AppState {
    pub fn new(server_version: ServerVersion, show_idle: bool, terminal_width: u16) -> Self {
        Self {
            table: ActivityTable::new(show_idle, terminal_width),
            server_version,
            paused: false,
            fetch_in_flight: false,
            popup: PopupState::None,
            toast: None,
            last_error: None,
            last_refresh: None,
        }
    }

    pub fn show_toast(&mut self, message: impl Into<String>) {
        self.toast = Some(Toast {
            message: message.into(),
            shown_at: Instant::now(),
        });
    }

    /// Time until the current toast is due to disappear, if one is shown.
    pub fn toast_remaining(&self, now: Instant) -> Option<Duration> {
        self.toast
            .as_ref()
            .map(|t| TOAST_DURATION.saturating_sub(now.saturating_duration_since(t.shown_at)))
    }

    /// Drops the toast once it has been visible for [`TOAST_DURATION`].
    pub fn expire_toast(&mut self, now: Instant) {
        if self
            .toast
            .as_ref()
            .is_some_and(|t| now.saturating_duration_since(t.shown_at) >= TOAST_DURATION)
        {
            self.toast = None;
        }
    }
}
