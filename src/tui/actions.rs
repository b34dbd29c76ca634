//! Action dispatcher: turns operator intents into worker requests and
//! worker responses into toasts, popups and table updates.

use std::fmt;
use std::io::Write;

use chrono::Local;
use tracing::{debug, warn};

use crate::activity::model::collapse_whitespace;
use crate::activity::{AdminAction, StateError, parse_pid};

use super::clipboard;
use super::state::{AppState, ConfirmChoice, PopupState};
use super::worker::{DbRequest, DbResponse, Requester};

/// Longest query excerpt quoted in a confirmation prompt.
const PROMPT_QUERY_CHARS: usize = 60;

/// Toast for a request the database worker can no longer take.
pub const NOT_SENT: &str = "Database worker stopped, request not sent";

/// A pending action that only runs if the operator confirms it.
pub struct ConfirmationIntent {
    pub description: String,
    action: Box<dyn FnOnce() -> bool + Send>,
}

impl ConfirmationIntent {
    pub fn new(
        description: impl Into<String>,
        action: impl FnOnce() -> bool + Send + 'static,
    ) -> Self {
        Self {
            description: description.into(),
            action: Box::new(action),
        }
    }

    /// Runs the action. Returns false when it could not be carried out.
    pub fn confirm(self) -> bool {
        (self.action)()
    }
}

impl fmt::Debug for ConfirmationIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfirmationIntent")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Queues a snapshot unless one is already outstanding.
pub fn request_activity(state: &mut AppState, requester: &Requester) {
    if state.fetch_in_flight {
        debug!("previous snapshot still in flight, skipping poll");
        return;
    }
    state.fetch_in_flight = requester.send(DbRequest::Activity);
}

/// `action` labels a malformed pid as that call's failure; `None` for
/// actions that never reach the server.
fn selected_pid(state: &mut AppState, action: Option<AdminAction>) -> Option<i32> {
    let Some(row) = state.table.selected_row() else {
        state.show_toast("No session selected");
        return None;
    };
    match pid_from_cell(action, row.key()) {
        Ok(pid) => Some(pid),
        Err(message) => {
            state.show_toast(message);
            None
        }
    }
}

fn pid_from_cell(action: Option<AdminAction>, cell: &str) -> Result<i32, String> {
    match action {
        Some(action) => parse_pid(action, cell).map_err(|e| e.to_string()),
        None => cell
            .trim()
            .parse()
            .map_err(|_| format!("Malformed pid {:?}", cell)),
    }
}

/// Opens a confirmation for cancelling or terminating the selected backend.
pub fn request_signal(state: &mut AppState, requester: &Requester, action: AdminAction) {
    let Some(pid) = selected_pid(state, Some(action)) else {
        return;
    };
    let request = match action {
        AdminAction::Cancel => DbRequest::Cancel { pid },
        AdminAction::Terminate => DbRequest::Terminate { pid },
        AdminAction::Explain => return,
    };

    let description = describe(state, action, pid);
    let requester = requester.clone();
    state.popup = PopupState::Confirm {
        intent: ConfirmationIntent::new(description, move || requester.send(request)),
        selected: ConfirmChoice::default(),
    };
}

fn describe(state: &AppState, action: AdminAction, pid: i32) -> String {
    let verb = match action {
        AdminAction::Cancel => "Cancel the query of",
        _ => "Terminate",
    };
    match state.table.session(pid) {
        Some(session) => {
            let query = collapse_whitespace(&session.query_text);
            let mut excerpt: String = query.chars().take(PROMPT_QUERY_CHARS).collect();
            if query.chars().count() > PROMPT_QUERY_CHARS {
                excerpt.push_str("...");
            }
            format!(
                "{} backend {} ({}@{})?\n{}",
                verb, pid, session.user, session.database, excerpt
            )
        }
        None => format!("{} backend {}?", verb, pid),
    }
}

/// Requests the plan of the selected backend's raw query.
pub fn request_explain(state: &mut AppState, requester: &Requester) {
    let Some(pid) = selected_pid(state, Some(AdminAction::Explain)) else {
        return;
    };
    let query = state
        .table
        .raw_query_for(pid)
        .map(str::to_string)
        .unwrap_or_default();
    if query.trim().is_empty() {
        state.show_toast(format!("Backend {} has no query to explain", pid));
        return;
    }
    if !requester.send(DbRequest::Explain { pid, query }) {
        state.show_toast(NOT_SENT);
    }
}

/// Copies the selected backend's raw query to the clipboard.
pub fn copy_selected_query<W: Write>(state: &mut AppState, out: &mut W) {
    let Some(pid) = selected_pid(state, None) else {
        return;
    };
    let query = state
        .table
        .raw_query_for(pid)
        .map(str::to_string)
        .unwrap_or_default();
    if let Err(e) = clipboard::export(out, state, &query, "query") {
        warn!(error = %e, "clipboard export failed");
        state.show_toast(format!("Copy failed: {}", e));
    }
}

/// Applies a worker response. Returns the error when the session cannot go
/// on.
pub fn apply_response(state: &mut AppState, response: DbResponse) -> Result<(), StateError> {
    match response {
        DbResponse::Activity(result) => {
            state.fetch_in_flight = false;
            match result {
                Ok(rows) if state.paused => {
                    debug!(rows = rows.len(), "discarding snapshot received while paused");
                }
                Ok(rows) => {
                    state.table.on_snapshot_replaced(rows);
                    state.last_error = None;
                    state.last_refresh = Some(Local::now());
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(error = %e, "snapshot failed, keeping previous rows");
                    state.last_error = Some(e.to_string());
                }
            }
        }
        DbResponse::Signalled {
            action,
            pid,
            result,
        } => {
            let message = match result {
                Ok(true) if action == AdminAction::Cancel => format!("Cancelled backend {}", pid),
                Ok(true) => format!("Terminated backend {}", pid),
                Ok(false) => format!("Backend {} not signalled", pid),
                Err(e) => {
                    warn!(pid, error = %e, "administrative action failed");
                    e.to_string()
                }
            };
            state.show_toast(message);
        }
        DbResponse::Plan { pid, query, result } => match result {
            Ok(plan) if !state.popup.is_open() => {
                state.popup = PopupState::Plan {
                    query,
                    plan,
                    scroll: 0,
                };
            }
            Ok(_) => debug!(pid, "plan arrived while another popup is open"),
            Err(e) => {
                warn!(pid, error = %e, "explain failed");
                state.show_toast(e.to_string());
            }
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::activity::fixtures::{activity_row, server};
    use crate::activity::{ServerVersion, SessionRow, SessionState};
    use crate::session::mock::MockEvent;
    use crate::session::{Connection, DbError};
    use crate::tui::worker::{self, serve};

    fn session(pid: i32, state: &str, running: Option<u64>, query: &str) -> SessionRow {
        SessionRow {
            pid,
            client_address: None,
            is_waiting: false,
            database: "shop".into(),
            user: "alice".into(),
            query_text: query.into(),
            running_duration: running.map(Duration::from_secs),
            held_lock_count: 0,
            waiting_lock_count: 0,
            state: state.into(),
        }
    }

    fn app_state(rows: Vec<SessionRow>) -> AppState {
        let mut state = AppState::new(ServerVersion::new(16, 2), false, 160);
        state.table.on_snapshot_replaced(rows);
        state
    }

    fn confirm(state: &mut AppState) -> bool {
        match std::mem::take(&mut state.popup) {
            PopupState::Confirm { intent, .. } => intent.confirm(),
            other => panic!("expected confirmation, got {other:?}"),
        }
    }

    #[test]
    fn cancel_scenario_calls_facade_once_and_commits() {
        let mock = server(vec![
            activity_row(100, "active", Some(5.0), "SELECT pg_sleep(60)"),
            activity_row(200, "idle", None, "COMMIT"),
        ]);
        let log = mock.log();
        let facade = SessionState::new(Connection::new(mock)).unwrap();
        let (requester, inbox) = worker::channel();
        let mut state = AppState::new(facade.server_version(), false, 160);

        request_activity(&mut state, &requester);
        let request = inbox.try_recv().unwrap().unwrap();
        apply_response(&mut state, serve(&facade, request)).unwrap();

        let shown: Vec<&str> = state.table.rows().iter().map(|r| r.key()).collect();
        assert_eq!(shown, ["100"]);

        request_signal(&mut state, &requester, AdminAction::Cancel);
        assert!(inbox.try_recv().is_err(), "nothing runs before confirmation");
        assert!(confirm(&mut state));

        let request = inbox.try_recv().unwrap().unwrap();
        assert_eq!(request, DbRequest::Cancel { pid: 100 });
        apply_response(&mut state, serve(&facade, request)).unwrap();

        assert_eq!(log.count_matching(|e| matches!(e, MockEvent::Execute { sql, .. } if sql.contains("pg_cancel_backend"))), 1);
        assert_eq!(
            log.events().iter().rev().find(|e| matches!(e, MockEvent::Commit | MockEvent::Rollback)),
            Some(&MockEvent::Commit)
        );
        assert!(!facade.in_transaction());
        assert_eq!(
            state.toast.as_ref().map(|t| t.message.as_str()),
            Some("Cancelled backend 100")
        );
    }

    #[test]
    fn dismissed_intent_sends_nothing() {
        let (requester, inbox) = worker::channel();
        let mut state = app_state(vec![session(42, "active", Some(3), "SELECT 1")]);

        request_signal(&mut state, &requester, AdminAction::Terminate);
        match &state.popup {
            PopupState::Confirm { intent, selected } => {
                assert!(intent.description.starts_with("Terminate backend 42 (alice@shop)?"));
                assert_eq!(*selected, ConfirmChoice::No);
            }
            other => panic!("unexpected {other:?}"),
        }
        state.popup = PopupState::None;
        assert!(inbox.try_recv().is_err());
    }

    #[test]
    fn signal_without_selection_toasts() {
        let (requester, inbox) = worker::channel();
        let mut state = app_state(vec![]);
        request_signal(&mut state, &requester, AdminAction::Cancel);
        assert!(!state.popup.is_open());
        assert_eq!(
            state.toast.as_ref().map(|t| t.message.as_str()),
            Some("No session selected")
        );
        assert!(inbox.try_recv().is_err());
    }

    #[test]
    fn confirmed_signal_reports_stopped_worker() {
        let (requester, inbox) = worker::channel();
        drop(inbox);
        let mut state = app_state(vec![session(42, "active", Some(3), "SELECT 1")]);

        request_signal(&mut state, &requester, AdminAction::Cancel);
        assert!(!confirm(&mut state));
    }

    #[test]
    fn explain_with_stopped_worker_toasts() {
        let (requester, inbox) = worker::channel();
        drop(inbox);
        let mut state = app_state(vec![session(7, "active", Some(1), "SELECT 1")]);

        request_explain(&mut state, &requester);

        assert_eq!(state.toast.as_ref().map(|t| t.message.as_str()), Some(NOT_SENT));
    }

    #[test]
    fn malformed_pid_message_names_the_action() {
        assert_eq!(pid_from_cell(None, " 42"), Ok(42));
        assert_eq!(
            pid_from_cell(None, "x1"),
            Err("Malformed pid \"x1\"".to_string())
        );
        let explain = pid_from_cell(Some(AdminAction::Explain), "x1").unwrap_err();
        assert!(explain.starts_with("explain failed"), "{explain}");
        let copy = pid_from_cell(None, "x1").unwrap_err();
        assert!(!copy.contains("explain"), "{copy}");
    }

    #[test]
    fn explain_uses_raw_query_text() {
        let (requester, inbox) = worker::channel();
        let mut state = app_state(vec![session(7, "active", Some(1), "SELECT *\n  FROM t\n")]);

        request_explain(&mut state, &requester);

        assert_eq!(
            inbox.try_recv().unwrap(),
            Some(DbRequest::Explain {
                pid: 7,
                query: "SELECT *\n  FROM t\n".into(),
            })
        );
    }

    #[test]
    fn plan_response_opens_viewer() {
        let mut state = app_state(vec![session(7, "active", Some(1), "SELECT 1")]);
        apply_response(
            &mut state,
            DbResponse::Plan {
                pid: 7,
                query: "SELECT 1".into(),
                result: Ok("Result  (cost=0.00..0.01 rows=1 width=4)".into()),
            },
        )
        .unwrap();
        match &state.popup {
            PopupState::Plan { query, plan, scroll } => {
                assert_eq!(query, "SELECT 1");
                assert!(plan.starts_with("Result"));
                assert_eq!(*scroll, 0);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn copy_exports_raw_query() {
        let mut state = app_state(vec![session(7, "active", Some(1), "SELECT\n1")]);
        let mut out = Vec::new();
        copy_selected_query(&mut state, &mut out);
        assert_eq!(out, clipboard::osc52_sequence("SELECT\n1").into_bytes());
        assert_eq!(
            state.toast.as_ref().map(|t| t.message.as_str()),
            Some("Copied query to clipboard")
        );
    }

    #[test]
    fn polls_never_overlap() {
        let (requester, inbox) = worker::channel();
        let mut state = app_state(vec![]);
        request_activity(&mut state, &requester);
        request_activity(&mut state, &requester);
        assert_eq!(inbox.try_iter().count(), 1);

        apply_response(&mut state, DbResponse::Activity(Ok(vec![]))).unwrap();
        assert!(!state.fetch_in_flight);
        request_activity(&mut state, &requester);
        assert_eq!(inbox.try_iter().count(), 1);
    }

    #[test]
    fn failed_snapshot_keeps_rows_and_records_error() {
        let mut state = app_state(vec![session(1, "active", Some(1), "SELECT 1")]);
        state.fetch_in_flight = true;
        apply_response(
            &mut state,
            DbResponse::Activity(Err(StateError::SnapshotFetch(DbError::Query(
                "canceling statement due to statement timeout".into(),
            )))),
        )
        .unwrap();
        assert_eq!(state.table.rows().len(), 1);
        assert!(!state.fetch_in_flight);
        assert!(state.last_error.as_deref().unwrap().contains("statement timeout"));

        apply_response(
            &mut state,
            DbResponse::Activity(Ok(vec![session(2, "active", None, "SELECT 2")])),
        )
        .unwrap();
        assert_eq!(state.last_error, None);
        assert!(state.last_refresh.is_some());
    }

    #[test]
    fn lost_connection_is_fatal() {
        let mut state = app_state(vec![]);
        let err = apply_response(
            &mut state,
            DbResponse::Activity(Err(StateError::SnapshotFetch(DbError::Connection(
                "server closed the connection unexpectedly".into(),
            )))),
        )
        .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn paused_table_ignores_late_snapshot() {
        let mut state = app_state(vec![session(1, "active", Some(1), "SELECT 1")]);
        state.paused = true;
        state.fetch_in_flight = true;
        apply_response(
            &mut state,
            DbResponse::Activity(Ok(vec![session(2, "active", None, "SELECT 2")])),
        )
        .unwrap();
        assert_eq!(state.table.rows()[0].key(), "1");
        assert!(!state.fetch_in_flight);
    }

    #[test]
    fn admin_results_become_toasts() {
        let mut state = app_state(vec![]);
        let toast = |state: &AppState| state.toast.as_ref().map(|t| t.message.clone());

        apply_response(
            &mut state,
            DbResponse::Signalled {
                action: AdminAction::Terminate,
                pid: 5,
                result: Ok(false),
            },
        )
        .unwrap();
        assert_eq!(toast(&state).as_deref(), Some("Backend 5 not signalled"));

        apply_response(
            &mut state,
            DbResponse::Signalled {
                action: AdminAction::Cancel,
                pid: 5,
                result: Err(StateError::Admin {
                    action: AdminAction::Cancel,
                    source: DbError::Query("permission denied to cancel query".into()),
                }),
            },
        )
        .unwrap();
        assert_eq!(
            toast(&state).as_deref(),
            Some("cancel failed: permission denied to cancel query")
        );
    }
}
