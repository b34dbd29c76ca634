//! Session rows and the column table that drives both the snapshot
//! statement and the rendered table.

use std::time::Duration;

use crate::session::{DbError, Row, Value};

/// One backend as seen by a single snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRow {
    pub pid: i32,
    /// `addr:port`; absent for local sockets and background workers.
    pub client_address: Option<String>,
    pub is_waiting: bool,
    pub database: String,
    pub user: String,
    /// Raw query text, as reported by the server.
    pub query_text: String,
    /// `None` when the backend has no query start time.
    pub running_duration: Option<Duration>,
    pub held_lock_count: i64,
    pub waiting_lock_count: i64,
    pub state: String,
}

impl SessionRow {
    /// Builds a session row from one result row of the activity statement.
    pub fn from_row(row: &Row) -> Result<Self, DbError> {
        let pid = row
            .get("pid")
            .and_then(Value::as_i64)
            .and_then(|v| i32::try_from(v).ok())
            .ok_or_else(|| DbError::Query("activity row without a valid pid".to_string()))?;

        let text = |key: &str| {
            row.get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        let count = |key: &str| row.get(key).and_then(Value::as_i64).unwrap_or(0).max(0);

        let running_duration = row
            .get("running")
            .and_then(Value::as_f64)
            .filter(|secs| secs.is_finite())
            .map(|secs| Duration::from_secs_f64(secs.max(0.0)));

        Ok(Self {
            pid,
            client_address: text("addr"),
            is_waiting: row.get("waiting").and_then(Value::as_bool).unwrap_or(false),
            database: text("datname").unwrap_or_default(),
            user: text("usename").unwrap_or_default(),
            query_text: text("query").unwrap_or_default(),
            running_duration,
            held_lock_count: count("lcksh"),
            waiting_lock_count: count("lcksw"),
            state: text("state").unwrap_or_default(),
        })
    }
}

/// Static metadata for one displayed session field.
#[derive(Debug)]
pub struct ColumnSpec {
    /// Result column name in the snapshot statement.
    pub key: &'static str,
    pub label: &'static str,
    /// Minimum width; the actual width also grows with label and content.
    pub width: Option<u16>,
    /// Receives the horizontal space left over by all other columns.
    pub flexible: bool,
    pub format: fn(&SessionRow) -> String,
}

pub const PID_COLUMN: usize = 0;
pub const WAIT_COLUMN: usize = 2;
pub const QUERY_COLUMN: usize = 5;
pub const STATE_COLUMN: usize = 9;

pub static COLUMNS: [ColumnSpec; 10] = [
    ColumnSpec {
        key: "pid",
        label: "PID",
        width: Some(6),
        flexible: false,
        format: |r| r.pid.to_string(),
    },
    ColumnSpec {
        key: "addr",
        label: "Addr",
        width: None,
        flexible: false,
        format: |r| r.client_address.clone().unwrap_or_default(),
    },
    ColumnSpec {
        key: "waiting",
        label: "Wait",
        width: None,
        flexible: false,
        format: |r| format_flag(r.is_waiting),
    },
    ColumnSpec {
        key: "datname",
        label: "Database",
        width: None,
        flexible: false,
        format: |r| r.database.clone(),
    },
    ColumnSpec {
        key: "usename",
        label: "User",
        width: None,
        flexible: false,
        format: |r| r.user.clone(),
    },
    ColumnSpec {
        key: "query",
        label: "Query",
        width: None,
        flexible: true,
        format: |r| collapse_whitespace(&r.query_text),
    },
    ColumnSpec {
        key: "running",
        label: "Running",
        width: None,
        flexible: false,
        format: |r| format_running(r.running_duration),
    },
    ColumnSpec {
        key: "lcksh",
        label: "LcksH",
        width: None,
        flexible: false,
        format: |r| r.held_lock_count.to_string(),
    },
    ColumnSpec {
        key: "lcksw",
        label: "LcksW",
        width: None,
        flexible: false,
        format: |r| r.waiting_lock_count.to_string(),
    },
    ColumnSpec {
        key: "state",
        label: "State",
        width: None,
        flexible: false,
        format: |r| r.state.clone(),
    },
];

/// Backend state hidden by the idle filter.
pub const IDLE_STATE: &str = "idle";

/// A session row formatted for display, one cell per entry of [`COLUMNS`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayRow {
    pub cells: Vec<String>,
}

impl DisplayRow {
    pub fn format(row: &SessionRow) -> Self {
        Self {
            cells: COLUMNS.iter().map(|c| (c.format)(row)).collect(),
        }
    }

    /// First displayed field, which identifies the backend.
    pub fn key(&self) -> &str {
        self.cells.get(PID_COLUMN).map(String::as_str).unwrap_or("")
    }
}

/// Collapses every whitespace run, newlines included, into one space.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whole seconds, or an empty string when nothing is running.
pub fn format_running(running: Option<Duration>) -> String {
    running
        .map(|d| d.as_secs().to_string())
        .unwrap_or_default()
}

pub fn format_flag(flag: bool) -> String {
    (if flag { "1" } else { "0" }).to_string()
}
