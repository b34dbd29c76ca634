//! Session state facade: the one entry point the dashboard uses to read
//! activity snapshots and run administrative calls.
//!
//! Snapshot reads always roll back so no transaction is left idle on the
//! server. Administrative calls always commit, whether or not their result
//! could be fetched.

pub mod model;
pub mod queries;

use std::fmt;

use thiserror::Error;
use tracing::{debug, info};

use crate::session::{Connection, DbError, Transport, Value};

pub use model::{COLUMNS, ColumnSpec, DisplayRow, IDLE_STATE, PID_COLUMN, QUERY_COLUMN, SessionRow};
pub use queries::{ServerVersion, build_activity_statement};

/// Administrative calls available on a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminAction {
    Cancel,
    Terminate,
    Explain,
}

impl AdminAction {
    /// Server function implementing the action, if any.
    pub fn procedure(self) -> Option<&'static str> {
        match self {
            AdminAction::Cancel => Some("pg_cancel_backend"),
            AdminAction::Terminate => Some("pg_terminate_backend"),
            AdminAction::Explain => None,
        }
    }
}

impl fmt::Display for AdminAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AdminAction::Cancel => "cancel",
            AdminAction::Terminate => "terminate",
            AdminAction::Explain => "explain",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StateError {
    #[error("connection failed: {0}")]
    Connection(#[source] DbError),
    #[error("cannot determine server version: {0}")]
    Version(String),
    #[error("snapshot fetch failed: {0}")]
    SnapshotFetch(#[source] DbError),
    #[error("{action} failed: {source}")]
    Admin {
        action: AdminAction,
        #[source]
        source: DbError,
    },
}

impl StateError {
    /// True when the dashboard cannot continue without a new connection.
    pub fn is_fatal(&self) -> bool {
        match self {
            StateError::Connection(_) | StateError::Version(_) => true,
            StateError::SnapshotFetch(e) => e.is_connection_lost(),
            StateError::Admin { .. } => false,
        }
    }
}

/// Parses a pid as displayed in the table.
pub fn parse_pid(action: AdminAction, text: &str) -> Result<i32, StateError> {
    text.trim().parse().map_err(|_| StateError::Admin {
        action,
        source: DbError::InvalidArgument(format!("malformed pid {:?}", text)),
    })
}

pub struct SessionState<T: Transport> {
    conn: Connection<T>,
    version: ServerVersion,
    activity_statement: String,
}

impl<T: Transport> SessionState<T> {
    /// Wraps an open connection and detects the server version.
    pub fn new(conn: Connection<T>) -> Result<Self, StateError> {
        let version = detect_version(&conn)?;
        debug!(%version, "detected server version");
        Ok(Self {
            activity_statement: build_activity_statement(version),
            conn,
            version,
        })
    }

    pub fn server_version(&self) -> ServerVersion {
        self.version
    }

    /// Reads one activity snapshot.
    pub fn get_activity(&self) -> Result<Vec<SessionRow>, StateError> {
        let fetched = self
            .conn
            .with_statement(&self.activity_statement, &[], |h| h.fetch_all());
        let rolled_back = self.conn.rollback();

        let rows = fetched.map_err(StateError::SnapshotFetch)?;
        rolled_back.map_err(StateError::SnapshotFetch)?;
        debug!(rows = rows.len(), "activity snapshot fetched");

        rows.iter()
            .map(SessionRow::from_row)
            .collect::<Result<_, _>>()
            .map_err(StateError::SnapshotFetch)
    }

    /// Asks the backend to cancel its current query.
    ///
    /// Returns whether the server signalled the backend.
    pub fn cancel_backend(&self, pid: i32) -> Result<bool, StateError> {
        self.signal_backend(AdminAction::Cancel, pid)
    }

    /// Asks the backend to exit.
    pub fn terminate_backend(&self, pid: i32) -> Result<bool, StateError> {
        self.signal_backend(AdminAction::Terminate, pid)
    }

    /// Returns the server's plan for `sql`, one plan line per line.
    pub fn explain_query(&self, sql: &str) -> Result<String, StateError> {
        let admin = |source| StateError::Admin {
            action: AdminAction::Explain,
            source,
        };
        let sql = sql.trim();
        if sql.is_empty() {
            return Err(admin(DbError::InvalidArgument(
                "no query to explain".to_string(),
            )));
        }

        let fetched = self
            .conn
            .with_statement(READ_ONLY_TRANSACTION, &[], |_| Ok(()))
            .and_then(|()| {
                self.conn
                    .with_statement(&explain_statement(sql), &[], |h| h.fetch_all())
            });
        let committed = self.conn.commit();

        let rows = fetched.map_err(admin)?;
        committed.map_err(admin)?;

        let plan: Vec<&str> = rows
            .iter()
            .filter_map(|row| row.value(0).and_then(Value::as_str))
            .collect();
        Ok(plan.join("\n"))
    }

    fn signal_backend(&self, action: AdminAction, pid: i32) -> Result<bool, StateError> {
        let admin = |source| StateError::Admin { action, source };
        let procedure = action.procedure().ok_or_else(|| {
            admin(DbError::InvalidArgument(format!("{} is not a signal", action)))
        })?;

        info!(pid, %action, "signalling backend");
        let fetched = self
            .conn
            .with_procedure(procedure, &[Value::from(pid)], |h| h.fetch_one());
        let committed = self.conn.commit();

        let row = fetched.map_err(admin)?;
        committed.map_err(admin)?;

        let signalled = row
            .and_then(|r| r.value(0).and_then(Value::as_bool))
            .ok_or_else(|| admin(DbError::Query(format!("{} returned no result", procedure))))?;
        info!(pid, %action, signalled, "backend signal result");
        Ok(signalled)
    }

    pub fn in_transaction(&self) -> bool {
        self.conn.in_transaction()
    }

    /// Closes the connection and every handle still registered on it.
    pub fn close(&self) {
        self.conn.close();
    }
}

/// First statement of the explain transaction.
const READ_ONLY_TRANSACTION: &str = "SET TRANSACTION READ ONLY";

/// Plans `sql` without running it. With an option list present, a leading
/// `ANALYZE` or `(ANALYZE)` in `sql` is a syntax error instead of an option.
fn explain_statement(sql: &str) -> String {
    format!("EXPLAIN (FORMAT TEXT) {}", sql)
}

fn detect_version<T: Transport>(conn: &Connection<T>) -> Result<ServerVersion, StateError> {
    let fetched = conn.with_procedure("version", &[], |h| h.fetch_one());
    let rolled_back = conn.rollback();

    let classify = |e: DbError| {
        if e.is_connection_lost() {
            StateError::Connection(e)
        } else {
            StateError::Version(e.to_string())
        }
    };
    let row = fetched.map_err(classify)?;
    rolled_back.map_err(classify)?;

    let text = row
        .as_ref()
        .and_then(|r| r.value(0))
        .and_then(Value::as_str)
        .ok_or_else(|| StateError::Version("version() returned nothing".to_string()))?;
    ServerVersion::parse(text)
        .ok_or_else(|| StateError::Version(format!("unrecognised version string {:?}", text)))
}
