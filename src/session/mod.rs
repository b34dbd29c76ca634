//! Server connection with tracked result handles.
//!
//! Every `execute`/`call_procedure` registers a cursor in the connection's
//! registry and hands back a [`Handle`] that only holds a weak reference to
//! it. Cursors are released exactly once: by [`Handle::close`], by
//! [`Connection::close`] (which force-closes whatever is still registered),
//! or, as a last resort, when a forgotten handle is dropped.

pub mod mock;
mod pg;
mod transport;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use thiserror::Error;
use tracing::{debug, trace, warn};

pub use pg::{PgCursor, PgTransport, connect};
pub use transport::{Row, Transport, Value};

/// Error raised by the data-access layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DbError {
    /// The server cannot be reached or the session was lost.
    #[error("connection failed: {0}")]
    Connection(String),
    /// The server rejected or failed a statement.
    #[error("{0}")]
    Query(String),
    /// The connection or handle was already closed.
    #[error("connection is closed")]
    Closed,
    /// Rejected before reaching the server.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl DbError {
    /// True when no further statement can succeed on this connection.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, DbError::Connection(_) | DbError::Closed)
    }
}

/// Registry key of one outstanding cursor.
pub type HandleId = u64;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Connection state shared between a [`Connection`] and its handles.
struct Registry<T: Transport> {
    transport: T,
    cursors: HashMap<HandleId, T::Cursor>,
    next_id: HandleId,
    in_transaction: bool,
    closed: bool,
}

impl<T: Transport> Registry<T> {
    fn open(&mut self, sql: &str, params: &[Value]) -> Result<HandleId, DbError> {
        if self.closed {
            return Err(DbError::Closed);
        }
        if !self.in_transaction {
            self.transport.begin()?;
            self.in_transaction = true;
        }

        let mut cursor = self.transport.cursor()?;
        if let Err(e) = self.transport.execute(&mut cursor, sql, params) {
            if let Err(close_err) = self.transport.close_cursor(cursor) {
                debug!(error = %close_err, "closing cursor after failed execute");
            }
            return Err(e);
        }

        let id = self.next_id;
        self.next_id += 1;
        self.cursors.insert(id, cursor);
        trace!(handle = id, live = self.cursors.len(), "handle opened");
        Ok(id)
    }

    fn fetch(&mut self, id: HandleId) -> Result<Option<Row>, DbError> {
        let cursor = self.cursors.get_mut(&id).ok_or(DbError::Closed)?;
        self.transport.fetch(cursor)
    }

    /// Removes and closes one cursor. Unknown ids were already released.
    fn release(&mut self, id: HandleId) -> Result<(), DbError> {
        match self.cursors.remove(&id) {
            Some(cursor) => {
                trace!(handle = id, live = self.cursors.len(), "handle closed");
                self.transport.close_cursor(cursor)
            }
            None => Ok(()),
        }
    }

    fn finish_transaction(&mut self, commit: bool) -> Result<(), DbError> {
        if self.closed {
            return Err(DbError::Closed);
        }
        if !self.in_transaction {
            return Ok(());
        }
        self.in_transaction = false;
        if commit {
            self.transport.commit()
        } else {
            self.transport.rollback()
        }
    }

    /// Force-closes every registered cursor, then the transport.
    fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.in_transaction = false;

        let leftover = self.cursors.len();
        if leftover > 0 {
            debug!(leftover, "force-closing handles on connection close");
        }
        for (id, cursor) in self.cursors.drain() {
            if let Err(e) = self.transport.close_cursor(cursor) {
                warn!(handle = id, error = %e, "failed to close handle during shutdown");
            }
        }
        if let Err(e) = self.transport.close() {
            warn!(error = %e, "failed to close connection");
        }
    }
}

impl<T: Transport> Drop for Registry<T> {
    fn drop(&mut self) {
        if !self.closed {
            debug!("connection dropped without close");
            self.shutdown();
        }
    }
}

/// One live server connection and the set of handles opened on it.
pub struct Connection<T: Transport> {
    registry: Arc<Mutex<Registry<T>>>,
}

impl<T: Transport> Connection<T> {
    pub fn new(transport: T) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                transport,
                cursors: HashMap::new(),
                next_id: 1,
                in_transaction: false,
                closed: false,
            })),
        }
    }

    /// Executes a statement and returns a handle to its result.
    ///
    /// Opens a transaction first if none is active.
    pub fn execute(&self, sql: &str, params: &[Value]) -> Result<Handle<T>, DbError> {
        let id = lock(&self.registry).open(sql, params)?;
        Ok(Handle {
            id,
            registry: Arc::downgrade(&self.registry),
            closed: false,
        })
    }

    /// Calls a server function as `SELECT * FROM name($1, ...)`.
    pub fn call_procedure(&self, name: &str, params: &[Value]) -> Result<Handle<T>, DbError> {
        let sql = procedure_statement(name, params.len())?;
        self.execute(&sql, params)
    }

    /// Runs `f` on a fresh statement handle and always closes it afterwards.
    ///
    /// An error from `f` wins over an error from closing the handle.
    pub fn with_statement<R>(
        &self,
        sql: &str,
        params: &[Value],
        f: impl FnOnce(&mut Handle<T>) -> Result<R, DbError>,
    ) -> Result<R, DbError> {
        let handle = self.execute(sql, params)?;
        scoped(handle, f)
    }

    /// Procedure-call counterpart of [`Connection::with_statement`].
    pub fn with_procedure<R>(
        &self,
        name: &str,
        params: &[Value],
        f: impl FnOnce(&mut Handle<T>) -> Result<R, DbError>,
    ) -> Result<R, DbError> {
        let handle = self.call_procedure(name, params)?;
        scoped(handle, f)
    }

    pub fn commit(&self) -> Result<(), DbError> {
        lock(&self.registry).finish_transaction(true)
    }

    pub fn rollback(&self) -> Result<(), DbError> {
        lock(&self.registry).finish_transaction(false)
    }

    /// Closes all outstanding handles and the connection. Idempotent.
    ///
    /// Errors from individual handles or from the transport are logged and
    /// swallowed so that one faulty cursor never blocks the rest.
    pub fn close(&self) {
        lock(&self.registry).shutdown();
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.registry).closed
    }

    /// True while a transaction opened by `execute` is neither committed
    /// nor rolled back.
    pub fn in_transaction(&self) -> bool {
        lock(&self.registry).in_transaction
    }

    /// Number of handles registered and not yet closed.
    pub fn live_handles(&self) -> usize {
        lock(&self.registry).cursors.len()
    }
}

fn scoped<T: Transport, R>(
    mut handle: Handle<T>,
    f: impl FnOnce(&mut Handle<T>) -> Result<R, DbError>,
) -> Result<R, DbError> {
    let result = f(&mut handle);
    let closed = handle.close();
    match (result, closed) {
        (Err(e), _) => Err(e),
        (Ok(_), Err(e)) => Err(e),
        (Ok(value), Ok(())) => Ok(value),
    }
}

/// Result handle for one executed statement.
///
/// Holds only a weak reference to the connection, so an unreleased handle
/// never keeps the connection alive.
pub struct Handle<T: Transport> {
    id: HandleId,
    registry: Weak<Mutex<Registry<T>>>,
    closed: bool,
}

impl<T: Transport> Handle<T> {
    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Fetches the next row, or `None` when the result is exhausted.
    pub fn fetch_one(&mut self) -> Result<Option<Row>, DbError> {
        if self.closed {
            return Err(DbError::Closed);
        }
        let registry = self.registry.upgrade().ok_or(DbError::Closed)?;
        let mut registry = lock(&registry);
        registry.fetch(self.id)
    }

    /// Fetches all remaining rows.
    pub fn fetch_all(&mut self) -> Result<Vec<Row>, DbError> {
        let mut rows = Vec::new();
        while let Some(row) = self.fetch_one()? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Releases the cursor. Closing twice is a no-op.
    ///
    /// If the connection is already gone its shutdown released the cursor,
    /// so there is nothing left to do.
    pub fn close(&mut self) -> Result<(), DbError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        match self.registry.upgrade() {
            Some(registry) => lock(&registry).release(self.id),
            None => Ok(()),
        }
    }
}

impl<T: Transport> Drop for Handle<T> {
    fn drop(&mut self) {
        if !self.closed {
            warn!(handle = self.id, "result handle dropped without close");
            if let Err(e) = self.close() {
                debug!(handle = self.id, error = %e, "close on drop failed");
            }
        }
    }
}

/// Builds the statement used to call a server function.
fn procedure_statement(name: &str, arity: usize) -> Result<String, DbError> {
    if !is_procedure_name(name) {
        return Err(DbError::InvalidArgument(format!(
            "invalid procedure name {:?}",
            name
        )));
    }
    let placeholders: Vec<String> = (1..=arity).map(|i| format!("${}", i)).collect();
    Ok(format!(
        "SELECT * FROM {}({})",
        name,
        placeholders.join(", ")
    ))
}

/// Accepts `func` or `schema.func` made of plain identifier characters.
fn is_procedure_name(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() <= 2
        && parts.iter().all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        })
}
