//! Database worker thread.
//!
//! Owns the session state facade and serves requests strictly in order, so
//! the render loop never blocks on the server.

use std::io;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::activity::{AdminAction, SessionRow, SessionState, StateError};
use crate::session::Transport;

use super::event::Event;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbRequest {
    Activity,
    Cancel { pid: i32 },
    Terminate { pid: i32 },
    Explain { pid: i32, query: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum DbResponse {
    Activity(Result<Vec<SessionRow>, StateError>),
    Signalled {
        action: AdminAction,
        pid: i32,
        result: Result<bool, StateError>,
    },
    Plan {
        pid: i32,
        query: String,
        result: Result<String, StateError>,
    },
}

/// Runs one request against the facade.
pub fn serve<T: Transport>(state: &SessionState<T>, request: DbRequest) -> DbResponse {
    match request {
        DbRequest::Activity => DbResponse::Activity(state.get_activity()),
        DbRequest::Cancel { pid } => DbResponse::Signalled {
            action: AdminAction::Cancel,
            pid,
            result: state.cancel_backend(pid),
        },
        DbRequest::Terminate { pid } => DbResponse::Signalled {
            action: AdminAction::Terminate,
            pid,
            result: state.terminate_backend(pid),
        },
        DbRequest::Explain { pid, query } => {
            let result = state.explain_query(&query);
            DbResponse::Plan { pid, query, result }
        }
    }
}

/// Worker inbox entry; `None` asks the worker to stop.
pub type Message = Option<DbRequest>;

/// Creates a request channel.
pub fn channel() -> (Requester, Receiver<Message>) {
    let (tx, rx) = mpsc::channel();
    (Requester { tx }, rx)
}

/// Cloneable handle for submitting requests to the worker.
#[derive(Debug, Clone)]
pub struct Requester {
    tx: Sender<Message>,
}

impl Requester {
    /// Queues a request. Returns false once the worker has stopped.
    pub fn send(&self, request: DbRequest) -> bool {
        match self.tx.send(Some(request)) {
            Ok(()) => true,
            Err(e) => {
                warn!(request = ?e.0, "database worker is gone");
                false
            }
        }
    }

    fn stop(&self) {
        // Already gone when the worker exited on its own.
        let _ = self.tx.send(None);
    }
}

pub struct Worker {
    requester: Requester,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Moves `state` onto a dedicated thread. Responses are posted to
    /// `events` as [`Event::Db`].
    pub fn spawn<T: Transport + 'static>(
        state: SessionState<T>,
        events: Sender<Event>,
    ) -> io::Result<Self> {
        let (requester, inbox) = channel();
        let handle = thread::Builder::new()
            .name("pgpeek-db".to_string())
            .spawn(move || {
                for request in inbox.iter().map_while(|message| message) {
                    debug!(?request, "serving database request");
                    if events.send(Event::Db(serve(&state, request))).is_err() {
                        break;
                    }
                }
                debug!("database worker stopping");
                state.close();
            })?;
        Ok(Self {
            requester,
            handle: Some(handle),
        })
    }

    pub fn requester(&self) -> Requester {
        self.requester.clone()
    }

    /// Lets already queued requests finish, then waits for the worker to
    /// close the connection. Idempotent.
    pub fn shutdown(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.requester.stop();
            if handle.join().is_err() {
                warn!("database worker panicked");
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::activity::fixtures::{activity_row, server};
    use crate::session::Connection;
    use crate::session::mock::MockEvent;

    #[test]
    fn serve_maps_requests_to_facade_calls() {
        let mock = server(vec![activity_row(100, "active", Some(5.0), "SELECT 1")]);
        let state = SessionState::new(Connection::new(mock)).unwrap();

        match serve(&state, DbRequest::Activity) {
            DbResponse::Activity(Ok(rows)) => assert_eq!(rows[0].pid, 100),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            serve(&state, DbRequest::Cancel { pid: 100 }),
            DbResponse::Signalled {
                action: AdminAction::Cancel,
                pid: 100,
                result: Ok(true),
            }
        );
        match serve(
            &state,
            DbRequest::Explain {
                pid: 100,
                query: "SELECT 1".into(),
            },
        ) {
            DbResponse::Plan { pid, query, result } => {
                assert_eq!(pid, 100);
                assert_eq!(query, "SELECT 1");
                assert!(result.unwrap().starts_with("Seq Scan"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn worker_posts_responses_and_closes_on_shutdown() {
        let mock = server(vec![activity_row(7, "active", None, "SELECT 1")]);
        let log = mock.log();
        let state = SessionState::new(Connection::new(mock)).unwrap();
        let (events_tx, events_rx) = mpsc::channel();

        let mut worker = Worker::spawn(state, events_tx).unwrap();
        let requester = worker.requester();
        assert!(requester.send(DbRequest::Terminate { pid: 7 }));

        match events_rx.recv_timeout(Duration::from_secs(5)).unwrap() {
            Event::Db(DbResponse::Signalled { pid, result, .. }) => {
                assert_eq!(pid, 7);
                assert_eq!(result, Ok(true));
            }
            other => panic!("unexpected {other:?}"),
        }

        worker.shutdown();
        assert_eq!(log.count(&MockEvent::Close), 1);
        assert!(log.open_cursors().is_empty());
        assert!(!requester.send(DbRequest::Activity));
    }
}
