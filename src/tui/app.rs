//! Main TUI application.

use std::io;
use std::sync::mpsc::RecvTimeoutError;
use std::time::{Duration, Instant};

use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::{Backend, CrosstermBackend};
use thiserror::Error;
use tracing::{error, info};

use crate::activity::{AdminAction, ServerVersion, SessionState, StateError};
use crate::session::Transport;

use super::actions;
use super::event::{Event, EventHandler};
use super::input::{KeyAction, handle_key};
use super::render::render;
use super::state::AppState;
use super::worker::{Requester, Worker};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("terminal error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    State(#[from] StateError),
}

/// Startup options of the dashboard.
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Time between two activity polls.
    pub interval: Duration,
    pub show_idle: bool,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            show_idle: false,
        }
    }
}

/// Main TUI application.
pub struct App {
    state: AppState,
    interval: Duration,
    should_quit: bool,
}

impl App {
    pub fn new(server_version: ServerVersion, options: &AppOptions) -> Self {
        Self {
            state: AppState::new(server_version, options.show_idle, 0),
            interval: options.interval,
            should_quit: false,
        }
    }

    /// Runs the dashboard until the operator quits or the connection is
    /// lost. The session is closed before this returns.
    pub fn run<T: Transport + 'static>(mut self, session: SessionState<T>) -> Result<(), AppError> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        if let Err(e) = execute!(stdout, EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(e.into());
        }
        let mut terminal = match Terminal::new(CrosstermBackend::new(stdout)) {
            Ok(terminal) => terminal,
            Err(e) => {
                let _ = execute!(io::stdout(), LeaveAlternateScreen);
                let _ = disable_raw_mode();
                return Err(e.into());
            }
        };

        let result = self.event_loop(&mut terminal, session);

        disable_raw_mode()?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    fn event_loop<B: Backend, T: Transport + 'static>(
        &mut self,
        terminal: &mut Terminal<B>,
        session: SessionState<T>,
    ) -> Result<(), AppError> {
        let events = EventHandler::new(self.interval);
        let mut worker = Worker::spawn(session, events.sender())?;
        let requester = worker.requester();

        if let Ok(size) = terminal.size() {
            self.state.table.resize(size.width);
        }
        actions::request_activity(&mut self.state, &requester);

        let mut outcome = Ok(());
        while !self.should_quit {
            self.state.expire_toast(Instant::now());
            terminal.draw(|frame| render(frame, &mut self.state))?;

            let event = match self.state.toast_remaining(Instant::now()) {
                Some(remaining) => match events.next_timeout(remaining) {
                    Ok(event) => event,
                    // Toast is due: redraw without it.
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                },
                None => match events.next() {
                    Ok(event) => event,
                    Err(_) => break,
                },
            };
            if let Err(e) = self.handle_event(event, &requester) {
                error!(error = %e, "fatal database error");
                outcome = Err(e.into());
                break;
            }
        }

        info!("shutting down");
        worker.shutdown();
        outcome
    }

    fn handle_event(&mut self, event: Event, requester: &Requester) -> Result<(), StateError> {
        match event {
            Event::Tick => {
                if !self.state.paused {
                    actions::request_activity(&mut self.state, requester);
                }
            }
            Event::Key(key) => match handle_key(&mut self.state, key) {
                KeyAction::None => {}
                KeyAction::Quit => self.should_quit = true,
                KeyAction::Cancel => {
                    actions::request_signal(&mut self.state, requester, AdminAction::Cancel)
                }
                KeyAction::Terminate => {
                    actions::request_signal(&mut self.state, requester, AdminAction::Terminate)
                }
                KeyAction::Explain => actions::request_explain(&mut self.state, requester),
                KeyAction::CopyQuery => {
                    actions::copy_selected_query(&mut self.state, &mut io::stdout())
                }
            },
            Event::Resize(width) => self.state.table.resize(width),
            Event::Db(response) => actions::apply_response(&mut self.state, response)?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

    use super::*;
    use crate::activity::{QUERY_COLUMN, SessionRow};
    use crate::session::DbError;
    use crate::tui::table::FIXED_MARGIN;
    use crate::tui::worker::{self, DbRequest, DbResponse};

    fn app() -> App {
        App::new(ServerVersion::new(16, 2), &AppOptions::default())
    }

    fn session(pid: i32) -> SessionRow {
        SessionRow {
            pid,
            client_address: None,
            is_waiting: false,
            database: "shop".into(),
            user: "alice".into(),
            query_text: "SELECT 1".into(),
            running_duration: Some(Duration::from_secs(3)),
            held_lock_count: 0,
            waiting_lock_count: 0,
            state: "active".into(),
        }
    }

    #[test]
    fn tick_polls_only_while_live() {
        let mut app = app();
        let (requester, inbox) = worker::channel();

        app.state.paused = true;
        app.handle_event(Event::Tick, &requester).unwrap();
        assert!(inbox.try_recv().is_err());

        app.state.paused = false;
        app.handle_event(Event::Tick, &requester).unwrap();
        app.handle_event(Event::Tick, &requester).unwrap();
        let queued: Vec<_> = inbox.try_iter().collect();
        assert_eq!(queued, vec![Some(DbRequest::Activity)]);
    }

    #[test]
    fn answered_poll_rearms_ticks() {
        let mut app = app();
        let (requester, inbox) = worker::channel();

        app.handle_event(Event::Tick, &requester).unwrap();
        assert_eq!(inbox.try_iter().count(), 1);

        app.handle_event(
            Event::Db(DbResponse::Activity(Ok(vec![session(1), session(2)]))),
            &requester,
        )
        .unwrap();
        assert_eq!(app.state.table.rows().len(), 2);

        app.handle_event(Event::Tick, &requester).unwrap();
        assert_eq!(inbox.try_iter().count(), 1);
    }

    #[test]
    fn resize_reallocates_query_column() {
        let mut app = app();
        let (requester, _inbox) = worker::channel();
        app.state.table.on_snapshot_replaced(vec![session(1)]);
        assert_eq!(app.state.table.widths()[QUERY_COLUMN], 0);

        app.handle_event(Event::Resize(160), &requester).unwrap();

        let widths = app.state.table.widths();
        assert!(widths[QUERY_COLUMN] > 0);
        assert_eq!(widths.iter().sum::<u16>(), 160 - FIXED_MARGIN);
    }

    #[test]
    fn lost_connection_ends_session() {
        let mut app = app();
        let (requester, _inbox) = worker::channel();
        let err = app
            .handle_event(
                Event::Db(DbResponse::Activity(Err(StateError::SnapshotFetch(
                    DbError::Connection("server closed the connection".into()),
                )))),
                &requester,
            )
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn quit_key_stops_loop() {
        let mut app = app();
        let (requester, _inbox) = worker::channel();
        app.handle_event(
            Event::Key(KeyEvent::new(KeyCode::Char('q'), KeyModifiers::NONE)),
            &requester,
        )
        .unwrap();
        assert!(app.should_quit);
    }
}
