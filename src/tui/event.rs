//! Event handling for TUI.
//!
//! A separate thread polls the terminal and emits timer ticks. The database
//! worker posts its responses into the same channel, so the render loop sees
//! one ordered stream of events.

use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};

use crossterm::event::{self, Event as CrosstermEvent, KeyEvent, KeyEventKind};

use super::worker::DbResponse;

/// Application events.
#[derive(Debug)]
pub enum Event {
    /// Timer tick for data refresh.
    Tick,
    /// Keyboard input.
    Key(KeyEvent),
    /// Terminal resize (width).
    Resize(u16),
    /// Result of a database request.
    Db(DbResponse),
}

/// Event handler that polls for terminal events in a separate thread.
pub struct EventHandler {
    rx: Receiver<Event>,
    tx: Sender<Event>,
}

impl EventHandler {
    /// Creates a new event handler emitting a tick every `tick_rate`.
    ///
    /// Ticks are spaced from the previous tick, not from the last key press,
    /// so steady typing cannot hold back a refresh.
    pub fn new(tick_rate: Duration) -> Self {
        let (tx, rx) = mpsc::channel();
        let event_tx = tx.clone();

        thread::spawn(move || {
            let mut last_tick = Instant::now();
            loop {
                let timeout = tick_rate.saturating_sub(last_tick.elapsed());
                if event::poll(timeout).unwrap_or(false)
                    && let Ok(evt) = event::read()
                {
                    let event = match evt {
                        CrosstermEvent::Key(key) if key.kind == KeyEventKind::Press => {
                            Some(Event::Key(key))
                        }
                        CrosstermEvent::Resize(w, _) => Some(Event::Resize(w)),
                        _ => None,
                    };
                    if let Some(event) = event
                        && event_tx.send(event).is_err()
                    {
                        break;
                    }
                }
                if last_tick.elapsed() >= tick_rate {
                    if event_tx.send(Event::Tick).is_err() {
                        break;
                    }
                    last_tick = Instant::now();
                }
            }
        });

        Self { rx, tx }
    }

    /// Sender for other producers, such as the database worker.
    pub fn sender(&self) -> Sender<Event> {
        self.tx.clone()
    }

    /// Receives the next event, blocking until one is available.
    pub fn next(&self) -> Result<Event, mpsc::RecvError> {
        self.rx.recv()
    }

    /// Like [`EventHandler::next`], but gives up after `timeout`.
    pub fn next_timeout(&self, timeout: Duration) -> Result<Event, mpsc::RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}
