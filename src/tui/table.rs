//! Live activity table: idle filter, selection restore and column layout.
//!
//! Every snapshot replaces the whole row set. The selected backend is
//! carried over by its pid cell, since snapshots are ordered by running
//! time and rows move between polls.

use ratatui::widgets::TableState;

use crate::activity::{COLUMNS, DisplayRow, IDLE_STATE, SessionRow};

/// Horizontal cells not given to any column: nine column gaps plus one.
pub const FIXED_MARGIN: u16 = 10;

#[derive(Debug, Default)]
pub struct ActivityTable {
    raw: Vec<SessionRow>,
    rows: Vec<DisplayRow>,
    show_idle: bool,
    widths: Vec<u16>,
    terminal_width: u16,
    /// Selection as rendered by ratatui.
    pub ratatui_state: TableState,
}

impl ActivityTable {
    pub fn new(show_idle: bool, terminal_width: u16) -> Self {
        let mut table = Self {
            show_idle,
            terminal_width,
            ..Self::default()
        };
        table.relayout();
        table
    }

    /// Replaces the held snapshot and refreshes filter, selection and
    /// layout in one step.
    pub fn on_snapshot_replaced(&mut self, raw: Vec<SessionRow>) {
        self.raw = raw;
        self.rebuild();
    }

    /// Flips idle visibility over the snapshot already held.
    pub fn toggle_idle(&mut self) -> bool {
        self.show_idle = !self.show_idle;
        self.rebuild();
        self.show_idle
    }

    pub fn resize(&mut self, terminal_width: u16) {
        if self.terminal_width != terminal_width {
            self.terminal_width = terminal_width;
            self.relayout();
        }
    }

    fn rebuild(&mut self) {
        let remembered = self.selected_row().map(|row| row.key().to_string());

        let show_idle = self.show_idle;
        self.rows = self
            .raw
            .iter()
            .filter(|row| show_idle || row.state != IDLE_STATE)
            .map(DisplayRow::format)
            .collect();

        let restored =
            remembered.and_then(|key| self.rows.iter().position(|row| row.key() == key));
        let selection = if self.rows.is_empty() {
            None
        } else {
            Some(restored.unwrap_or(0))
        };
        self.ratatui_state.select(selection);

        self.relayout();
    }

    fn relayout(&mut self) {
        self.widths = allocate_widths(&self.rows, self.terminal_width);
    }

    pub fn rows(&self) -> &[DisplayRow] {
        &self.rows
    }

    /// Column widths, one per entry of [`COLUMNS`].
    pub fn widths(&self) -> &[u16] {
        &self.widths
    }

    /// Number of backends in the held snapshot, idle ones included.
    pub fn total(&self) -> usize {
        self.raw.len()
    }

    pub fn show_idle(&self) -> bool {
        self.show_idle
    }

    pub fn selected_row(&self) -> Option<&DisplayRow> {
        self.ratatui_state
            .selected()
            .and_then(|idx| self.rows.get(idx))
    }

    /// Unformatted query text of `pid` from the held snapshot.
    pub fn raw_query_for(&self, pid: i32) -> Option<&str> {
        self.raw
            .iter()
            .find(|row| row.pid == pid)
            .map(|row| row.query_text.as_str())
    }

    pub fn session(&self, pid: i32) -> Option<&SessionRow> {
        self.raw.iter().find(|row| row.pid == pid)
    }

    pub fn move_up(&mut self, n: usize) {
        if let Some(idx) = self.ratatui_state.selected() {
            self.ratatui_state.select(Some(idx.saturating_sub(n)));
        }
    }

    pub fn move_down(&mut self, n: usize) {
        let Some(last) = self.rows.len().checked_sub(1) else {
            return;
        };
        let idx = self.ratatui_state.selected().unwrap_or(0);
        self.ratatui_state.select(Some(idx.saturating_add(n).min(last)));
    }

    pub fn select_first(&mut self) {
        if !self.rows.is_empty() {
            self.ratatui_state.select(Some(0));
        }
    }

    pub fn select_last(&mut self) {
        if let Some(last) = self.rows.len().checked_sub(1) {
            self.ratatui_state.select(Some(last));
        }
    }
}

fn text_width(text: &str) -> u16 {
    u16::try_from(text.chars().count()).unwrap_or(u16::MAX)
}

/// Sizes every column to fit its label and content; the flexible column
/// takes what is left of `terminal_width`.
///
/// On narrow terminals the flexible column shrinks to zero and the other
/// columns keep their natural width.
pub fn allocate_widths(rows: &[DisplayRow], terminal_width: u16) -> Vec<u16> {
    let mut widths: Vec<u16> = COLUMNS
        .iter()
        .enumerate()
        .map(|(idx, column)| {
            let longest = rows
                .iter()
                .filter_map(|row| row.cells.get(idx))
                .map(|cell| text_width(cell))
                .max()
                .unwrap_or(0);
            column
                .width
                .unwrap_or(0)
                .max(text_width(column.label))
                .max(longest)
        })
        .collect();

    let fixed: u16 = COLUMNS
        .iter()
        .zip(&widths)
        .filter(|(column, _)| !column.flexible)
        .fold(0u16, |acc, (_, w)| acc.saturating_add(*w));
    let remaining = terminal_width
        .saturating_sub(fixed)
        .saturating_sub(FIXED_MARGIN);

    for (column, width) in COLUMNS.iter().zip(widths.iter_mut()) {
        if column.flexible {
            *width = remaining;
        }
    }
    widths
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::activity::QUERY_COLUMN;

    fn session(pid: i32, state: &str, query: &str) -> SessionRow {
        SessionRow {
            pid,
            client_address: Some("127.0.0.1:40000".into()),
            is_waiting: false,
            database: "db".into(),
            user: "u".into(),
            query_text: query.into(),
            running_duration: Some(Duration::from_secs(pid as u64)),
            held_lock_count: 0,
            waiting_lock_count: 0,
            state: state.into(),
        }
    }

    fn pids(table: &ActivityTable) -> Vec<String> {
        table.rows().iter().map(|r| r.key().to_string()).collect()
    }

    fn selected(table: &ActivityTable) -> Option<String> {
        table.selected_row().map(|r| r.key().to_string())
    }

    #[test]
    fn first_snapshot_selects_first_row() {
        let mut table = ActivityTable::new(true, 200);
        assert_eq!(table.ratatui_state.selected(), None);
        table.on_snapshot_replaced(vec![session(1, "active", "a"), session(2, "active", "b")]);
        assert_eq!(selected(&table).as_deref(), Some("1"));
    }

    #[test]
    fn selection_follows_pid_across_reorder() {
        let mut table = ActivityTable::new(true, 200);
        table.on_snapshot_replaced(vec![
            session(1, "active", "a"),
            session(2, "active", "b"),
            session(3, "active", "c"),
        ]);
        table.move_down(1);
        assert_eq!(selected(&table).as_deref(), Some("2"));

        table.on_snapshot_replaced(vec![
            session(3, "active", "c"),
            session(4, "active", "d"),
            session(1, "active", "a"),
            session(2, "active", "b"),
        ]);

        assert_eq!(table.ratatui_state.selected(), Some(3));
        assert_eq!(selected(&table).as_deref(), Some("2"));
    }

    #[test]
    fn selection_resets_when_pid_disappears() {
        let mut table = ActivityTable::new(true, 200);
        table.on_snapshot_replaced(vec![session(1, "active", "a"), session(2, "active", "b")]);
        table.select_last();

        table.on_snapshot_replaced(vec![session(5, "active", "e"), session(1, "active", "a")]);

        assert_eq!(table.ratatui_state.selected(), Some(0));
        assert_eq!(selected(&table).as_deref(), Some("5"));
    }

    #[test]
    fn empty_snapshot_clears_selection() {
        let mut table = ActivityTable::new(true, 200);
        table.on_snapshot_replaced(vec![session(1, "active", "a")]);
        table.on_snapshot_replaced(vec![]);
        assert_eq!(table.ratatui_state.selected(), None);
        assert!(table.selected_row().is_none());
        table.move_down(3);
        assert_eq!(table.ratatui_state.selected(), None);
    }

    #[test]
    fn idle_toggle_removes_and_restores_exactly_idle_rows() {
        let mut table = ActivityTable::new(true, 200);
        table.on_snapshot_replaced(vec![
            session(1, "active", "a"),
            session(2, "idle", "b"),
            session(3, "idle in transaction", "c"),
            session(4, "idle", "d"),
            session(5, "active", "e"),
        ]);
        assert_eq!(pids(&table), ["1", "2", "3", "4", "5"]);

        assert!(!table.toggle_idle());
        assert_eq!(pids(&table), ["1", "3", "5"]);
        assert_eq!(table.total(), 5);

        assert!(table.toggle_idle());
        assert_eq!(pids(&table), ["1", "2", "3", "4", "5"]);
    }

    #[test]
    fn hiding_idle_keeps_selected_active_row() {
        let mut table = ActivityTable::new(true, 200);
        table.on_snapshot_replaced(vec![
            session(1, "idle", "a"),
            session(2, "active", "b"),
        ]);
        table.move_down(1);
        table.toggle_idle();
        assert_eq!(selected(&table).as_deref(), Some("2"));
        assert_eq!(table.ratatui_state.selected(), Some(0));
    }

    #[test]
    fn widths_fill_terminal_minus_margin() {
        let mut table = ActivityTable::new(true, 180);
        table.on_snapshot_replaced(vec![
            session(123456, "active", "SELECT\n  a_very_long_column_name FROM t"),
            session(7, "idle in transaction", "x"),
        ]);

        let widths = table.widths();
        let total: u16 = widths.iter().sum();
        assert_eq!(total, 180 - FIXED_MARGIN);

        for (idx, column) in COLUMNS.iter().enumerate() {
            if column.flexible {
                continue;
            }
            let longest = table
                .rows()
                .iter()
                .map(|r| r.cells[idx].chars().count() as u16)
                .max()
                .unwrap_or(0);
            assert!(widths[idx] >= column.label.len() as u16, "{}", column.key);
            assert!(widths[idx] >= longest, "{}", column.key);
        }
        assert_eq!(widths[COLUMNS.len() - 1], "idle in transaction".len() as u16);
    }

    #[test]
    fn resize_recomputes_flexible_column() {
        let mut table = ActivityTable::new(true, 150);
        table.on_snapshot_replaced(vec![session(1, "active", "SELECT 1")]);
        let before = table.widths()[QUERY_COLUMN];
        table.resize(170);
        assert_eq!(table.widths()[QUERY_COLUMN], before + 20);
        let total: u16 = table.widths().iter().sum();
        assert_eq!(total, 170 - FIXED_MARGIN);
    }

    #[test]
    fn narrow_terminal_starves_only_the_query_column() {
        let widths = allocate_widths(&[], 20);
        assert_eq!(widths[QUERY_COLUMN], 0);
        assert_eq!(widths[0], 6);
        assert_eq!(widths[2], "Wait".len() as u16);
    }

    #[test]
    fn raw_query_comes_from_unformatted_snapshot() {
        let mut table = ActivityTable::new(false, 120);
        table.on_snapshot_replaced(vec![session(9, "active", "SELECT\n\t1")]);
        assert_eq!(table.rows()[0].cells[QUERY_COLUMN], "SELECT 1");
        assert_eq!(table.raw_query_for(9), Some("SELECT\n\t1"));
        assert_eq!(table.raw_query_for(10), None);
    }

    #[test]
    fn paging_is_bounded() {
        let mut table = ActivityTable::new(true, 120);
        table.on_snapshot_replaced((1..=5).map(|p| session(p, "active", "q")).collect());
        table.move_down(100);
        assert_eq!(table.ratatui_state.selected(), Some(4));
        table.move_up(2);
        assert_eq!(table.ratatui_state.selected(), Some(2));
        table.move_up(100);
        assert_eq!(table.ratatui_state.selected(), Some(0));
        table.select_last();
        table.select_first();
        assert_eq!(table.ratatui_state.selected(), Some(0));
    }
}
