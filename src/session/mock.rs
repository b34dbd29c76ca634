//! Scripted transport for exercising the registry and everything above it
//! without a server.
//!
//! Responses are keyed by SQL substring; the first rule whose pattern occurs
//! in the statement applies. Unmatched statements yield an empty result.

use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, Mutex};

use super::{DbError, Row, Transport, Value, lock};

/// Everything the mock saw, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum MockEvent {
    Begin,
    Commit,
    Rollback,
    Execute { sql: String, params: Vec<Value> },
    CursorClosed { cursor: u64 },
    Close,
}

#[derive(Debug, Default)]
struct Journal {
    events: Vec<MockEvent>,
    open_cursors: BTreeSet<u64>,
}

/// Shared view on the mock's journal, usable after the transport has been
/// moved into a connection.
#[derive(Debug, Clone, Default)]
pub struct MockLog(Arc<Mutex<Journal>>);

impl MockLog {
    pub fn events(&self) -> Vec<MockEvent> {
        lock(&self.0).events.clone()
    }

    /// SQL text of every executed statement.
    pub fn executed(&self) -> Vec<String> {
        lock(&self.0)
            .events
            .iter()
            .filter_map(|e| match e {
                MockEvent::Execute { sql, .. } => Some(sql.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, event: &MockEvent) -> usize {
        self.count_matching(|e| e == event)
    }

    pub fn count_matching(&self, pred: impl Fn(&MockEvent) -> bool) -> usize {
        lock(&self.0).events.iter().filter(|e| pred(e)).count()
    }

    /// Cursors allocated and not yet closed.
    pub fn open_cursors(&self) -> Vec<u64> {
        lock(&self.0).open_cursors.iter().copied().collect()
    }

    pub fn clear(&self) {
        lock(&self.0).events.clear();
    }

    fn push(&self, event: MockEvent) {
        lock(&self.0).events.push(event);
    }
}

#[derive(Debug, Clone, Default)]
struct Rule {
    pattern: String,
    rows: Vec<Row>,
    execute_error: Option<DbError>,
    fetch_error: Option<DbError>,
    close_error: Option<DbError>,
}

#[derive(Debug)]
pub struct MockCursor {
    id: u64,
    rows: VecDeque<Row>,
    fetch_error: Option<DbError>,
    close_error: Option<DbError>,
}

#[derive(Debug, Default)]
pub struct MockTransport {
    rules: Vec<Rule>,
    log: MockLog,
    next_cursor: u64,
    commit_error: Option<DbError>,
    close_error: Option<DbError>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> MockLog {
        self.log.clone()
    }

    /// Statements containing `pattern` return `rows`.
    pub fn respond(mut self, pattern: &str, rows: Vec<Row>) -> Self {
        self.rule(pattern).rows = rows;
        self
    }

    pub fn fail_execute(mut self, pattern: &str, err: DbError) -> Self {
        self.rule(pattern).execute_error = Some(err);
        self
    }

    pub fn fail_fetch(mut self, pattern: &str, err: DbError) -> Self {
        self.rule(pattern).fetch_error = Some(err);
        self
    }

    /// Closing a cursor opened for `pattern` reports `err`. The cursor is
    /// still gone afterwards.
    pub fn fail_close_cursor(mut self, pattern: &str, err: DbError) -> Self {
        self.rule(pattern).close_error = Some(err);
        self
    }

    pub fn fail_commit(mut self, err: DbError) -> Self {
        self.commit_error = Some(err);
        self
    }

    pub fn fail_close(mut self, err: DbError) -> Self {
        self.close_error = Some(err);
        self
    }

    fn rule(&mut self, pattern: &str) -> &mut Rule {
        let idx = match self.rules.iter().position(|r| r.pattern == pattern) {
            Some(idx) => idx,
            None => {
                self.rules.push(Rule {
                    pattern: pattern.to_string(),
                    ..Rule::default()
                });
                self.rules.len() - 1
            }
        };
        &mut self.rules[idx]
    }

    fn matching(&self, sql: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| sql.contains(&r.pattern))
    }
}

impl Transport for MockTransport {
    type Cursor = MockCursor;

    fn begin(&mut self) -> Result<(), DbError> {
        self.log.push(MockEvent::Begin);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), DbError> {
        self.log.push(MockEvent::Commit);
        match &self.commit_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn rollback(&mut self) -> Result<(), DbError> {
        self.log.push(MockEvent::Rollback);
        Ok(())
    }

    fn cursor(&mut self) -> Result<MockCursor, DbError> {
        self.next_cursor += 1;
        let id = self.next_cursor;
        lock(&self.log.0).open_cursors.insert(id);
        Ok(MockCursor {
            id,
            rows: VecDeque::new(),
            fetch_error: None,
            close_error: None,
        })
    }

    fn execute(
        &mut self,
        cursor: &mut MockCursor,
        sql: &str,
        params: &[Value],
    ) -> Result<(), DbError> {
        self.log.push(MockEvent::Execute {
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        let Some(rule) = self.matching(sql) else {
            return Ok(());
        };
        cursor.close_error = rule.close_error.clone();
        if let Some(err) = &rule.execute_error {
            return Err(err.clone());
        }
        cursor.rows = rule.rows.iter().cloned().collect();
        cursor.fetch_error = rule.fetch_error.clone();
        Ok(())
    }

    fn fetch(&mut self, cursor: &mut MockCursor) -> Result<Option<Row>, DbError> {
        if let Some(err) = &cursor.fetch_error {
            return Err(err.clone());
        }
        Ok(cursor.rows.pop_front())
    }

    fn close_cursor(&mut self, cursor: MockCursor) -> Result<(), DbError> {
        lock(&self.log.0).open_cursors.remove(&cursor.id);
        self.log.push(MockEvent::CursorClosed { cursor: cursor.id });
        match cursor.close_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn close(&mut self) -> Result<(), DbError> {
        self.log.push(MockEvent::Close);
        match &self.close_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

/// Builds result rows sharing one column list.
pub fn rows(columns: &[&str], values: Vec<Vec<Value>>) -> Vec<Row> {
    let columns: Arc<[String]> = columns.iter().map(|c| c.to_string()).collect();
    values
        .into_iter()
        .map(|v| Row::new(Arc::clone(&columns), v))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_matching_rule_wins() {
        let mut mock = MockTransport::new()
            .respond("pg_stat_activity", rows(&["pid"], vec![vec![Value::Int(1)]]))
            .respond("pg_stat", rows(&["pid"], vec![vec![Value::Int(2)]]));
        let mut cursor = mock.cursor().unwrap();
        mock.execute(&mut cursor, "SELECT pid FROM pg_stat_activity", &[])
            .unwrap();
        let row = mock.fetch(&mut cursor).unwrap().unwrap();
        assert_eq!(row.get("pid"), Some(&Value::Int(1)));
        assert_eq!(mock.fetch(&mut cursor).unwrap(), None);
        mock.close_cursor(cursor).unwrap();
        assert!(mock.log().open_cursors().is_empty());
    }

    #[test]
    fn unmatched_statement_is_empty() {
        let mut mock = MockTransport::new();
        let mut cursor = mock.cursor().unwrap();
        mock.execute(&mut cursor, "SELECT 1", &[]).unwrap();
        assert_eq!(mock.fetch(&mut cursor).unwrap(), None);
        assert_eq!(mock.log().executed(), vec!["SELECT 1".to_string()]);
    }
}
