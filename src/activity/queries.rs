//! Server version detection and the version-aware activity statement.

use std::fmt;

use super::model::COLUMNS;

/// `major.minor` of the monitored server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ServerVersion {
    pub major: u32,
    pub minor: u32,
}

impl ServerVersion {
    /// First release reporting waits through `wait_event`.
    pub const WAIT_EVENTS: ServerVersion = ServerVersion { major: 9, minor: 6 };

    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Parses the output of `version()`, e.g.
    /// `PostgreSQL 16.2 on x86_64-pc-linux-gnu, ...`.
    ///
    /// Pre-release suffixes are ignored: `16beta1` reads as 16.0.
    pub fn parse(version: &str) -> Option<Self> {
        let token = version
            .split_once("PostgreSQL ")?
            .1
            .split(' ')
            .next()?;
        let (major, rest) = leading_number(token)?;
        let minor = rest
            .strip_prefix('.')
            .and_then(leading_number)
            .map(|(minor, _)| minor)
            .unwrap_or(0);
        Some(Self { major, minor })
    }
}

fn leading_number(s: &str) -> Option<(u32, &str)> {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let n = s[..end].parse().ok()?;
    Some((n, &s[end..]))
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Select-list expression producing result column `key`.
fn select_expression(key: &str, version: ServerVersion) -> String {
    match key {
        "addr" => "client_addr::text || $$:$$ || client_port::text AS addr".to_string(),
        "waiting" if version >= ServerVersion::WAIT_EVENTS => {
            "CASE WHEN wait_event IS NOT NULL THEN false ELSE true END AS waiting".to_string()
        }
        "waiting" => "waiting".to_string(),
        "running" => {
            "EXTRACT(EPOCH FROM (now() - query_start))::float8 AS running".to_string()
        }
        "lcksh" => "(SELECT count(*) FROM pg_locks pl WHERE pl.pid = psa.pid AND pl.granted) AS lcksh"
            .to_string(),
        "lcksw" => {
            "(SELECT count(*) FROM pg_locks pl WHERE pl.pid = psa.pid AND NOT pl.granted) AS lcksw"
                .to_string()
        }
        plain => plain.to_string(),
    }
}

/// Builds the activity snapshot statement for `version`.
///
/// Columns come out in [`COLUMNS`] order; idle-state filtering happens
/// client-side so the filter can be toggled without a new poll.
pub fn build_activity_statement(version: ServerVersion) -> String {
    let select_list = COLUMNS
        .iter()
        .map(|column| select_expression(column.key, version))
        .collect::<Vec<_>>()
        .join(",\n                ");

    format!(
        r#"
            SELECT
                {select_list}
            FROM pg_stat_activity psa
            WHERE state IS NOT NULL
            ORDER BY running DESC NULLS LAST
        "#
    )
}
