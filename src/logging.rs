//! Log bootstrap. The terminal belongs to the dashboard, so logs only go to
//! a file and only when one is requested.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Mutex;

use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;

/// Maps `-v`/`-q` flags to a level. Default is INFO.
pub fn log_level(verbose: u8, quiet: bool) -> Level {
    if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }
}

/// Opens `path` for appending, creating it if needed.
pub fn open_log_file(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Installs the global subscriber writing plain text to `path`.
///
/// `RUST_LOG` directives still apply; the crate's own level comes from the
/// flags.
pub fn init_logging(path: &Path, verbose: u8, quiet: bool) -> io::Result<()> {
    let file = open_log_file(path)?;
    let level = log_level(verbose, quiet);

    let directive = format!("pgpeek={}", level)
        .parse::<Directive>()
        .map_err(io::Error::other)?;
    let filter = EnvFilter::from_default_env().add_directive(directive);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .try_init()
        .map_err(io::Error::other)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn flags_map_to_levels() {
        assert_eq!(log_level(0, false), Level::INFO);
        assert_eq!(log_level(1, false), Level::DEBUG);
        assert_eq!(log_level(5, false), Level::TRACE);
        assert_eq!(log_level(2, true), Level::ERROR);
    }

    #[test]
    fn log_file_is_created_and_appended() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pgpeek.log");

        writeln!(open_log_file(&path).unwrap(), "first").unwrap();
        writeln!(open_log_file(&path).unwrap(), "second").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no-such-dir").join("pgpeek.log");
        assert!(init_logging(&path, 0, false).is_err());
    }
}
