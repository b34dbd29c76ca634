//! Clipboard export through the terminal (OSC 52).

use std::io::{self, Write};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use super::state::AppState;

/// OSC 52 "set clipboard" sequence carrying `text`, BEL-terminated.
pub fn osc52_sequence(text: &str) -> String {
    format!("\x1b]52;c;{}\x07", STANDARD.encode(text))
}

/// Asks the terminal emulator to put `text` on the system clipboard and
/// acknowledges it with a toast naming `label`.
pub fn export<W: Write>(
    out: &mut W,
    state: &mut AppState,
    text: &str,
    label: &str,
) -> io::Result<()> {
    out.write_all(osc52_sequence(text).as_bytes())?;
    out.flush()?;
    state.show_toast(format!("Copied {} to clipboard", label));
    Ok(())
}
