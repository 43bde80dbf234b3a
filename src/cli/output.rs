//! Output formatting
//!
//! Error display and status glyphs for the command layer.

use crossterm::style::Stylize;
use crossterm::tty::IsTty;

use crate::error::PackforgeError;

/// Status message prefixes
pub mod status {
    /// Success prefix (green checkmark)
    pub const SUCCESS: &str = "\u{2713}";

    /// Error prefix (red X)
    pub const ERROR: &str = "\u{2717}";
}

/// Print a top-level error to stderr.
pub fn display_error(error: &PackforgeError) {
    if std::io::stderr().is_tty() {
        eprintln!("{} {error}", "error:".red().bold());
    } else {
        eprintln!("error: {error}");
    }
}

/// Print a check/status line to stdout.
pub fn display_status(ok: bool, message: &str) {
    let prefix = if ok { status::SUCCESS } else { status::ERROR };
    if std::io::stdout().is_tty() {
        let prefix = if ok {
            prefix.green().bold()
        } else {
            prefix.red().bold()
        };
        println!("{prefix} {message}");
    } else {
        println!("{prefix} {message}");
    }
}
