//! Status lines.
//!
//! Results go to stdout; warnings and hints go to stderr so they never mix
//! into a kubeconfig piped elsewhere.

use super::colors::SemanticStyle;

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".success(), msg);
}

pub fn print_warn(msg: &str) {
    eprintln!("{} {}", "⚠".warning(), msg);
}

pub fn print_hint(msg: &str) {
    eprintln!("{} {}", "→".muted(), msg.muted());
}

/// Prints an indented `key: value` line.
pub fn print_labeled(key: &str, value: &str) {
    println!("  {}: {}", key.muted(), value);
}
