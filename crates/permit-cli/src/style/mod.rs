//! Terminal styling: semantic colors, status lines and tables.

use std::sync::atomic::{AtomicBool, Ordering};

pub mod colors;
pub mod output;
pub mod table;

pub use output::*;
pub use table::*;

static NO_COLOR: AtomicBool = AtomicBool::new(false);

/// Turns coloring off for the rest of the process.
pub fn set_no_color(value: bool) {
    NO_COLOR.store(value, Ordering::SeqCst);
}

pub fn no_color() -> bool {
    NO_COLOR.load(Ordering::SeqCst)
}
