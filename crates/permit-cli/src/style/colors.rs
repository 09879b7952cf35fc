//! Semantic color palette.

use owo_colors::{OwoColorize, Style};

fn paint(text: &impl std::fmt::Display, style: Style) -> String {
    if super::no_color() {
        text.to_string()
    } else {
        text.style(style).to_string()
    }
}

/// Applies the palette to anything printable. Every method falls back to
/// plain text when colors are off.
pub trait SemanticStyle: std::fmt::Display + Sized {
    /// Green bold.
    fn success(&self) -> String {
        paint(self, Style::new().green().bold())
    }

    /// Yellow.
    fn warning(&self) -> String {
        paint(self, Style::new().yellow())
    }

    /// Dimmed.
    fn muted(&self) -> String {
        paint(self, Style::new().dimmed())
    }

    /// Blue, for names of users, roles and files.
    fn code(&self) -> String {
        paint(self, Style::new().blue())
    }
}

impl<T: std::fmt::Display> SemanticStyle for T {}
