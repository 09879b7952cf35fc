//! Listings rendered with comfy-table.

use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table};

use super::colors::SemanticStyle;

/// Builds a table with a bold header row.
pub fn list_table(columns: &[&str], rows: &[Vec<String>]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);

    let header: Vec<Cell> = columns
        .iter()
        .map(|col| {
            if super::no_color() {
                Cell::new(col)
            } else {
                Cell::new(col).add_attribute(Attribute::Bold).fg(Color::Cyan)
            }
        })
        .collect();
    table.set_header(header);

    for row in rows {
        table.add_row(row);
    }
    table
}

/// Prints a listing followed by its item count, or `empty` when there are
/// no rows.
pub fn print_list(columns: &[&str], rows: &[Vec<String>], noun: &str, empty: &str) {
    if rows.is_empty() {
        println!("{}", empty.muted());
        return;
    }

    println!("{}", list_table(columns, rows));
    let count = rows.len();
    let suffix = if count == 1 { "" } else { "s" };
    println!("{}", format!("({count} {noun}{suffix})").muted());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_holds_every_row() {
        let rows = vec![
            vec!["alice".to_string(), "2".to_string()],
            vec!["bob".to_string(), "0".to_string()],
        ];
        let rendered = list_table(&["NAME", "BINDINGS"], &rows).to_string();
        assert!(rendered.contains("NAME"));
        assert!(rendered.contains("alice"));
        assert!(rendered.contains("bob"));
    }
}
