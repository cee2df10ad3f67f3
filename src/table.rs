//! Plain-text rendering of documents for terminal output.

use std::borrow::Cow;
use std::fmt::Write as _;

use crate::document::{Document, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Right,
}

/// Renders a document as a two-column `field`/`value` table, one row per
/// leaf, with nested fields spelled as dotted paths. Numbers are
/// right-aligned.
pub fn render_document(document: &Document) -> String {
    let headers = ["field".to_string(), "value".to_string()];
    let mut rows = Vec::new();
    let mut aligns = Vec::new();
    for (path, value) in document.flatten() {
        aligns.push(if value.is_number() {
            Align::Right
        } else {
            Align::Left
        });
        rows.push(vec![path, cell_text(value)]);
    }
    render(&headers, &rows, |row, col| {
        if col == 1 { aligns[row] } else { Align::Left }
    })
}

pub fn print_document(document: &Document) {
    print!("{}", render_document(document));
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => "-".to_string(),
        Value::List(items) if items.is_empty() => "[]".to_string(),
        Value::Document(doc) if doc.is_empty() => "{}".to_string(),
        other => other.as_display(),
    }
}

fn render(
    headers: &[String],
    rows: &[Vec<String>],
    align: impl Fn(usize, usize) -> Align,
) -> String {
    let column_count = headers.len();
    let mut widths = headers.iter().map(|h| display_width(h)).collect::<Vec<_>>();
    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(display_width(&sanitize_cell(cell)));
        }
    }
    for width in &mut widths {
        *width = (*width).max(3);
    }

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_row(headers, &widths, |_| Align::Left));
    let separator = widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(&separator, &widths, |_| Align::Left));
    for (row_idx, row) in rows.iter().enumerate() {
        let line = format_row(row, &widths, |col| align(row_idx, col));
        let _ = writeln!(output, "{line}");
    }
    output
}

fn format_row(values: &[String], widths: &[usize], align: impl Fn(usize) -> Align) -> String {
    let cells = values
        .iter()
        .zip(widths)
        .enumerate()
        .map(|(idx, (value, width))| {
            let sanitized = sanitize_cell(value);
            let padding = " ".repeat(width.saturating_sub(display_width(&sanitized)));
            match align(idx) {
                Align::Left => format!("{sanitized}{padding}"),
                Align::Right => format!("{padding}{sanitized}"),
            }
        })
        .collect::<Vec<_>>();
    cells.join("  ").trim_end().to_string()
}

fn display_width(value: &str) -> usize {
    let mut width = 0usize;
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch == '\u{1b}' {
            // ANSI escape, e.g. \x1b[31m
            for next in chars.by_ref() {
                if next == 'm' {
                    break;
                }
            }
        } else {
            width += 1;
        }
    }
    width
}

fn sanitize_cell(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    #[test]
    fn documents_render_as_dotted_rows() {
        let document = doc! {
            "category" => "environmental",
            "energy" => doc! { "total_energy_kwh" => 30.0, "notes" => Value::Null },
        };
        let rendered = render_document(&document);
        let lines = rendered.lines().collect::<Vec<_>>();
        assert_eq!(lines[0].split_whitespace().collect::<Vec<_>>(), ["field", "value"]);
        assert!(lines.iter().any(|l| l.starts_with("energy.total_energy_kwh")));
        assert!(lines.iter().any(|l| l.starts_with("energy.notes") && l.ends_with('-')));
    }

    #[test]
    fn numbers_are_right_aligned() {
        let document = doc! { "a" => 5_i64, "bb" => "long text value" };
        let rendered = render_document(&document);
        let number_line = rendered.lines().find(|l| l.starts_with("a ")).unwrap();
        assert!(number_line.ends_with(" 5"));
        let text_line = rendered.lines().find(|l| l.starts_with("bb")).unwrap();
        assert!(text_line.ends_with("long text value"));
        assert_eq!(number_line.len(), text_line.len());
    }

    #[test]
    fn control_characters_are_flattened() {
        let rendered = render(
            &["name".to_string()],
            &[vec!["two\nlines".to_string()]],
            |_, _| Align::Left,
        );
        assert!(rendered.contains("two lines"));
    }
}
