//! Elastic plain-text tables for row previews and statistics reports.
//!
//! Columns stretch to their widest cell. Columns whose cells are all
//! numbers (or empty) are right-aligned so magnitudes line up.

use std::{borrow::Cow, fmt::Write as _, io};

use crate::value::looks_numeric;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Right,
}

pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let column_count = headers.len();
    let mut widths = headers.iter().map(|h| display_width(h).max(3)).collect::<Vec<_>>();
    let mut numeric = vec![!rows.is_empty(); column_count];

    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(display_width(cell));
            if !cell.is_empty() && !looks_numeric(cell) {
                numeric[idx] = false;
            }
        }
    }
    let aligns = numeric
        .iter()
        .map(|&n| if n { Align::Right } else { Align::Left })
        .collect::<Vec<_>>();

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_row(headers, &widths, &aligns));
    let rule = widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(&rule, &widths, &aligns));
    for row in rows {
        let _ = writeln!(output, "{}", format_row(row, &widths, &aligns));
    }
    output
}

pub fn write_table(out: &mut dyn io::Write, headers: &[String], rows: &[Vec<String>]) -> io::Result<()> {
    out.write_all(render_table(headers, rows).as_bytes())?;
    out.flush()
}

fn format_row(values: &[String], widths: &[usize], aligns: &[Align]) -> String {
    let line = values
        .iter()
        .zip(widths.iter().zip(aligns))
        .map(|(value, (&width, &align))| {
            let cell = sanitize_cell(value);
            let padding = " ".repeat(width.saturating_sub(display_width(&cell)));
            match align {
                Align::Left => format!("{cell}{padding}"),
                Align::Right => format!("{padding}{cell}"),
            }
        })
        .collect::<Vec<_>>()
        .join("  ");
    line.trim_end().to_string()
}

fn display_width(value: &str) -> usize {
    let mut width = 0usize;
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch == '\u{1b}' {
            // ANSI colour codes take no columns.
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
