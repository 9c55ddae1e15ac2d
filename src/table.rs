//! Plain-text table rendering for the `detect` report.

use std::fmt::Write as _;

pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| cell_width(h)).collect();
    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(widths.len()) {
            widths[idx] = widths[idx].max(cell_width(cell));
        }
    }

    let mut output = String::new();
    write_row(&mut output, headers, &widths);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat((*w).max(3))).collect();
    write_row(&mut output, &rule, &widths);
    for row in rows {
        write_row(&mut output, row, &widths);
    }
    output
}

pub fn print_table(headers: &[String], rows: &[Vec<String>]) {
    print!("{}", render_table(headers, rows));
}

fn cell_width(value: &str) -> usize {
    value.chars().count()
}

fn write_row(output: &mut String, cells: &[String], widths: &[usize]) {
    let mut line = String::new();
    for (idx, width) in widths.iter().enumerate() {
        if idx > 0 {
            line.push_str("  ");
        }
        let cell: String = cells
            .get(idx)
            .map(|c| c.chars().map(|ch| if ch.is_control() { ' ' } else { ch }).collect())
            .unwrap_or_default();
        let pad = width.saturating_sub(cell.chars().count());
        line.push_str(&cell);
        line.extend(std::iter::repeat_n(' ', pad));
    }
    let _ = writeln!(output, "{}", line.trim_end());
}
