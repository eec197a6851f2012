//! Word-wrapped help output for compressor usage text.

use std::io::{self, Write};

/// Write `text` wrapped to `cols` display columns.
///
/// Each input line is wrapped independently; continuation rows repeat the
/// line's leading indentation.  Tabs count as 8 columns.  A word longer than
/// the remaining width is emitted unbroken on its own row.
pub fn write_wrapped(out: &mut dyn Write, text: &str, cols: usize) -> io::Result<()> {
    for line in text.lines() {
        wrap_line(out, line, cols)?;
    }
    Ok(())
}

fn display_width(s: &str) -> usize {
    s.chars().map(|c| if c == '\t' { 8 } else { 1 }).sum()
}

fn wrap_line(out: &mut dyn Write, line: &str, cols: usize) -> io::Result<()> {
    let indent = &line[..line.len() - line.trim_start().len()];
    let indent_width = display_width(indent);

    let mut row = String::from(indent);
    let mut width = indent_width;
    let mut empty = true;
    for word in line.split_whitespace() {
        let word_width = word.chars().count();
        if !empty && width + 1 + word_width > cols {
            writeln!(out, "{row}")?;
            row = String::from(indent);
            width = indent_width;
            empty = true;
        }
        if !empty {
            row.push(' ');
            width += 1;
        }
        row.push_str(word);
        width += word_width;
        empty = false;
    }
    writeln!(out, "{row}")
}
