//! Minimal RFC 4180 reader and writer for the attachment log.
//!
//! Output uses `,` separators and `\n` line endings, without a BOM. Input
//! accepts `\n` or `\r\n` line endings and an optional UTF-8 BOM.

use std::fmt;

/// Why a CSV document could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvError {
    /// 1-based line on which the offending row starts.
    pub line: usize,
    pub reason: &'static str,
}

impl fmt::Display for CsvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.reason)
    }
}

impl std::error::Error for CsvError {}

/// Append one row (terminated by `\n`) to `out`.
pub fn write_row<'a>(out: &mut String, fields: impl IntoIterator<Item = &'a str>) {
    for (i, field) in fields.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&escape(field));
    }
    out.push('\n');
}

/// Escape a value for CSV (RFC 4180).
///
/// Wraps in double quotes if the value contains commas, quotes, or newlines.
pub fn escape(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Split a CSV document into rows of fields.
///
/// Quoted fields may contain separators, doubled quotes and line breaks.
/// A blank line between records is skipped.
pub fn parse(text: &str) -> Result<Vec<Vec<String>>, CsvError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    // Set once a field was opened with a quote, to reject `"a"b`.
    let mut after_quote = false;
    let mut line = 1;
    let mut row_line = 1;

    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        if in_quotes {
            match ch {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => {
                    in_quotes = false;
                    after_quote = true;
                }
                '\n' => {
                    line += 1;
                    field.push(ch);
                }
                _ => field.push(ch),
            }
            continue;
        }

        match ch {
            '"' if field.is_empty() && !after_quote => in_quotes = true,
            '"' => {
                return Err(CsvError {
                    line,
                    reason: "unexpected quote inside unquoted field",
                })
            }
            ',' => {
                row.push(std::mem::take(&mut field));
                after_quote = false;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                if !row.is_empty() || !field.is_empty() || after_quote {
                    row.push(std::mem::take(&mut field));
                    rows.push(std::mem::take(&mut row));
                }
                after_quote = false;
                line += 1;
                row_line = line;
            }
            _ if after_quote => {
                return Err(CsvError {
                    line,
                    reason: "text after closing quote",
                })
            }
            _ => field.push(ch),
        }
    }

    if in_quotes {
        return Err(CsvError {
            line: row_line,
            reason: "unterminated quoted field",
        });
    }
    if !row.is_empty() || !field.is_empty() || after_quote {
        row.push(field);
        rows.push(row);
    }

    Ok(rows)
}
