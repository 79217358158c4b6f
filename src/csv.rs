//! Hand-rolled CSV handling: RFC-style quoting, a quote-aware parser, and a
//! formula-neutralized variant for exports. Backend persistence uses the
//! plain writer so stored values round-trip byte for byte.

use crate::record::Record;
use crate::schema::Schema;

pub fn csv_quote(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn should_neutralize(value: &str) -> bool {
    let trimmed = value.trim_start();
    if trimmed.is_empty() || trimmed.starts_with('\'') {
        return false;
    }
    matches!(
        trimmed.chars().next(),
        Some('=') | Some('+') | Some('-') | Some('@')
    )
}

/// Spreadsheet formula injection guard for exported files.
pub fn neutralize_formula(value: &str) -> String {
    if should_neutralize(value) {
        format!("'{value}")
    } else {
        value.to_string()
    }
}

pub fn csv_escape(value: &str) -> String {
    csv_quote(neutralize_formula(value).as_str())
}

/// Header plus one line per record, plain quoting. The persistence format.
pub fn rows_to_csv(schema: &Schema, records: &[Record]) -> String {
    let mut lines: Vec<String> = Vec::new();
    lines.push(
        schema
            .header()
            .iter()
            .map(|name| csv_quote(name.as_str()))
            .collect::<Vec<_>>()
            .join(","),
    );
    for record in records {
        lines.push(
            record
                .values()
                .iter()
                .map(|value| csv_quote(value.as_str()))
                .collect::<Vec<_>>()
                .join(","),
        );
    }
    lines.join("\n")
}

/// Export variant: same layout, cell values neutralized against formulas.
pub fn rows_to_export_csv(schema: &Schema, records: &[Record]) -> String {
    let mut lines: Vec<String> = Vec::new();
    lines.push(
        schema
            .header()
            .iter()
            .map(|name| csv_escape(name.as_str()))
            .collect::<Vec<_>>()
            .join(","),
    );
    for record in records {
        lines.push(
            record
                .values()
                .iter()
                .map(|value| csv_escape(value.as_str()))
                .collect::<Vec<_>>()
                .join(","),
        );
    }
    lines.join("\n")
}

/// Parse CSV text into rows of fields. Tolerates CRLF line endings, quoted
/// fields with embedded separators/newlines, and doubled quotes. A trailing
/// newline does not produce a phantom empty row.
pub fn parse_csv(text: &str) -> Vec<Vec<String>> {
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            match ch {
                '"' => {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                }
                _ => field.push(ch),
            }
            continue;
        }
        match ch {
            // Quoting only counts at the start of a field; a quote in the
            // middle of unquoted text is data, not structure.
            '"' if field.is_empty() => in_quotes = true,
            ',' => {
                row.push(std::mem::take(&mut field));
            }
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
            }
            '\n' => {
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
            }
            _ => field.push(ch),
        }
    }
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    rows.retain(|row| !(row.len() == 1 && row[0].is_empty()));
    rows
}
