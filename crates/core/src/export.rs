//! Tabular CSV export.
//!
//! One implementation for every CSV download the service offers. Output is
//! RFC 4180 style: comma separated, `\n` line endings, fields quoted only
//! when they contain a comma, quote, or line break.

/// UTF-8 byte order mark, prepended so spreadsheet apps detect the encoding.
pub const UTF8_BOM: &str = "\u{feff}";

/// A type that can be rendered as one CSV row.
pub trait CsvRecord {
    /// Column names, in row order.
    fn headers() -> &'static [&'static str];

    /// Field values, one per header. `None` renders as an empty field.
    fn fields(&self) -> Vec<Option<String>>;
}

/// Escape a value for CSV: wrap in quotes if it contains comma, quote, or line break.
pub fn csv_escape(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Render `records` as CSV with a header row.
///
/// An empty slice still produces the header row.
pub fn to_csv<T: CsvRecord>(records: &[T]) -> String {
    let mut lines = Vec::with_capacity(records.len() + 1);
    lines.push(
        T::headers()
            .iter()
            .map(|h| csv_escape(h))
            .collect::<Vec<_>>()
            .join(","),
    );

    for record in records {
        let row: Vec<String> = record
            .fields()
            .iter()
            .map(|f| f.as_deref().map(csv_escape).unwrap_or_default())
            .collect();
        lines.push(row.join(","));
    }

    lines.join("\n")
}

/// [`to_csv`] with a leading [`UTF8_BOM`].
pub fn to_csv_with_bom<T: CsvRecord>(records: &[T]) -> String {
    format!("{UTF8_BOM}{}", to_csv(records))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Row {
        id: u32,
        note: Option<&'static str>,
    }

    impl CsvRecord for Row {
        fn headers() -> &'static [&'static str] {
            &["id", "note"]
        }

        fn fields(&self) -> Vec<Option<String>> {
            vec![Some(self.id.to_string()), self.note.map(String::from)]
        }
    }

    #[test]
    fn plain_values_are_not_quoted() {
        assert_eq!(csv_escape("vue"), "vue");
    }

    #[test]
    fn special_characters_are_quoted_and_doubled() {
        assert_eq!(csv_escape("a,b"), "\"a,b\"");
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_escape("line1\nline2"), "\"line1\nline2\"");
        assert_eq!(csv_escape("cr\rhere"), "\"cr\rhere\"");
    }

    #[test]
    fn renders_header_and_rows() {
        let rows = [
            Row { id: 1, note: Some("ok") },
            Row { id: 2, note: None },
            Row { id: 3, note: Some("x,y") },
        ];
        assert_eq!(to_csv(&rows), "id,note\n1,ok\n2,\n3,\"x,y\"");
    }

    #[test]
    fn empty_input_yields_header_only() {
        assert_eq!(to_csv::<Row>(&[]), "id,note");
    }

    #[test]
    fn bom_is_prepended() {
        let csv = to_csv_with_bom::<Row>(&[]);
        assert!(csv.starts_with('\u{feff}'));
        assert!(csv.ends_with("id,note"));
    }
}
