use ::csv::ReaderBuilder;

use super::ExtractError;

const MAX_ROWS: usize = 100;
const SEPARATOR_WIDTH: usize = 50;

/// Header plus up to [`MAX_ROWS`] data rows, 1-based, `|`-joined.
pub fn extract_csv(bytes: &[u8]) -> String {
    render(bytes).unwrap_or_else(|err| format!("Error processing CSV: {err}"))
}

fn render(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);
    let mut records = reader.records();
    let mut lines = vec!["CSV Data:".to_string()];

    let Some(header) = records.next().transpose()? else {
        return Ok(lines.join("\n"));
    };
    lines.push(format!("Headers: {}", header.iter().collect::<Vec<_>>().join(" | ")));
    lines.push("-".repeat(SEPARATOR_WIDTH));

    for (index, record) in records.by_ref().take(MAX_ROWS).enumerate() {
        let record = record?;
        lines.push(format!(
            "Row {}: {}",
            index + 1,
            record.iter().collect::<Vec<_>>().join(" | ")
        ));
    }
    if records.next().is_some() {
        lines.push(format!(
            "... (showing first {MAX_ROWS} rows, total rows may be more)"
        ));
    }
    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn csv_with_rows(rows: usize) -> Vec<u8> {
        let mut data = String::from("id,name\n");
        for row in 1..=rows {
            data.push_str(&format!("{row},item{row}\n"));
        }
        data.into_bytes()
    }

    #[test]
    fn formats_header_separator_and_rows() {
        let text = extract_csv(b"city,temp\nParis,21\n\"New York, NY\",18\n");
        assert_eq!(
            text,
            format!(
                "CSV Data:\nHeaders: city | temp\n{}\nRow 1: Paris | 21\nRow 2: New York, NY | 18",
                "-".repeat(50)
            )
        );
    }

    #[test]
    fn exactly_hundred_rows_has_no_notice() {
        let text = extract_csv(&csv_with_rows(100));
        assert!(text.contains("Row 100: 100 | item100"));
        assert!(!text.contains("showing first"));
    }

    #[test]
    fn truncates_after_hundred_rows() {
        let text = extract_csv(&csv_with_rows(150));
        assert!(text.contains("Row 100: 100 | item100"));
        assert!(!text.contains("Row 101"));
        assert!(text.ends_with("... (showing first 100 rows, total rows may be more)"));
    }

    #[test]
    fn empty_input_has_only_title() {
        assert_eq!(extract_csv(b""), "CSV Data:");
    }

    #[test]
    fn ragged_rows_are_tolerated() {
        let text = extract_csv(b"a,b,c\n1\n2,3,4,5\n");
        assert!(text.contains("Row 1: 1\n"));
        assert!(text.ends_with("Row 2: 2 | 3 | 4 | 5"));
    }

    #[test]
    fn invalid_utf8_is_reported() {
        let text = extract_csv(b"a,b\n\xff,1\n");
        assert!(text.starts_with("Error processing CSV: "), "{text}");
    }
}
