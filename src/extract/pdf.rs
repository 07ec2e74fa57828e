use lopdf::Document;

use super::ExtractError;

/// Per-page text of a PDF.
pub fn extract_pdf(bytes: &[u8]) -> String {
    match page_texts(bytes) {
        Ok(pages) => format_pages(pages),
        Err(err) => format!("Error extracting PDF: {err}"),
    }
}

fn page_texts(bytes: &[u8]) -> Result<Vec<(u32, Result<String, String>)>, ExtractError> {
    let document = Document::load_mem(bytes)?;
    Ok(document
        .get_pages()
        .keys()
        .map(|&number| {
            let text = document
                .extract_text(&[number])
                .map_err(|err| err.to_string());
            (number, text)
        })
        .collect())
}

/// Joins page texts under `--- Page n ---` headers. Blank pages are
/// skipped; a failed page is replaced by its error marker.
pub fn format_pages(pages: Vec<(u32, Result<String, String>)>) -> String {
    let sections = pages
        .into_iter()
        .filter_map(|(number, text)| match text {
            Ok(text) if text.trim().is_empty() => None,
            Ok(text) => Some(format!("--- Page {number} ---\n{text}")),
            Err(cause) => Some(format!("[Error extracting page {number}: {cause}]")),
        })
        .collect::<Vec<_>>();
    if sections.is_empty() {
        "PDF appears empty or image-only.".to_string()
    } else {
        sections.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_get_numbered_headers() {
        let text = format_pages(vec![
            (1, Ok("Intro".to_string())),
            (2, Ok("   ".to_string())),
            (3, Ok("Summary".to_string())),
        ]);
        assert_eq!(text, "--- Page 1 ---\nIntro\n--- Page 3 ---\nSummary");
    }

    #[test]
    fn failing_page_contributes_marker_only() {
        let text = format_pages(vec![
            (1, Err("bad font".to_string())),
            (2, Ok("ok".to_string())),
        ]);
        assert_eq!(text, "[Error extracting page 1: bad font]\n--- Page 2 ---\nok");
    }

    #[test]
    fn no_text_means_image_only() {
        assert_eq!(
            format_pages(vec![(1, Ok(String::new()))]),
            "PDF appears empty or image-only."
        );
        assert_eq!(format_pages(Vec::new()), "PDF appears empty or image-only.");
    }

    #[test]
    fn unreadable_file_is_reported() {
        let text = extract_pdf(b"definitely not a pdf");
        assert!(text.starts_with("Error extracting PDF: "), "{text}");
    }
}
