use std::io::{Cursor, Read};

use quick_xml::Reader;
use quick_xml::events::Event;
use zip::ZipArchive;

use super::ExtractError;

const DOCUMENT_PART: &str = "word/document.xml";

/// Body paragraphs in order, then every top-level table.
pub fn extract_docx(bytes: &[u8]) -> String {
    match read_document(bytes).and_then(|xml| parse_document(&xml)) {
        Ok(body) => body.render(),
        Err(err) => format!("Error extracting Word document content: {err}"),
    }
}

fn read_document(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut part = archive.by_name(DOCUMENT_PART)?;
    let mut xml = String::new();
    part.read_to_string(&mut xml)?;
    Ok(xml)
}

#[derive(Debug, Default)]
struct DocumentBody {
    paragraphs: Vec<String>,
    tables: Vec<Vec<Vec<String>>>,
}

impl DocumentBody {
    fn render(&self) -> String {
        let mut parts = self.paragraphs.clone();
        for table in &self.tables {
            parts.push("\n--- Table ---".to_string());
            for row in table {
                parts.push(row.join(" | "));
            }
        }
        if parts.is_empty() {
            "Word document appears to be empty.".to_string()
        } else {
            parts.join("\n")
        }
    }
}

fn parse_document(xml: &str) -> Result<DocumentBody, ExtractError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut body = DocumentBody::default();

    let mut table_depth = 0usize;
    let mut paragraph: Option<String> = None;
    let mut row: Vec<String> = Vec::new();
    let mut cell: Option<Vec<String>> = None;
    let mut in_text = false;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|err| ExtractError::Xml(err.to_string()))?;
        match event {
            Event::Start(ref element) => match element.local_name().as_ref() {
                b"p" => paragraph = Some(String::new()),
                b"t" => in_text = true,
                b"tbl" => {
                    table_depth += 1;
                    if table_depth == 1 {
                        body.tables.push(Vec::new());
                    }
                }
                b"tr" if table_depth == 1 => row.clear(),
                b"tc" if table_depth == 1 => cell = Some(Vec::new()),
                _ => {}
            },
            Event::Empty(ref element) => {
                if let Some(text) = paragraph.as_mut() {
                    match element.local_name().as_ref() {
                        b"tab" => text.push('\t'),
                        b"br" | b"cr" => text.push('\n'),
                        _ => {}
                    }
                }
            }
            Event::Text(ref text) if in_text => {
                let decoded = text
                    .unescape()
                    .map_err(|err| ExtractError::Xml(err.to_string()))?;
                if let Some(current) = paragraph.as_mut() {
                    current.push_str(&decoded);
                }
            }
            Event::End(ref element) => match element.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    let text = paragraph.take().unwrap_or_default();
                    if table_depth == 0 {
                        if !text.trim().is_empty() {
                            body.paragraphs.push(text);
                        }
                    } else if let Some(current) = cell.as_mut() {
                        current.push(text);
                    }
                }
                b"tc" if table_depth == 1 => {
                    let text = cell.take().unwrap_or_default().join("\n");
                    row.push(text.trim().to_string());
                }
                b"tr" if table_depth == 1 => {
                    if let Some(table) = body.tables.last_mut() {
                        table.push(std::mem::take(&mut row));
                    }
                }
                b"tbl" => table_depth = table_depth.saturating_sub(1),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::{CompressionMethod, ZipWriter};

    fn docx(body: &str) -> Vec<u8> {
        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}</w:body></w:document>"#
        );
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        writer.start_file(DOCUMENT_PART, options).unwrap();
        writer.write_all(xml.as_bytes()).unwrap();
        writer.finish().unwrap().into_inner()
    }

    fn paragraph(text: &str) -> String {
        format!("<w:p><w:r><w:t xml:space=\"preserve\">{text}</w:t></w:r></w:p>")
    }

    #[test]
    fn paragraphs_then_tables() {
        let table = format!(
            "<w:tbl><w:tr><w:tc>{}</w:tc><w:tc>{}</w:tc></w:tr><w:tr><w:tc>{}</w:tc><w:tc>{}</w:tc></w:tr></w:tbl>",
            paragraph(" Name "),
            paragraph("Qty"),
            paragraph("Apple"),
            paragraph("3")
        );
        let body = format!(
            "{}{}{}<w:p></w:p>{}",
            paragraph("Quarterly report"),
            table,
            paragraph("Tom &amp; Jerry"),
            "<w:sectPr/>"
        );
        let text = extract_docx(&docx(&body));
        assert_eq!(
            text,
            "Quarterly report\nTom & Jerry\n\n--- Table ---\nName | Qty\nApple | 3"
        );
    }

    #[test]
    fn runs_tabs_and_breaks_join_within_a_paragraph() {
        let body = "<w:p><w:r><w:t>Hello </w:t></w:r><w:r><w:tab/><w:t>world</w:t><w:br/><w:t>again</w:t></w:r></w:p>";
        assert_eq!(extract_docx(&docx(body)), "Hello \tworld\nagain");
    }

    #[test]
    fn empty_document_is_reported() {
        assert_eq!(
            extract_docx(&docx("<w:p></w:p><w:sectPr/>")),
            "Word document appears to be empty."
        );
    }

    #[test]
    fn non_zip_input_is_reported() {
        let text = extract_docx(b"plain bytes");
        assert!(
            text.starts_with("Error extracting Word document content: "),
            "{text}"
        );
    }
}
