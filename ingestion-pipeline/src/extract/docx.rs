use std::io::{Cursor, Read};

use common::error::AppError;
use quick_xml::events::Event;
use quick_xml::Reader;

use super::{mime_for_media_entry, ExtractedItem};

const DOCUMENT_ENTRY: &str = "word/document.xml";
const MEDIA_PREFIX: &str = "word/media/";

/// Extracts paragraphs (and, when vision is enabled, embedded media) from a
/// Word document. A docx file is a zip container; the main body lives in
/// `word/document.xml` with runs of `<w:t>` text inside `<w:p>` paragraphs.
pub fn extract_docx(bytes: &[u8], include_images: bool) -> Result<Vec<ExtractedItem>, AppError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|err| AppError::Processing(format!("Failed to open docx container: {err}")))?;

    let mut xml = String::new();
    archive
        .by_name(DOCUMENT_ENTRY)
        .map_err(|err| AppError::Processing(format!("docx is missing {DOCUMENT_ENTRY}: {err}")))?
        .read_to_string(&mut xml)
        .map_err(|err| AppError::Processing(format!("Failed to read {DOCUMENT_ENTRY}: {err}")))?;

    let mut items: Vec<ExtractedItem> = parse_paragraphs(&xml)?
        .into_iter()
        .map(|text| ExtractedItem::Text { unit: 0, text })
        .collect();

    if include_images {
        let mut media_entries: Vec<String> = archive
            .file_names()
            .filter(|name| name.starts_with(MEDIA_PREFIX))
            .map(str::to_string)
            .collect();
        media_entries.sort();

        for entry in media_entries {
            let mut media_bytes = Vec::new();
            archive
                .by_name(&entry)
                .map_err(|err| AppError::Processing(format!("Failed to open {entry}: {err}")))?
                .read_to_end(&mut media_bytes)
                .map_err(|err| AppError::Processing(format!("Failed to read {entry}: {err}")))?;

            items.push(ExtractedItem::Image {
                unit: 0,
                bytes: media_bytes,
                mime: mime_for_media_entry(&entry),
            });
        }
    }

    Ok(items)
}

/// Walks the document XML and collects the text of each non-empty paragraph.
fn parse_paragraphs(xml: &str) -> Result<Vec<String>, AppError> {
    let mut reader = Reader::from_str(xml);

    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text_run = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"t" => in_text_run = true,
                b"tab" => current.push('\t'),
                b"br" => current.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" => current.push('\t'),
                b"br" => current.push('\n'),
                _ => {}
            },
            Ok(Event::Text(text)) if in_text_run => {
                let decoded = text
                    .unescape()
                    .map_err(|err| AppError::Processing(format!("Invalid docx text: {err}")))?;
                current.push_str(&decoded);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text_run = false,
                b"p" => {
                    let paragraph = current.trim().to_string();
                    if !paragraph.is_empty() {
                        paragraphs.push(paragraph);
                    }
                    current.clear();
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => {
                return Err(AppError::Processing(format!("Failed to parse docx XML: {err}")))
            }
        }
    }

    Ok(paragraphs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    pub(crate) fn build_docx(paragraphs: &[&str], media: &[(&str, &[u8])]) -> Vec<u8> {
        let body: String = paragraphs
            .iter()
            .map(|p| format!("<w:p><w:r><w:t>{p}</w:t></w:r></w:p>"))
            .collect();
        let document = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
<w:body>{body}</w:body>
</w:document>"#
        );

        let mut cursor = Cursor::new(Vec::new());
        let mut writer = zip::ZipWriter::new(&mut cursor);
        let options = SimpleFileOptions::default();

        writer.start_file(DOCUMENT_ENTRY, options).expect("start document");
        writer.write_all(document.as_bytes()).expect("write document");

        for (name, bytes) in media {
            writer
                .start_file(format!("{MEDIA_PREFIX}{name}"), options)
                .expect("start media");
            writer.write_all(bytes).expect("write media");
        }

        writer.finish().expect("finish zip");
        cursor.into_inner()
    }

    #[test]
    fn extracts_paragraph_text_in_order() {
        let bytes = build_docx(
            &["First paragraph.", "Second paragraph about osmosis."],
            &[],
        );
        let items = extract_docx(&bytes, false).expect("extract");

        let texts: Vec<&str> = items
            .iter()
            .filter_map(|item| match item {
                ExtractedItem::Text { text, .. } => Some(text.as_str()),
                ExtractedItem::Image { .. } => None,
            })
            .collect();
        assert_eq!(
            texts,
            vec!["First paragraph.", "Second paragraph about osmosis."]
        );
    }

    #[test]
    fn includes_media_only_when_vision_enabled() {
        let bytes = build_docx(&["Text."], &[("image1.png", b"fakepng".as_slice())]);

        let without = extract_docx(&bytes, false).expect("extract");
        assert!(without
            .iter()
            .all(|item| matches!(item, ExtractedItem::Text { .. })));

        let with = extract_docx(&bytes, true).expect("extract");
        let image = with
            .iter()
            .find_map(|item| match item {
                ExtractedItem::Image { bytes, mime, .. } => Some((bytes, mime)),
                ExtractedItem::Text { .. } => None,
            })
            .expect("image item present");
        assert_eq!(image.0.as_slice(), b"fakepng");
        assert_eq!(image.1, "image/png");
    }

    #[test]
    fn rejects_non_zip_bytes() {
        let result = extract_docx(b"plain text, not a zip", false);
        assert!(matches!(result, Err(AppError::Processing(_))));
    }

    #[test]
    fn skips_empty_paragraphs() {
        let bytes = build_docx(&["Real content.", "", "   "], &[]);
        let items = extract_docx(&bytes, false).expect("extract");
        assert_eq!(items.len(), 1);
    }
}
