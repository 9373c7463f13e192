use common::error::AppError;
use lopdf::{Document, Object};
use tracing::warn;

use super::ExtractedItem;

/// Extracts the text layer per page, plus embedded JPEG images when vision
/// is enabled. Pages with an unreadable text layer are skipped rather than
/// failing the document.
pub fn extract_pdf(bytes: &[u8], include_images: bool) -> Result<Vec<ExtractedItem>, AppError> {
    let document = Document::load_mem(bytes)
        .map_err(|err| AppError::Processing(format!("Failed to parse PDF: {err}")))?;

    let mut page_numbers: Vec<u32> = document.get_pages().keys().copied().collect();
    page_numbers.sort_unstable();

    if page_numbers.is_empty() {
        return Err(AppError::Processing("PDF appears to have no pages".into()));
    }

    let pages = document.get_pages();
    let mut items = Vec::new();

    for (index, page_number) in page_numbers.iter().enumerate() {
        let unit = u32::try_from(index).unwrap_or(u32::MAX);

        match document.extract_text(&[*page_number]) {
            Ok(text) => {
                let text = text.trim().to_string();
                if !text.is_empty() {
                    items.push(ExtractedItem::Text { unit, text });
                }
            }
            Err(err) => {
                warn!(page = page_number, error = %err, "Failed to extract PDF page text");
            }
        }

        if include_images {
            if let Some(page_id) = pages.get(page_number) {
                for (bytes, mime) in page_jpeg_images(&document, *page_id) {
                    items.push(ExtractedItem::Image { unit, bytes, mime });
                }
            }
        }
    }

    // Some PDFs defeat per-page extraction (shared content streams, odd page
    // trees) while the whole-document pass still works. Fall back before
    // declaring the text layer empty.
    if !items.iter().any(|item| matches!(item, ExtractedItem::Text { .. })) {
        if let Some(text) = whole_document_text(bytes) {
            items.insert(0, ExtractedItem::Text { unit: 0, text });
        }
    }

    Ok(items)
}

fn whole_document_text(bytes: &[u8]) -> Option<String> {
    match pdf_extract::extract_text_from_mem(bytes) {
        Ok(text) => {
            let text = text.trim().to_string();
            if text.is_empty() {
                None
            } else {
                Some(text)
            }
        }
        Err(err) => {
            warn!(error = %err, "Whole-document PDF text extraction failed");
            None
        }
    }
}

/// Collects DCTDecode (JPEG) XObjects for a page. Other image encodings are
/// skipped; image extraction is best-effort and never fails the pipeline.
fn page_jpeg_images(document: &Document, page_id: (u32, u16)) -> Vec<(Vec<u8>, String)> {
    let mut images = Vec::new();

    let (resources, resource_ids) = document.get_page_resources(page_id);
    let mut dictionaries = Vec::new();
    if let Some(dict) = resources {
        dictionaries.push(dict);
    }
    for object_id in resource_ids {
        if let Ok(Object::Dictionary(dict)) = document.get_object(object_id) {
            dictionaries.push(dict);
        }
    }

    for dict in dictionaries {
        let Ok(xobjects) = dict.get(b"XObject") else {
            continue;
        };
        let xobjects = match xobjects {
            Object::Dictionary(d) => d.clone(),
            Object::Reference(id) => match document.get_object(*id) {
                Ok(Object::Dictionary(d)) => d.clone(),
                _ => continue,
            },
            _ => continue,
        };

        for (_, value) in xobjects.iter() {
            let stream = match value {
                Object::Reference(id) => match document.get_object(*id) {
                    Ok(Object::Stream(stream)) => stream.clone(),
                    _ => continue,
                },
                Object::Stream(stream) => stream.clone(),
                _ => continue,
            };

            let is_image = stream
                .dict
                .get(b"Subtype")
                .and_then(Object::as_name)
                .map(|name| name == b"Image")
                .unwrap_or(false);
            if !is_image {
                continue;
            }

            let is_jpeg = match stream.dict.get(b"Filter") {
                Ok(Object::Name(name)) => name == b"DCTDecode",
                Ok(Object::Array(filters)) => filters.iter().any(|f| {
                    f.as_name().map(|name| name == b"DCTDecode").unwrap_or(false)
                }),
                _ => false,
            };
            if !is_jpeg {
                continue;
            }

            images.push((stream.content.clone(), "image/jpeg".to_string()));
        }
    }

    images
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;
    use lopdf::content::{Content, Operation};
    use lopdf::{Object, Stream};

    /// Builds a one-page PDF carrying the given text in its content stream.
    fn pdf_with_text(text: &str) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![100.into(), 600.into()]),
                Operation::new("Tj", vec![Object::string_literal(text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("encode content"),
        ));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).expect("save pdf");
        bytes
    }

    #[test]
    fn extracts_text_from_generated_pdf() {
        let bytes = pdf_with_text("Photosynthesis converts light into chemical energy.");
        let items = extract_pdf(&bytes, false).expect("extract");

        assert!(!items.is_empty());
        let text = items
            .iter()
            .filter_map(|item| match item {
                ExtractedItem::Text { text, .. } => Some(text.as_str()),
                ExtractedItem::Image { .. } => None,
            })
            .collect::<Vec<_>>()
            .join(" ");
        assert!(text.contains("chemical energy"), "got: {text}");
    }

    #[test]
    fn invalid_bytes_are_a_processing_error() {
        let result = extract_pdf(b"not a pdf at all", false);
        assert!(matches!(result, Err(AppError::Processing(_))));
    }
}
