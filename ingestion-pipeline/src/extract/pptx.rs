use std::collections::BTreeMap;
use std::io::{Cursor, Read};

use common::error::AppError;
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::warn;

use super::{mime_for_media_entry, ExtractedItem};

const SLIDE_PREFIX: &str = "ppt/slides/slide";

/// Extracts per-slide text (and referenced media when vision is enabled)
/// from a PowerPoint deck. Slides are zip entries `ppt/slides/slideN.xml`;
/// the shape text lives in `<a:t>` runs, and each slide's images are wired
/// up through its `_rels` part.
pub fn extract_pptx(bytes: &[u8], include_images: bool) -> Result<Vec<ExtractedItem>, AppError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|err| AppError::Processing(format!("Failed to open pptx container: {err}")))?;

    // Slide entries keyed by their 1-based number so units come out ordered.
    let mut slides: BTreeMap<u32, String> = BTreeMap::new();
    for name in archive.file_names() {
        if let Some(number) = slide_number(name) {
            slides.insert(number, name.to_string());
        }
    }

    if slides.is_empty() {
        return Err(AppError::Processing("pptx contains no slides".into()));
    }

    let mut items = Vec::new();
    for (index, (number, entry)) in slides.iter().enumerate() {
        let unit = u32::try_from(index).unwrap_or(u32::MAX);

        let mut xml = String::new();
        archive
            .by_name(entry)
            .map_err(|err| AppError::Processing(format!("Failed to open {entry}: {err}")))?
            .read_to_string(&mut xml)
            .map_err(|err| AppError::Processing(format!("Failed to read {entry}: {err}")))?;

        let text = parse_slide_text(&xml)?;
        if !text.is_empty() {
            items.push(ExtractedItem::Text { unit, text });
        }

        if include_images {
            for target in slide_image_targets(&mut archive, *number) {
                let mut media_bytes = Vec::new();
                match archive.by_name(&target) {
                    Ok(mut file) => {
                        if let Err(err) = file.read_to_end(&mut media_bytes) {
                            warn!(entry = %target, error = %err, "Failed to read slide media");
                            continue;
                        }
                    }
                    Err(err) => {
                        warn!(entry = %target, error = %err, "Slide media entry missing");
                        continue;
                    }
                }

                items.push(ExtractedItem::Image {
                    unit,
                    bytes: media_bytes,
                    mime: mime_for_media_entry(&target),
                });
            }
        }
    }

    Ok(items)
}

fn slide_number(entry_name: &str) -> Option<u32> {
    let rest = entry_name.strip_prefix(SLIDE_PREFIX)?;
    let digits = rest.strip_suffix(".xml")?;
    digits.parse().ok()
}

/// Concatenates all `<a:t>` runs of a slide, one line per run.
fn parse_slide_text(xml: &str) -> Result<String, AppError> {
    let mut reader = Reader::from_str(xml);
    let mut runs = Vec::new();
    let mut in_text_run = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text_run = true,
            Ok(Event::End(e)) if e.local_name().as_ref() == b"t" => in_text_run = false,
            Ok(Event::Text(text)) if in_text_run => {
                let decoded = text
                    .unescape()
                    .map_err(|err| AppError::Processing(format!("Invalid pptx text: {err}")))?;
                if !decoded.trim().is_empty() {
                    runs.push(decoded.trim().to_string());
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => {
                return Err(AppError::Processing(format!("Failed to parse pptx XML: {err}")))
            }
        }
    }

    Ok(runs.join("\n"))
}

/// Resolves a slide's image relationship targets to archive entry names.
fn slide_image_targets<R: Read + std::io::Seek>(
    archive: &mut zip::ZipArchive<R>,
    slide_number: u32,
) -> Vec<String> {
    let rels_entry = format!("ppt/slides/_rels/slide{slide_number}.xml.rels");
    let mut xml = String::new();
    match archive.by_name(&rels_entry) {
        Ok(mut file) => {
            if file.read_to_string(&mut xml).is_err() {
                return Vec::new();
            }
        }
        Err(_) => return Vec::new(),
    }

    let mut targets = Vec::new();
    let mut reader = Reader::from_str(&xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e) | Event::Empty(e))
                if e.local_name().as_ref() == b"Relationship" =>
            {
                let mut rel_type = String::new();
                let mut target = String::new();
                for attribute in e.attributes().flatten() {
                    let key = attribute.key.local_name();
                    let value = String::from_utf8_lossy(&attribute.value).into_owned();
                    match key.as_ref() {
                        b"Type" => rel_type = value,
                        b"Target" => target = value,
                        _ => {}
                    }
                }
                if rel_type.ends_with("/image") && !target.is_empty() {
                    // Targets are relative to ppt/slides/, e.g. "../media/image1.png"
                    let resolved = target
                        .strip_prefix("../")
                        .map(|rest| format!("ppt/{rest}"))
                        .unwrap_or_else(|| format!("ppt/slides/{target}"));
                    targets.push(resolved);
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            Ok(_) => {}
        }
    }

    targets
}
