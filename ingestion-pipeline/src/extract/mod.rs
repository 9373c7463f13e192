use common::{error::AppError, storage::types::document::FileType};

mod docx;
mod pdf;
mod pptx;

pub use docx::extract_docx;
pub use pdf::extract_pdf;
pub use pptx::extract_pptx;

/// One element of the ordered extraction sequence: either a text block or an
/// image reference, tagged with the page/slide it came from.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractedItem {
    Text { unit: u32, text: String },
    Image { unit: u32, bytes: Vec<u8>, mime: String },
}

impl ExtractedItem {
    pub fn unit(&self) -> u32 {
        match self {
            Self::Text { unit, .. } | Self::Image { unit, .. } => *unit,
        }
    }
}

/// Extracts the ordered item sequence for a document. `include_images`
/// reflects whether vision processing is enabled; when off, image refs are
/// skipped at the source (PDF/DOCX/PPTX) and image documents are rejected by
/// the pipeline before reaching this point.
pub fn extract(
    file_type: FileType,
    bytes: &[u8],
    mime_type: &str,
    include_images: bool,
) -> Result<Vec<ExtractedItem>, AppError> {
    match file_type {
        FileType::Pdf => extract_pdf(bytes, include_images),
        FileType::Docx => extract_docx(bytes, include_images),
        FileType::Pptx => extract_pptx(bytes, include_images),
        FileType::Image => Ok(vec![ExtractedItem::Image {
            unit: 0,
            bytes: bytes.to_vec(),
            mime: mime_type.to_string(),
        }]),
    }
}

pub(crate) fn mime_for_media_entry(name: &str) -> String {
    mime_guess::from_path(name)
        .first_or_octet_stream()
        .to_string()
}
