use base64::Engine as _;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl ImageData {
    pub fn data_url(&self) -> String {
        let encoded = base64::engine::general_purpose::STANDARD.encode(&self.bytes);
        format!("data:{};base64,{}", self.mime, encoded)
    }
}

/// What a document yielded.
#[derive(Debug, Clone)]
pub enum Extracted {
    Text(String),
    /// A PDF without a text layer, rendered page by page.
    Pages(Vec<ImageData>),
    Image(ImageData),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SourceKind {
    Pdf,
    Docx,
    Image(&'static str),
    PlainText,
    Unsupported,
}

impl SourceKind {
    pub fn detect(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "pdf" => Self::Pdf,
            "docx" => Self::Docx,
            "jpg" | "jpeg" => Self::Image("image/jpeg"),
            "png" => Self::Image("image/png"),
            "txt" | "md" => Self::PlainText,
            _ => Self::Unsupported,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolDiag {
    pub tool: String,
    pub exe: String,
    pub available: bool,
}
