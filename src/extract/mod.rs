pub mod tools;
pub mod types;

use anyhow::Result;
use std::path::Path;

pub use types::{Extracted, ImageData, SourceKind, ToolDiag};

/// Turns an uploaded document into prompt material.
pub trait Extractor {
    fn doctor(&self) -> Vec<ToolDiag>;
    fn extract(&self, input: &Path) -> Result<Extracted>;
}
