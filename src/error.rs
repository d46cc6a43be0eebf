use thiserror::Error;

/// Failure of the normalization pipeline for one model response.
#[derive(Debug, Error)]
pub enum ContentError {
    /// The cleaned response is not valid JSON, even after repair.
    #[error("malformed content: {reason}")]
    MalformedContent {
        cleaned: String,
        raw: String,
        reason: String,
    },

    /// Valid JSON, but not an array of item objects.
    #[error("unprocessable content: {reason}")]
    UnprocessableContent { raw: String, reason: String },
}

/// Per (file, question type) failures. None of these abort a batch.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("no prompt template for question type '{0}'")]
    MissingTemplate(String),

    #[error("model call failed for '{question_type}': {reason}")]
    ModelCallFailure {
        question_type: String,
        reason: String,
    },

    #[error("no content could be extracted from '{0}'")]
    ExtractionFailure(String),

    #[error("unsupported file type: '{0}'")]
    UnsupportedFile(String),
}

impl GenerationError {
    /// Message shown to the user in the report and summary.
    pub fn user_message(&self) -> String {
        match self {
            Self::MissingTemplate(t) => format!("Die Prompt-Datei '{t}.md' wurde nicht gefunden."),
            Self::ModelCallFailure { question_type, .. } => {
                format!("Fehler bei der Generierung einer Antwort für {question_type}.")
            }
            Self::ExtractionFailure(f) => format!("Fehler beim Verarbeiten von '{f}'."),
            Self::UnsupportedFile(f) => format!("Nicht unterstützter Dateityp für '{f}'."),
        }
    }
}
