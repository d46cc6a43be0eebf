use crate::pipeline::{FileResult, GenerationRequest};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub job_id: String,
    pub started: String,
    pub finished: String,
    pub model: String,
    pub language: String,
    pub question_types: Vec<String>,
    pub files: Vec<FileResult>,
}

impl JobReport {
    pub fn new(
        job_id: &str,
        started: String,
        finished: String,
        req: &GenerationRequest,
        files: Vec<FileResult>,
    ) -> Self {
        Self {
            job_id: job_id.to_string(),
            started,
            finished,
            model: req.model.clone(),
            language: req.language.clone(),
            question_types: req.question_types.clone(),
            files,
        }
    }

    pub fn delivered(&self) -> usize {
        self.files.iter().filter(|f| f.document.is_some()).count()
    }
}
