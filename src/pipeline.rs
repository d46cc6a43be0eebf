use crate::{
    config::Config,
    error::{ContentError, GenerationError},
    extract::{Extracted, Extractor, ImageData, SourceKind},
    model::{ModelClient, ModelRequest},
    normalize::{self, Recovery},
    postprocess::replace_sharp_s,
    prompt::{self, PromptLibrary},
    quiz::OptionShuffler,
    util,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Written in place of a blank-style section whose response could not be parsed.
pub const MALFORMED_TOKEN: &str = "Fehler: Ungültiges JSON-Format";
pub const PARTIAL_WARNING: &str =
    "Teilweises JSON konnte gerettet werden. Ergebnisse können unvollständig sein.";
pub const UNRECOVERABLE_WARNING: &str = "Teilweises JSON konnte nicht gerettet werden.";
/// Written in place of a blank-style section whose JSON parsed but held no usable items.
pub const UNPROCESSABLE_TOKEN: &str = "Fehler: Eingabe konnte nicht verarbeitet werden";
pub const UNPROCESSABLE_WARNING: &str = "Fehler bei der Verarbeitung der Eingabe.";

/// Longest slice of a response repeated in warnings; report.json keeps it whole.
const EXCERPT_CHARS: usize = 200;

/// User choices shared by every file in a batch.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub instructions: String,
    pub learning_goals: String,
    /// Generation order; kept as given.
    pub question_types: Vec<String>,
    /// Display name (`Deutsch`) or model-facing name (`German`).
    pub language: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    PartiallyRecovered {
        message: String,
    },
    MalformedContent {
        message: String,
        reason: String,
        cleaned: String,
        raw: String,
    },
    UnprocessableContent {
        message: String,
        reason: String,
        raw: String,
    },
}

impl Notice {
    /// One line for logs and the run summary, with shortened diagnostics.
    pub fn summary(&self) -> String {
        match self {
            Self::PartiallyRecovered { message } => message.clone(),
            Self::MalformedContent {
                message,
                reason,
                cleaned,
                raw,
            } => format!(
                "{message} ({reason}); bereinigte Eingabe: {}; originale Eingabe: {}",
                excerpt(cleaned),
                excerpt(raw)
            ),
            Self::UnprocessableContent {
                message,
                reason,
                raw,
            } => format!("{message} ({reason}); originale Eingabe: {}", excerpt(raw)),
        }
    }
}

fn excerpt(s: &str) -> String {
    let mut chars = s.chars();
    let head: String = chars.by_ref().take(EXCERPT_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}…")
    } else {
        head
    }
}

/// Result of one (file, question type) generation.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SectionOutcome {
    Generated {
        #[serde(skip_serializing)]
        content: String,
        notice: Option<Notice>,
    },
    Skipped {
        reason: String,
    },
    Failed {
        reason: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct Section {
    pub question_type: String,
    pub label: String,
    /// Page number when a PDF was processed as rendered images.
    pub page: Option<usize>,
    pub outcome: SectionOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileResult {
    pub source: PathBuf,
    pub output_name: String,
    #[serde(skip_serializing)]
    pub document: Option<String>,
    pub error: Option<String>,
    pub sections: Vec<Section>,
}

impl FileResult {
    fn failed(source: &Path, output_name: String, message: String) -> Self {
        Self {
            source: source.to_path_buf(),
            output_name,
            document: None,
            error: Some(message),
            sections: Vec::new(),
        }
    }

    /// Every skip, failure and notice message, in section order.
    pub fn warnings(&self) -> Vec<String> {
        let mut out: Vec<String> = self.error.iter().cloned().collect();
        for s in &self.sections {
            match &s.outcome {
                SectionOutcome::Generated {
                    notice: Some(notice),
                    ..
                } => out.push(format!("{}: {}", s.label, notice.summary())),
                SectionOutcome::Skipped { reason } | SectionOutcome::Failed { reason } => {
                    out.push(reason.clone())
                }
                SectionOutcome::Generated { notice: None, .. } => {}
            }
        }
        out
    }
}

#[derive(Debug, Clone, Copy)]
enum Material<'a> {
    Text(&'a str),
    Image(&'a ImageData),
}

pub struct Pipeline<X: Extractor, M: ModelClient> {
    cfg: Config,
    prompts: PromptLibrary,
    extractor: X,
    model: M,
}

impl<X: Extractor, M: ModelClient> Pipeline<X, M> {
    pub fn new(cfg: &Config, prompts: PromptLibrary, extractor: X, model: M) -> Self {
        Self {
            cfg: cfg.clone(),
            prompts,
            extractor,
            model,
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Files are processed one after another; a failing file never stops the batch.
    pub fn run_batch(
        &self,
        inputs: &[PathBuf],
        req: &GenerationRequest,
        shuffler: &mut dyn OptionShuffler,
    ) -> Vec<FileResult> {
        if !self.cfg.model.allowed_models.is_empty()
            && !self.cfg.model.allowed_models.contains(&req.model)
        {
            warn!("model '{}' is not in allowed_models; passing it through", req.model);
        }

        let mut results = Vec::with_capacity(inputs.len());
        for input in inputs {
            results.push(self.run_file(input, req, shuffler));
        }
        results
    }

    pub fn run_file(
        &self,
        input: &Path,
        req: &GenerationRequest,
        shuffler: &mut dyn OptionShuffler,
    ) -> FileResult {
        let name = input
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| input.display().to_string());
        let output_name = util::output_file_name(input, &self.cfg.output.file_suffix);
        info!("generating questions for '{}'", name);

        if matches!(SourceKind::detect(input), SourceKind::Unsupported) {
            let err = GenerationError::UnsupportedFile(name);
            warn!("{err}");
            return FileResult::failed(input, output_name, err.user_message());
        }

        let extracted = match self.extractor.extract(input) {
            Ok(e) => e,
            Err(e) => {
                warn!("extraction failed for {}: {e:#}", input.display());
                let err = GenerationError::ExtractionFailure(name);
                return FileResult::failed(input, output_name, err.user_message());
            }
        };

        let sections = match &extracted {
            Extracted::Text(text) => self.generate_sections(Material::Text(text), req, None, shuffler),
            Extracted::Image(image) => {
                self.generate_sections(Material::Image(image), req, None, shuffler)
            }
            Extracted::Pages(pages) => {
                let mut all = Vec::new();
                for (i, image) in pages.iter().enumerate() {
                    info!("generating questions for page {} of '{}'", i + 1, name);
                    all.extend(self.generate_sections(
                        Material::Image(image),
                        req,
                        Some(i + 1),
                        shuffler,
                    ));
                }
                all
            }
        };

        let document = render_document(&sections);
        info!("questions for '{}' generated", name);

        FileResult {
            source: input.to_path_buf(),
            output_name,
            document: Some(document),
            error: None,
            sections,
        }
    }

    fn generate_sections(
        &self,
        material: Material<'_>,
        req: &GenerationRequest,
        page: Option<usize>,
        shuffler: &mut dyn OptionShuffler,
    ) -> Vec<Section> {
        let mut sections = Vec::with_capacity(req.question_types.len());
        for question_type in &req.question_types {
            let outcome = self.generate_one(question_type, material, req, shuffler);
            sections.push(Section {
                question_type: question_type.clone(),
                label: self.label(question_type),
                page,
                outcome,
            });
        }
        sections
    }

    fn generate_one(
        &self,
        question_type: &str,
        material: Material<'_>,
        req: &GenerationRequest,
        shuffler: &mut dyn OptionShuffler,
    ) -> SectionOutcome {
        let Some(template) = self.prompts.get(question_type) else {
            let err = GenerationError::MissingTemplate(question_type.to_string());
            warn!("{err}");
            return SectionOutcome::Skipped {
                reason: err.user_message(),
            };
        };

        let language = prompt::resolve_language(&self.cfg, &req.language);
        let (document_text, image) = match material {
            Material::Text(t) => (Some(t), None),
            Material::Image(i) => (None, Some(i)),
        };
        let request = ModelRequest {
            model: &req.model,
            language: &language,
            prompt: prompt::assemble(
                &self.cfg,
                question_type,
                template,
                &req.instructions,
                &req.learning_goals,
            ),
            document_text,
            image,
        };

        let raw = match self.model.complete(&request) {
            Ok(r) if !r.trim().is_empty() => r,
            Ok(_) => return model_failure(question_type, "empty response".into()),
            Err(e) => return model_failure(question_type, format!("{e:#}")),
        };

        if self.cfg.debug.log_raw_responses {
            debug!("raw response for {}: {}", question_type, raw);
        }

        if question_type == self.cfg.generation.blank_type {
            process_blank_response(&raw, shuffler)
        } else {
            SectionOutcome::Generated {
                content: raw,
                notice: None,
            }
        }
    }

    fn label(&self, question_type: &str) -> String {
        let label = prompt::type_label(question_type);
        if question_type == self.cfg.generation.blank_type {
            format!("{label} (Verarbeitet)")
        } else {
            label
        }
    }
}

fn model_failure(question_type: &str, reason: String) -> SectionOutcome {
    let err = GenerationError::ModelCallFailure {
        question_type: question_type.to_string(),
        reason,
    };
    warn!("{err}");
    SectionOutcome::Failed {
        reason: err.user_message(),
    }
}

/// Run a blank-style response through sanitize, parse/repair, encode and locale
/// normalization. Unusable content still yields a section holding
/// [`MALFORMED_TOKEN`] or [`UNPROCESSABLE_TOKEN`].
pub fn process_blank_response(raw: &str, shuffler: &mut dyn OptionShuffler) -> SectionOutcome {
    match normalize::transform_response(raw, shuffler) {
        Ok(t) => {
            info!("encoded {} blank item(s)", t.item_count);
            let notice = match t.recovery {
                Recovery::Intact => None,
                Recovery::Repaired => {
                    warn!("blank items recovered after repair; output may be incomplete");
                    Some(Notice::PartiallyRecovered {
                        message: PARTIAL_WARNING.to_string(),
                    })
                }
            };
            SectionOutcome::Generated {
                content: t.text,
                notice,
            }
        }
        Err(ContentError::MalformedContent {
            cleaned,
            raw,
            reason,
        }) => {
            let notice = Notice::MalformedContent {
                message: UNRECOVERABLE_WARNING.to_string(),
                reason,
                cleaned,
                raw,
            };
            warn!("blank items could not be parsed: {}", notice.summary());
            SectionOutcome::Generated {
                content: MALFORMED_TOKEN.to_string(),
                notice: Some(notice),
            }
        }
        Err(ContentError::UnprocessableContent { raw, reason }) => {
            let notice = Notice::UnprocessableContent {
                message: UNPROCESSABLE_WARNING.to_string(),
                reason,
                raw,
            };
            warn!("blank items could not be processed: {}", notice.summary());
            SectionOutcome::Generated {
                content: UNPROCESSABLE_TOKEN.to_string(),
                notice: Some(notice),
            }
        }
    }
}

/// Concatenate generated sections in order, each followed by a blank line.
///
/// Runs of sections from the same rendered page are grouped under a
/// `### Seite <n>` heading. Skipped and failed sections contribute nothing.
pub fn render_document(sections: &[Section]) -> String {
    let mut out = String::new();
    let mut start = 0;

    while start < sections.len() {
        let page = sections[start].page;
        let end = sections[start..]
            .iter()
            .position(|s| s.page != page)
            .map_or(sections.len(), |offset| start + offset);
        let body = render_sections(&sections[start..end]);
        match page {
            Some(n) => out.push_str(&format!("### Seite {n}\n{body}\n\n")),
            None => out.push_str(&body),
        }
        start = end;
    }

    out
}

fn render_sections(sections: &[Section]) -> String {
    let mut body = String::new();
    for section in sections {
        if let SectionOutcome::Generated { content, .. } = &section.outcome {
            body.push_str(content);
            body.push_str("\n\n");
        }
    }
    replace_sharp_s(&body)
}
