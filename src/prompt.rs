use crate::config::Config;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Question types offered to the user, in menu order.
pub const QUESTION_TYPES: &[&str] = &[
    "single_choice",
    "multiple_choice1",
    "multiple_choice2",
    "multiple_choice3",
    "kprim",
    "truefalse",
    "draganddrop",
    "inline_fib",
];

const BLOOM_PLACEHOLDER: &str = "{bloom_level}";

/// Prompt templates keyed by question type.
#[derive(Debug, Clone, Default)]
pub struct PromptLibrary {
    templates: BTreeMap<String, String>,
}

impl PromptLibrary {
    /// Read every `<type>.md` in `dir`. A missing directory yields an empty library.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut templates = BTreeMap::new();
        if !dir.exists() {
            return Ok(Self { templates });
        }
        for entry in std::fs::read_dir(dir)
            .with_context(|| format!("reading prompts dir: {}", dir.display()))?
        {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let body = std::fs::read_to_string(&path)
                .with_context(|| format!("reading prompt: {}", path.display()))?;
            debug!("loaded prompt template {}", stem);
            templates.insert(stem.to_string(), body);
        }
        Ok(Self { templates })
    }

    pub fn from_map(templates: BTreeMap<String, String>) -> Self {
        Self { templates }
    }

    /// `None` for absent or blank templates.
    pub fn get(&self, question_type: &str) -> Option<&str> {
        self.templates
            .get(question_type)
            .map(String::as_str)
            .filter(|t| !t.trim().is_empty())
    }

    pub fn contains(&self, question_type: &str) -> bool {
        self.get(question_type).is_some()
    }
}

pub fn bloom_level<'a>(cfg: &'a Config, question_type: &str) -> &'a str {
    cfg.generation
        .bloom_levels
        .get(question_type)
        .map(String::as_str)
        .unwrap_or(cfg.generation.default_bloom_level.as_str())
}

/// Template with placeholders filled, followed by the user's instructions and goals.
pub fn assemble(
    cfg: &Config,
    question_type: &str,
    template: &str,
    instructions: &str,
    learning_goals: &str,
) -> String {
    let body = template.replace(BLOOM_PLACEHOLDER, bloom_level(cfg, question_type));
    format!("{body}\n\nBenutzereingabe: {instructions}\n\nLernziele: {learning_goals}")
}

/// `single_choice` -> `Single Choice`.
pub fn type_label(question_type: &str) -> String {
    question_type
        .split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Resolve a display name ("Deutsch") or a model-facing name ("German").
pub fn resolve_language(cfg: &Config, selected: &str) -> String {
    if let Some(name) = cfg.generation.languages.get(selected) {
        return name.clone();
    }
    selected.to_string()
}
