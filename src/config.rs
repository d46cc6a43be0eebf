use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: Global,
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub model: Model,
    #[serde(default)]
    pub generation: Generation,
    #[serde(default)]
    pub extraction: Extraction,
    #[serde(default)]
    pub output: Output,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub debug: Debug,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }

    /// A stable, normalization-friendly string for hashing.
    pub fn normalized_for_hash(&self) -> String {
        toml::to_string(self).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Global {
    pub print_summary: bool,
}
impl Default for Global {
    fn default() -> Self {
        Self {
            print_summary: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paths {
    pub out_dir: String,
    pub work_dir: String,
    pub prompts_dir: String,
}
impl Default for Paths {
    fn default() -> Self {
        Self {
            out_dir: "out".into(),
            work_dir: ".olat-quizgen-work".into(),
            prompts_dir: "prompts".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    pub base_url: String,
    pub default_model: String,
    pub allowed_models: Vec<String>,
    pub api_key_env: String,
    /// Zero means the request may block indefinitely.
    pub timeout_seconds: u64,
    pub max_tokens: u32,
    #[serde(default)]
    pub temperature: Option<f32>,
}
impl Default for Model {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            default_model: "gpt-4o".into(),
            allowed_models: vec!["gpt-4o".into(), "gpt-4o-mini".into()],
            api_key_env: "OPENAI_API_KEY".into(),
            timeout_seconds: 0,
            max_tokens: 4096,
            temperature: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Generation {
    pub default_language: String,
    /// Display name -> language name sent to the model.
    pub languages: BTreeMap<String, String>,
    pub default_types: Vec<String>,
    /// The question type whose response is re-encoded instead of used verbatim.
    pub blank_type: String,
    pub bloom_levels: BTreeMap<String, String>,
    pub default_bloom_level: String,
    #[serde(default)]
    pub shuffle_seed: Option<u64>,
}
impl Default for Generation {
    fn default() -> Self {
        let languages = [
            ("Deutsch", "German"),
            ("Englisch", "English"),
            ("Französisch", "French"),
            ("Italienisch", "Italian"),
            ("Spanisch", "Spanish"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let bloom_levels = [("draganddrop", "Verstehen"), ("inline_fib", "Erinnern")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self {
            default_language: "Deutsch".into(),
            languages,
            default_types: vec!["single_choice".into(), "inline_fib".into()],
            blank_type: "inline_fib".into(),
            bloom_levels,
            default_bloom_level: "Verstehen".into(),
            shuffle_seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Extraction {
    pub pdftotext_exe: String,
    pub pdftoppm_exe: String,
    pub pandoc_exe: String,
    pub render_dpi: u32,
    pub tool_timeout_seconds: u64,
    pub normalize_unicode: bool,
}
impl Default for Extraction {
    fn default() -> Self {
        Self {
            pdftotext_exe: "pdftotext".into(),
            pdftoppm_exe: "pdftoppm".into(),
            pandoc_exe: "pandoc".into(),
            render_dpi: 100,
            tool_timeout_seconds: 300,
            normalize_unicode: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Output {
    pub file_suffix: String,
    pub write_report_json: bool,
    pub report_filename: String,
    pub write_index_json: bool,
}
impl Default for Output {
    fn default() -> Self {
        Self {
            file_suffix: "_olat.txt".into(),
            write_report_json: true,
            report_filename: "report.json".into(),
            write_index_json: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: true,
            file_path: "".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Debug {
    pub dump_effective_config: bool,
    pub log_raw_responses: bool,
}
impl Default for Debug {
    fn default() -> Self {
        Self {
            dump_effective_config: true,
            log_raw_responses: false,
        }
    }
}
