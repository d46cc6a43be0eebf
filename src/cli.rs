use crate::{
    config::Config,
    error::ContentError,
    extract::{tools::ToolExtractor, Extractor},
    model::openai::OpenAiClient,
    normalize,
    pipeline::{GenerationRequest, Pipeline, MALFORMED_TOKEN, UNPROCESSABLE_TOKEN},
    prompt::{self, PromptLibrary, QUESTION_TYPES},
    quiz::RandomShuffler,
    report::JobReport,
    util::{ensure_dir, now_rfc3339, sha256_hex},
};
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "olat-quizgen")]
#[command(about = "Generate OLAT quiz questions from documents with a language model")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./olat-quizgen.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check external tools, prompt templates and the API key.
    Doctor {},
    /// List question types and whether a template exists for each.
    Types {},
    /// Generate questions for one or more documents.
    Run {
        /// PDF, DOCX, JPEG/PNG or plain text file; repeat for several.
        #[arg(long = "input", required = true)]
        inputs: Vec<PathBuf>,
        /// Question types in generation order, comma separated.
        #[arg(long, value_delimiter = ',')]
        types: Vec<String>,
        /// Free-text questions or instructions for the model.
        #[arg(long, default_value = "")]
        instructions: String,
        /// Read instructions from a file instead.
        #[arg(long, conflicts_with = "instructions")]
        instructions_file: Option<PathBuf>,
        /// Optional learning goals.
        #[arg(long, default_value = "")]
        goals: String,
        /// Output language, e.g. Deutsch or Englisch.
        #[arg(long)]
        language: Option<String>,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Re-encode a saved blank-style model response without calling the model.
    Convert {
        #[arg(long)]
        input: PathBuf,
        /// Seed for the Inline-Choice option order.
        #[arg(long)]
        seed: Option<u64>,
    },
}

pub fn dispatch(args: Args) -> Result<()> {
    let cfg = resolve_config(args.config.as_deref())?;

    match &args.cmd {
        Command::Doctor {} => {
            let _guard = init_logging(&args, &cfg, None)?;
            doctor(&cfg)
        }
        Command::Types {} => {
            let _guard = init_logging(&args, &cfg, None)?;
            types(&cfg)
        }
        Command::Run {
            inputs,
            types,
            instructions,
            instructions_file,
            goals,
            language,
            model,
            out_dir,
        } => {
            let instructions = match instructions_file {
                Some(p) => std::fs::read_to_string(p)
                    .with_context(|| format!("reading instructions: {}", p.display()))?,
                None => instructions.clone(),
            };
            let req = GenerationRequest {
                instructions,
                learning_goals: goals.clone(),
                question_types: if types.is_empty() {
                    cfg.generation.default_types.clone()
                } else {
                    types.clone()
                },
                language: language
                    .clone()
                    .unwrap_or_else(|| cfg.generation.default_language.clone()),
                model: model
                    .clone()
                    .unwrap_or_else(|| cfg.model.default_model.clone()),
            };
            run(&args, &cfg, inputs, &req, out_dir.as_deref())
        }
        Command::Convert { input, seed } => {
            let _guard = init_logging(&args, &cfg, None)?;
            convert(&cfg, input, *seed)
        }
    }
}

fn resolve_config(user: Option<&Path>) -> Result<Config> {
    if let Some(p) = user {
        return Config::load(p);
    }
    for candidate in ["olat-quizgen.toml", "olat-quizgen.example.toml"] {
        let p = PathBuf::from(candidate);
        if p.exists() {
            return Config::load(&p);
        }
    }
    Ok(Config::default())
}

fn init_logging(args: &Args, cfg: &Config, file_path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries the delivered text for `convert` and JSON summaries, so logs go to stderr.
    let stderr_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    };

    let (file_layer, guard) = if let Some(path) = file_path {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        ensure_dir(parent)?;
        let file = std::fs::File::create(path)
            .with_context(|| format!("create log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn load_prompts(cfg: &Config) -> Result<PromptLibrary> {
    PromptLibrary::load_dir(Path::new(&cfg.paths.prompts_dir))
}

fn doctor(cfg: &Config) -> Result<()> {
    let extractor = ToolExtractor::new(cfg);
    let prompts = load_prompts(cfg)?;
    let missing: Vec<&str> = QUESTION_TYPES
        .iter()
        .copied()
        .filter(|t| !prompts.contains(t))
        .collect();
    let api_key_set = std::env::var(&cfg.model.api_key_env)
        .map(|v| !v.trim().is_empty())
        .unwrap_or(false);

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "tools": extractor.doctor(),
            "prompts_dir": cfg.paths.prompts_dir,
            "missing_templates": missing,
            "api_key_env": cfg.model.api_key_env,
            "api_key_set": api_key_set,
        }))?
    );
    Ok(())
}

fn types(cfg: &Config) -> Result<()> {
    let prompts = load_prompts(cfg)?;
    let rows: Vec<serde_json::Value> = QUESTION_TYPES
        .iter()
        .map(|t| {
            let post_processed = *t == cfg.generation.blank_type;
            serde_json::json!({
                "type": t,
                "label": prompt::type_label(t),
                "bloom_level": prompt::bloom_level(cfg, t),
                "template": prompts.contains(t),
                "post_processed": post_processed,
            })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}

fn convert(cfg: &Config, input: &Path, seed: Option<u64>) -> Result<()> {
    let raw = std::fs::read_to_string(input)
        .with_context(|| format!("reading response: {}", input.display()))?;
    let mut shuffler = RandomShuffler::from_seed_opt(seed.or(cfg.generation.shuffle_seed));

    match normalize::transform_response(&raw, &mut shuffler) {
        Ok(t) => {
            if t.recovery == normalize::Recovery::Repaired {
                warn!("JSON was repaired before parsing; items may be missing");
            }
            info!("encoded {} item(s)", t.item_count);
            println!("{}", t.text);
            Ok(())
        }
        Err(ContentError::MalformedContent {
            cleaned, reason, ..
        }) => {
            println!("{MALFORMED_TOKEN}");
            Err(anyhow!("{reason}\ncleaned input:\n{cleaned}"))
        }
        Err(ContentError::UnprocessableContent { reason, .. }) => {
            println!("{UNPROCESSABLE_TOKEN}");
            Err(anyhow!("{reason}"))
        }
    }
}

fn run(
    args: &Args,
    cfg: &Config,
    inputs: &[PathBuf],
    req: &GenerationRequest,
    out_override: Option<&Path>,
) -> Result<()> {
    if req.question_types.is_empty() {
        return Err(anyhow!("select at least one question type"));
    }
    for input in inputs {
        validate_input(input)?;
    }

    let cfg_hash = sha256_hex(cfg.normalized_for_hash().as_bytes());
    let mut job_key = format!("{cfg_hash}:{}:{}", req.model, req.language);
    for input in inputs {
        let h = crate::util::hash_file(input)
            .with_context(|| format!("hashing input: {}", input.display()))?;
        job_key.push(':');
        job_key.push_str(&h);
    }
    job_key.push(':');
    job_key.push_str(&req.question_types.join(","));
    let job_id = sha256_hex(job_key.as_bytes());

    let out_root = out_override
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(&cfg.paths.out_dir));
    let job_dir = out_root.join(&job_id);
    let final_dir = job_dir.join("final");
    ensure_dir(&final_dir)?;

    let log_path = resolve_log_path(cfg, &job_dir);
    let _guard = init_logging(args, cfg, log_path.as_deref())?;

    info!("job_id={job_id} out={}", job_dir.display());

    if cfg.debug.dump_effective_config {
        let raw = toml::to_string(cfg).unwrap_or_default();
        std::fs::write(job_dir.join("effective-config.toml"), raw)?;
    }

    let prompts = load_prompts(cfg)?;
    let extractor = ToolExtractor::new(cfg);
    let model = OpenAiClient::new(cfg)?;
    let pipeline = Pipeline::new(cfg, prompts, extractor, model);
    let mut shuffler = RandomShuffler::from_seed_opt(cfg.generation.shuffle_seed);

    let started = now_rfc3339();
    let results = pipeline.run_batch(inputs, req, &mut shuffler);

    for result in &results {
        for w in result.warnings() {
            warn!("{}: {w}", result.source.display());
        }
        if let Some(document) = &result.document {
            let path = final_dir.join(&result.output_name);
            std::fs::write(&path, document)
                .with_context(|| format!("writing {}", path.display()))?;
            info!("wrote {}", path.display());
        }
    }

    let report = JobReport::new(&job_id, started, now_rfc3339(), req, results);

    if cfg.output.write_report_json {
        std::fs::write(
            final_dir.join(&cfg.output.report_filename),
            serde_json::to_string_pretty(&report)?,
        )?;
    }

    let outputs: Vec<String> = report
        .files
        .iter()
        .filter(|f| f.document.is_some())
        .map(|f| format!("final/{}", f.output_name))
        .collect();

    if cfg.output.write_index_json {
        let index = serde_json::json!({
            "job_id": job_id,
            "started": report.started,
            "finished": report.finished,
            "outputs": outputs,
            "report": format!("final/{}", cfg.output.report_filename),
        });
        std::fs::write(job_dir.join("index.json"), serde_json::to_string_pretty(&index)?)?;
    }

    if cfg.global.print_summary {
        let status = if report.delivered() > 0 { "ok" } else { "empty" };
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "job_id": job_id,
                "job_dir": job_dir,
                "files": report.files.len(),
                "delivered": report.delivered(),
                "outputs": outputs,
                "status": status,
            }))?
        );
    }

    Ok(())
}

fn validate_input(input: &Path) -> Result<()> {
    let input_str = input.display().to_string();

    if looks_like_url(&input_str) {
        return Err(anyhow!("URL inputs are not supported: {input_str}"));
    }

    if !input.exists() {
        return Err(anyhow!("input does not exist: {}", input.display()));
    }

    Ok(())
}

fn looks_like_url(s: &str) -> bool {
    let s = s.to_ascii_lowercase();
    s.starts_with("http://") || s.starts_with("https://") || s.starts_with("file://")
}

fn resolve_log_path(cfg: &Config, job_dir: &Path) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }

    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }

    Some(job_dir.join("logs").join("olat-quizgen.log"))
}
