use super::{types::*, Extractor};
use crate::{config::Config, postprocess::clean_extracted_text, util};
use anyhow::{anyhow, bail, Context, Result};
use std::ffi::OsStr;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Extraction through poppler (`pdftotext`, `pdftoppm`) and `pandoc`.
pub struct ToolExtractor {
    cfg: Config,
}

impl ToolExtractor {
    pub fn new(cfg: &Config) -> Self {
        Self { cfg: cfg.clone() }
    }

    fn timeout(&self) -> Option<Duration> {
        (self.cfg.extraction.tool_timeout_seconds > 0)
            .then(|| Duration::from_secs(self.cfg.extraction.tool_timeout_seconds))
    }

    fn run_tool(&self, exe: &str, args: &[&OsStr]) -> Result<Output> {
        debug!("tool run {} {:?}", exe, args);
        let mut child = Command::new(exe)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("spawning {exe}"))?;

        let output = match self.timeout() {
            Some(t) => wait_with_timeout(&mut child, t)?,
            None => child
                .wait_with_output()
                .with_context(|| format!("waiting for {exe}"))?,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("{exe} failed ({}): {}", output.status, stderr.trim());
        }
        Ok(output)
    }

    fn pdf_text(&self, input: &Path) -> Result<String> {
        let out = self.run_tool(
            &self.cfg.extraction.pdftotext_exe,
            &[OsStr::new("-enc"), OsStr::new("UTF-8"), input.as_os_str(), OsStr::new("-")],
        )?;
        Ok(clean_extracted_text(
            &self.cfg,
            &String::from_utf8_lossy(&out.stdout),
        ))
    }

    fn pdf_pages(&self, input: &Path) -> Result<Vec<ImageData>> {
        let key = util::sha256_hex(input.display().to_string().as_bytes());
        let work = PathBuf::from(&self.cfg.paths.work_dir).join(&key[..16]);
        util::ensure_dir(&work)?;

        let dpi = self.cfg.extraction.render_dpi.to_string();
        let prefix = work.join("page");
        let rendered = self.run_tool(
            &self.cfg.extraction.pdftoppm_exe,
            &[
                OsStr::new("-jpeg"),
                OsStr::new("-r"),
                OsStr::new(&dpi),
                input.as_os_str(),
                prefix.as_os_str(),
            ],
        );

        let pages = rendered.and_then(|_| read_rendered_pages(&work));
        if let Err(e) = std::fs::remove_dir_all(&work) {
            warn!("could not remove {}: {e}", work.display());
        }
        pages
    }

    fn docx_text(&self, input: &Path) -> Result<String> {
        let out = self.run_tool(
            &self.cfg.extraction.pandoc_exe,
            &[
                OsStr::new("-t"),
                OsStr::new("plain"),
                OsStr::new("--wrap=none"),
                input.as_os_str(),
            ],
        )?;
        Ok(clean_extracted_text(
            &self.cfg,
            &String::from_utf8_lossy(&out.stdout),
        ))
    }
}

impl Extractor for ToolExtractor {
    fn doctor(&self) -> Vec<ToolDiag> {
        let ex = &self.cfg.extraction;
        [
            ("pdftotext", &ex.pdftotext_exe, "-v"),
            ("pdftoppm", &ex.pdftoppm_exe, "-v"),
            ("pandoc", &ex.pandoc_exe, "--version"),
        ]
        .into_iter()
        .map(|(tool, exe, flag)| ToolDiag {
            tool: tool.to_string(),
            exe: exe.clone(),
            available: Command::new(exe)
                .arg(flag)
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .is_ok(),
        })
        .collect()
    }

    fn extract(&self, input: &Path) -> Result<Extracted> {
        match SourceKind::detect(input) {
            SourceKind::Pdf => {
                let text = self.pdf_text(input)?;
                if !text.is_empty() {
                    return Ok(Extracted::Text(text));
                }
                warn!(
                    "no text layer in {}; rendering pages as images",
                    input.display()
                );
                let pages = self.pdf_pages(input)?;
                if pages.is_empty() {
                    return Err(anyhow!("no pages rendered from {}", input.display()));
                }
                info!("rendered {} page(s) from {}", pages.len(), input.display());
                Ok(Extracted::Pages(pages))
            }
            SourceKind::Docx => Ok(Extracted::Text(self.docx_text(input)?)),
            SourceKind::Image(mime) => {
                let bytes = std::fs::read(input)
                    .with_context(|| format!("reading image: {}", input.display()))?;
                Ok(Extracted::Image(ImageData {
                    mime: mime.to_string(),
                    bytes,
                }))
            }
            SourceKind::PlainText => {
                let raw = std::fs::read_to_string(input)
                    .with_context(|| format!("reading text: {}", input.display()))?;
                Ok(Extracted::Text(clean_extracted_text(&self.cfg, &raw)))
            }
            SourceKind::Unsupported => Err(anyhow!("unsupported file type: {}", input.display())),
        }
    }
}

fn read_rendered_pages(dir: &Path) -> Result<Vec<ImageData>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("reading {}", dir.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("jpg"))
        .collect();
    // pdftoppm zero-pads page numbers to a common width, so names sort numerically.
    paths.sort();

    paths
        .into_iter()
        .map(|p| {
            let bytes =
                std::fs::read(&p).with_context(|| format!("reading page: {}", p.display()))?;
            Ok(ImageData {
                mime: "image/jpeg".into(),
                bytes,
            })
        })
        .collect()
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Result<Output> {
    // Drain pipes while waiting so large outputs can't block the child on a full buffer.
    let stdout_reader = child.stdout.take();
    let stderr_reader = child.stderr.take();

    let stdout_thread = std::thread::spawn(move || -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        if let Some(mut out) = stdout_reader {
            out.read_to_end(&mut buf).with_context(|| "read stdout")?;
        }
        Ok(buf)
    });

    let stderr_thread = std::thread::spawn(move || -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        if let Some(mut err) = stderr_reader {
            err.read_to_end(&mut buf).with_context(|| "read stderr")?;
        }
        Ok(buf)
    });

    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait().with_context(|| "try_wait")? {
            let stdout = stdout_thread
                .join()
                .map_err(|_| anyhow!("stdout reader thread panicked"))??;
            let stderr = stderr_thread
                .join()
                .map_err(|_| anyhow!("stderr reader thread panicked"))??;
            return Ok(Output {
                status,
                stdout,
                stderr,
            });
        }

        if start.elapsed() > timeout {
            warn!("tool process timed out after {:?}", timeout);
            let _ = child.kill();
            child.wait().with_context(|| "wait after kill")?;
            let stderr = stderr_thread
                .join()
                .map_err(|_| anyhow!("stderr reader thread panicked"))??;
            let _ = stdout_thread.join();
            return Err(anyhow!(
                "tool process exceeded timeout ({:?}); stderr: {}",
                timeout,
                String::from_utf8_lossy(&stderr)
            ));
        }

        std::thread::sleep(Duration::from_millis(50));
    }
}
