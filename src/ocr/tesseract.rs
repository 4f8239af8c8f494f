use anyhow::{anyhow, bail, Context, Result};
use log::{debug, info};
use std::{
    io::Write,
    path::PathBuf,
    process::{Command, Stdio},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Instant,
};

use super::{OcrConfig, OcrEngine, OcrEngineFactory};

/// Drives the `tesseract` command-line tool, one process per recognition.
pub struct TesseractFactory {
    binary: PathBuf,
}

impl TesseractFactory {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn available_languages(&self) -> Result<Vec<String>> {
        let output = Command::new(&self.binary)
            .arg("--list-langs")
            .output()
            .with_context(|| format!("failed to run {} --list-langs", self.binary.display()))?;
        if !output.status.success() {
            bail!(
                "{} --list-langs exited with {}",
                self.binary.display(),
                output.status
            );
        }
        Ok(parse_language_list(&String::from_utf8_lossy(&output.stdout)))
    }
}

impl OcrEngineFactory for TesseractFactory {
    fn create(&self, config: &OcrConfig) -> Result<Arc<dyn OcrEngine>> {
        let languages = self.available_languages()?;
        if !languages.iter().any(|lang| lang == &config.language) {
            bail!(
                "tesseract has no '{}' language data (installed: {})",
                config.language,
                languages.join(", ")
            );
        }

        info!(
            "tesseract engine ready (lang={}, whitelist={})",
            config.language, config.char_whitelist
        );
        Ok(Arc::new(TesseractEngine {
            binary: self.binary.clone(),
            config: config.clone(),
            terminated: AtomicBool::new(false),
        }))
    }
}

pub struct TesseractEngine {
    binary: PathBuf,
    config: OcrConfig,
    terminated: AtomicBool,
}

impl TesseractEngine {
    fn command(&self) -> Command {
        let mut command = Command::new(&self.binary);
        command
            .args(["stdin", "stdout", "-l", self.config.language.as_str()])
            .arg("-c")
            .arg(format!("tessedit_char_whitelist={}", self.config.char_whitelist))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        command
    }
}

impl OcrEngine for TesseractEngine {
    fn recognize(&self, image: &[u8]) -> Result<String> {
        if self.terminated.load(Ordering::SeqCst) {
            bail!("tesseract engine terminated");
        }

        let start = Instant::now();
        let mut child = self
            .command()
            .spawn()
            .with_context(|| format!("failed to spawn {}", self.binary.display()))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("tesseract stdin unavailable"))?;
        let output = std::thread::scope(|scope| -> Result<std::process::Output> {
            let writer = scope.spawn(move || stdin.write_all(image));
            let output = child.wait_with_output();
            let written = writer
                .join()
                .map_err(|_| anyhow!("tesseract stdin writer panicked"))?;
            written.context("failed to feed image to tesseract")?;
            output.context("failed to wait for tesseract")
        })?;

        if !output.status.success() {
            bail!(
                "tesseract exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!(
            "tesseract read {} chars in {}ms",
            text.len(),
            start.elapsed().as_millis()
        );
        Ok(text)
    }

    fn terminate(&self) {
        self.terminated.store(true, Ordering::SeqCst);
    }
}

/// `tesseract --list-langs` prints a header line, then one code per line.
fn parse_language_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter(|line| !line.starts_with("List of available languages"))
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
