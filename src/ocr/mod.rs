pub mod matcher;
pub mod tesseract;

use anyhow::Result;
use std::sync::Arc;

pub use matcher::{find_token, is_valid_format, preprocess, RecognizedToken};
pub use tesseract::TesseractFactory;

/// Engine parameters applied when a worker is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrConfig {
    pub language: String,
    pub char_whitelist: String,
}

/// A ready-to-use recognizer. Calls block; run them on a blocking thread.
pub trait OcrEngine: Send + Sync {
    /// Recognizes text in an encoded image (JPEG or PNG).
    fn recognize(&self, image: &[u8]) -> Result<String>;

    /// Releases the engine. Later `recognize` calls fail.
    fn terminate(&self);
}

/// Creates engines: worker creation, language load and initialisation,
/// parameter setup. The watchdog calls this again to get a fresh engine.
pub trait OcrEngineFactory: Send + Sync {
    fn create(&self, config: &OcrConfig) -> Result<Arc<dyn OcrEngine>>;
}
