//! Text recognition with the Tesseract command-line tool

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::ProviderError;

/// Recognized text and mean word confidence (0-100)
#[derive(Debug, Clone, PartialEq)]
pub struct OcrOutput {
    pub text: String,
    pub confidence: Option<f64>,
    pub language: String,
}

#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Provider name stored with each result
    fn name(&self) -> &str;

    async fn recognize(&self, image_path: &Path) -> Result<OcrOutput, ProviderError>;
}

pub struct TesseractEngine {
    binary: String,
    language: String,
}

impl TesseractEngine {
    pub fn new(binary: String, language: String) -> Self {
        Self { binary, language }
    }
}

/// Rebuild text and mean confidence from Tesseract TSV output
///
/// Words on the same (block, paragraph, line) are joined by spaces; lines
/// are joined by newlines. Words with confidence <= 0 are ignored in the mean.
pub fn parse_tsv(tsv: &str) -> (String, Option<f64>) {
    let mut lines: Vec<String> = Vec::new();
    let mut current_line: Option<(String, String, String)> = None;
    let mut scores: Vec<f64> = Vec::new();

    for row in tsv.lines().skip(1) {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 || cols[0] != "5" {
            continue;
        }
        let word = cols[11].trim();
        if word.is_empty() {
            continue;
        }
        if let Ok(conf) = cols[10].parse::<f64>() {
            if conf > 0.0 {
                scores.push(conf);
            }
        }

        let key = (cols[2].to_string(), cols[3].to_string(), cols[4].to_string());
        let same_line = current_line.as_ref() == Some(&key);
        match lines.last_mut() {
            Some(last) if same_line => {
                last.push(' ');
                last.push_str(word);
            }
            _ => {
                lines.push(word.to_string());
                current_line = Some(key);
            }
        }
    }

    let confidence = if scores.is_empty() {
        None
    } else {
        Some(scores.iter().sum::<f64>() / scores.len() as f64)
    };
    (lines.join("\n"), confidence)
}

#[async_trait]
impl OcrEngine for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    async fn recognize(&self, image_path: &Path) -> Result<OcrOutput, ProviderError> {
        debug!(path = %image_path.display(), "Running tesseract");
        let output = Command::new(&self.binary)
            .arg(image_path)
            .arg("stdout")
            .args(["-l", &self.language, "--psm", "6", "--oem", "3", "tsv"])
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ProviderError::Engine(format!("cannot run {}: {}", self.binary, e)))?;

        if !output.status.success() {
            return Err(ProviderError::Engine(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let (text, confidence) = parse_tsv(&String::from_utf8_lossy(&output.stdout));
        Ok(OcrOutput {
            text,
            confidence,
            language: self.language.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    #[test]
    fn test_parse_tsv_lines_and_confidence() {
        let tsv = [
            HEADER,
            "1\t1\t0\t0\t0\t0\t0\t0\t100\t100\t-1\t",
            "5\t1\t1\t1\t1\t1\t0\t0\t10\t10\t90\tHello",
            "5\t1\t1\t1\t1\t2\t0\t0\t10\t10\t80\tworld",
            "5\t1\t1\t1\t2\t1\t0\t0\t10\t10\t70\tSecond",
            "5\t1\t1\t1\t2\t2\t0\t0\t10\t10\t-1\t ",
        ]
        .join("\n");
        let (text, confidence) = parse_tsv(&tsv);
        assert_eq!(text, "Hello world\nSecond");
        assert_eq!(confidence, Some(80.0));
    }

    #[test]
    fn test_parse_tsv_empty() {
        assert_eq!(parse_tsv(HEADER), (String::new(), None));
    }

    #[tokio::test]
    async fn test_missing_binary_is_engine_error() {
        let engine = TesseractEngine::new("/nonexistent/tesseract-bin".to_string(), "eng".to_string());
        let err = engine.recognize(Path::new("/tmp/none.png")).await.unwrap_err();
        assert!(matches!(err, ProviderError::Engine(_)));
    }
}
