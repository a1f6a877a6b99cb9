//! Receipt field extraction.
//!
//! Character recognition itself lives behind [`OcrBackend`]; this module
//! owns payload decoding and the pattern rules that turn raw recognized
//! text into typed receipt fields.

use std::env;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, AgentResult};

const DEFAULT_OCR_LANGUAGES: &str = "jpn+eng";
const DEFAULT_OCR_TIMEOUT_MS: u64 = 30_000;

/// Fields derived from one uploaded receipt. Produced once per upload
/// and only surfaced into a draft form, never persisted directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptFields {
    pub receipt_name: String,
    pub text: String,
    pub merchant: String,
    pub date: String,
    pub amount: String,
    pub currency: String,
}

/// Recognizes text in an uploaded payload, one string per page.
///
/// Rasterization (for PDFs) and character recognition are external
/// concerns; implementations may shell out, call a service, or return
/// canned text in tests.
#[async_trait]
pub trait OcrBackend: Send + Sync {
    async fn page_texts(&self, bytes: &[u8], mime_type: &str) -> AgentResult<Vec<String>>;
}

/// Decode the payload and derive receipt fields from the recognized text.
///
/// Accepts plain base64 or a `data:` URL. Decode failures and
/// unsupported formats are caller errors, not internal faults.
pub async fn extract_from_base64(
    backend: &dyn OcrBackend,
    file_base64: &str,
    file_type: &str,
    receipt_name: &str,
) -> AgentResult<ReceiptFields> {
    let decoded = decode_payload(file_base64)?;
    let pages = backend.page_texts(&decoded, file_type).await?;
    let text = pages
        .iter()
        .map(|page| page.trim())
        .filter(|page| !page.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    Ok(ReceiptFields {
        receipt_name: receipt_name.to_string(),
        merchant: extract_merchant(&text),
        date: extract_date(&text),
        amount: extract_amount(&text),
        currency: detect_currency(&text),
        text,
    })
}

fn decode_payload(file_base64: &str) -> AgentResult<Vec<u8>> {
    let encoded = match file_base64.strip_prefix("data:") {
        Some(rest) => rest.split_once(',').map(|(_, body)| body).unwrap_or(rest),
        None => file_base64,
    };
    STANDARD
        .decode(encoded.trim())
        .map_err(|error| AgentError::InvalidInput(format!("invalid base64 payload: {error}")))
}

static DATE_PATTERNS: LazyLock<[Regex; 2]> = LazyLock::new(|| {
    [
        Regex::new(r"\b(20\d{2}[/-]\d{1,2}[/-]\d{1,2})\b").expect("date pattern"),
        Regex::new(r"\b(20\d{2}\.\d{1,2}\.\d{1,2})\b").expect("dotted date pattern"),
    ]
});

static AMOUNT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:¥|￥|\$|€)?\s?([\d,]+(?:\.\d{1,2})?)").expect("amount pattern")
});

static NON_MERCHANT_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\d\W]+$").expect("merchant filter pattern"));

/// First non-empty line that is not digits/punctuation only.
fn extract_merchant(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !NON_MERCHANT_LINE.is_match(line))
        .unwrap_or_default()
        .to_string()
}

/// First date-looking token, separators normalized to `/`.
fn extract_date(text: &str) -> String {
    for pattern in DATE_PATTERNS.iter() {
        if let Some(found) = pattern.captures(text).and_then(|caps| caps.get(1)) {
            return found.as_str().replace(['-', '.'], "/");
        }
    }
    String::new()
}

/// The largest numeric token, formatted to two fraction digits. Receipts
/// list line items and tax below the total, so max wins.
fn extract_amount(text: &str) -> String {
    let mut max: Option<f64> = None;
    for caps in AMOUNT_PATTERN.captures_iter(text) {
        let Some(raw) = caps.get(1) else { continue };
        let normalized = raw.as_str().replace(',', "");
        if let Ok(value) = normalized.parse::<f64>() {
            max = Some(match max {
                Some(current) => current.max(value),
                None => value,
            });
        }
    }
    match max {
        Some(value) => format!("{value:.2}"),
        None => String::new(),
    }
}

fn detect_currency(text: &str) -> String {
    if text.contains("USD") || text.contains('$') {
        return "USD".to_string();
    }
    if text.contains("EUR") || text.contains('€') {
        return "EUR".to_string();
    }
    "JPY".to_string()
}

/// OCR backend shelling out to the `tesseract` CLI, with `pdftoppm`
/// rasterization for PDF uploads. Both calls are bounded by a timeout;
/// a missing binary is an external-service fault while unreadable input
/// stays a caller error.
pub struct CommandOcr {
    tesseract: String,
    pdftoppm: String,
    languages: String,
    timeout: Duration,
}

impl CommandOcr {
    pub fn new() -> Self {
        Self {
            tesseract: "tesseract".to_string(),
            pdftoppm: "pdftoppm".to_string(),
            languages: DEFAULT_OCR_LANGUAGES.to_string(),
            timeout: Duration::from_millis(DEFAULT_OCR_TIMEOUT_MS),
        }
    }

    /// Read recognition languages and timeout overrides from the
    /// environment (`KEIHI_OCR_LANGUAGES`, `KEIHI_OCR_TIMEOUT_MS`).
    pub fn from_env() -> Self {
        let mut backend = Self::new();
        if let Ok(languages) = env::var("KEIHI_OCR_LANGUAGES") {
            if !languages.is_empty() {
                backend.languages = languages;
            }
        }
        if let Some(timeout) = env::var("KEIHI_OCR_TIMEOUT_MS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
        {
            backend.timeout = Duration::from_millis(timeout);
        }
        backend
    }

    async fn run(&self, program: &str, args: &[&str]) -> AgentResult<std::process::Output> {
        let child = tokio::process::Command::new(program)
            .args(args)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .map_err(|error| {
                AgentError::ExternalService(format!("failed to spawn {program}: {error}"))
            })?;

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(error)) => Err(AgentError::ExternalService(format!(
                "{program} failed: {error}"
            ))),
            // Dropping the timed-out child sends SIGKILL.
            Err(_) => Err(AgentError::ExternalService(format!(
                "{program} timed out after {}ms",
                self.timeout.as_millis()
            ))),
        }
    }

    async fn recognize_file(&self, path: &Path) -> AgentResult<String> {
        let input = path.to_string_lossy().into_owned();
        let output = self
            .run(
                &self.tesseract,
                &[input.as_str(), "stdout", "-l", &self.languages],
            )
            .await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AgentError::InvalidInput(format!(
                "unrecognized image data: {}",
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn rasterize_pdf(&self, dir: &Path, pdf: &Path) -> AgentResult<Vec<std::path::PathBuf>> {
        let prefix = dir.join("page");
        let input = pdf.to_string_lossy().into_owned();
        let prefix_str = prefix.to_string_lossy().into_owned();
        let output = self
            .run(
                &self.pdftoppm,
                &["-r", "300", "-png", input.as_str(), prefix_str.as_str()],
            )
            .await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AgentError::InvalidInput(format!(
                "unreadable PDF data: {}",
                stderr.trim()
            )));
        }

        let mut pages = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await.map_err(|error| {
            AgentError::ExternalService(format!("failed to list rasterized pages: {error}"))
        })?;
        while let Some(entry) = entries.next_entry().await.map_err(|error| {
            AgentError::ExternalService(format!("failed to list rasterized pages: {error}"))
        })? {
            let path = entry.path();
            let is_page = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with("page") && name.ends_with(".png"));
            if is_page {
                pages.push(path);
            }
        }
        pages.sort();
        Ok(pages)
    }
}

impl Default for CommandOcr {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OcrBackend for CommandOcr {
    async fn page_texts(&self, bytes: &[u8], mime_type: &str) -> AgentResult<Vec<String>> {
        let mime = mime_type.to_ascii_lowercase();
        let is_pdf = mime.ends_with("pdf");
        if !is_pdf && !mime.starts_with("image/") {
            return Err(AgentError::InvalidInput(format!(
                "unsupported file type: {mime_type}"
            )));
        }

        let scratch = tempfile::tempdir().map_err(|error| {
            AgentError::ExternalService(format!("failed to create scratch dir: {error}"))
        })?;
        let input = scratch
            .path()
            .join(if is_pdf { "input.pdf" } else { "input" });
        tokio::fs::write(&input, bytes).await.map_err(|error| {
            AgentError::ExternalService(format!("failed to write scratch file: {error}"))
        })?;

        let mut texts = Vec::new();
        if is_pdf {
            for page in self.rasterize_pdf(scratch.path(), &input).await? {
                texts.push(self.recognize_file(&page).await?);
            }
        } else {
            texts.push(self.recognize_file(&input).await?);
        }
        Ok(texts)
    }
}
