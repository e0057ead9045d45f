//! Text translation through a LibreTranslate-compatible server

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::ProviderError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Translation {
    pub translated_text: String,
    /// Detected language when the request asked for `auto`
    pub source_language: String,
    pub target_language: String,
    pub provider: String,
    pub confidence: Option<f64>,
    pub api_response: Value,
}

#[async_trait]
pub trait TranslationProvider: Send + Sync {
    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<Translation, ProviderError>;
}

pub struct LibreTranslate {
    http: reqwest::Client,
    base_url: Option<String>,
    api_key: Option<String>,
}

impl LibreTranslate {
    pub fn new(http: reqwest::Client, base_url: Option<String>, api_key: Option<String>) -> Self {
        Self { http, base_url, api_key }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranslateResponse {
    translated_text: String,
    detected_language: Option<DetectedLanguage>,
}

#[derive(Debug, Deserialize)]
struct DetectedLanguage {
    language: String,
    confidence: Option<f64>,
}

/// Convert a LibreTranslate body into a [`Translation`]
pub fn parse_libretranslate(body: Value, source: &str, target: &str) -> Result<Translation, ProviderError> {
    let raw: TranslateResponse =
        serde_json::from_value(body.clone()).map_err(|e| ProviderError::Malformed(e.to_string()))?;
    let (source_language, confidence) = match raw.detected_language {
        Some(d) if source == "auto" => (d.language, d.confidence),
        _ => (source.to_string(), None),
    };
    Ok(Translation {
        translated_text: raw.translated_text,
        source_language,
        target_language: target.to_string(),
        provider: "libretranslate".to_string(),
        confidence,
        api_response: body,
    })
}

#[async_trait]
impl TranslationProvider for LibreTranslate {
    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<Translation, ProviderError> {
        let base_url = self
            .base_url
            .as_deref()
            .ok_or(ProviderError::NotConfigured("Translation service"))?;

        let response = self
            .http
            .post(format!("{}/translate", base_url.trim_end_matches('/')))
            .json(&json!({
                "q": text,
                "source": source,
                "target": target,
                "format": "text",
                "api_key": self.api_key.clone().unwrap_or_default(),
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api(status, text));
        }

        parse_libretranslate(response.json().await?, source, target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detected_language_used_for_auto() {
        let body = json!({
            "translatedText": "Hello",
            "detectedLanguage": {"language": "zh", "confidence": 92.0}
        });
        let t = parse_libretranslate(body, "auto", "en").unwrap();
        assert_eq!(t.translated_text, "Hello");
        assert_eq!(t.source_language, "zh");
        assert_eq!(t.confidence, Some(92.0));
    }

    #[test]
    fn test_explicit_source_kept() {
        let t = parse_libretranslate(json!({"translatedText": "Bonjour"}), "en", "fr").unwrap();
        assert_eq!(t.source_language, "en");
        assert_eq!(t.confidence, None);
    }
}
