//! Third-party service adapters
//!
//! Each external dependency sits behind a trait so handlers never talk to
//! HTTP or subprocesses directly, and tests can inject stubs.

use std::sync::Arc;
use std::time::Duration;

use lifehub_common::config::ProvidersSection;
use thiserror::Error;

pub mod geocoding;
pub mod ocr;
pub mod translation;
pub mod weather;

pub use geocoding::{Geocoder, NominatimGeocoder, Place};
pub use ocr::{OcrEngine, OcrOutput, TesseractEngine};
pub use translation::{LibreTranslate, Translation, TranslationProvider};
pub use weather::{OpenWeather, WeatherProvider, WeatherReport};

/// Provider failures
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Unexpected response: {0}")]
    Malformed(String),

    #[error("No results for '{0}'")]
    NoResults(String),

    #[error("OCR engine failed: {0}")]
    Engine(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => ProviderError::Api(status.as_u16(), err.to_string()),
            None if err.is_decode() => ProviderError::Malformed(err.to_string()),
            None => ProviderError::Network(err.to_string()),
        }
    }
}

/// Every adapter the server uses
#[derive(Clone)]
pub struct Providers {
    pub weather: Arc<dyn WeatherProvider>,
    pub translation: Arc<dyn TranslationProvider>,
    pub geocoder: Arc<dyn Geocoder>,
    pub ocr: Arc<dyn OcrEngine>,
}

impl Providers {
    /// Build the real adapters from configuration
    pub fn from_config(config: &ProvidersSection) -> Result<Self, ProviderError> {
        let http = http_client(config)?;
        Ok(Self {
            weather: Arc::new(OpenWeather::new(
                http.clone(),
                config.openweather_base_url.clone(),
                config.openweather_api_key.clone(),
            )),
            translation: Arc::new(LibreTranslate::new(
                http.clone(),
                config.translate_base_url.clone(),
                config.translate_api_key.clone(),
            )),
            geocoder: Arc::new(NominatimGeocoder::new(http, config.geocoder_base_url.clone())),
            ocr: Arc::new(TesseractEngine::new(
                config.tesseract_path.clone(),
                config.ocr_language.clone(),
            )),
        })
    }
}

fn http_client(config: &ProvidersSection) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .user_agent(config.geocoder_user_agent.clone())
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .build()
        .map_err(|e| ProviderError::Network(e.to_string()))
}
