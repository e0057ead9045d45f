//! Shared fixtures for the HTTP integration tests
//!
//! Each test gets its own SQLite file and media folder in a temp dir, and
//! third-party providers are replaced by deterministic stubs.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, HeaderMap, Request, StatusCode},
    Router,
};
use chrono::Utc;
use lifehub_common::config::TomlConfig;
use lifehub_common::db::init_database;
use lifehub_server::providers::{
    Geocoder, OcrEngine, OcrOutput, Place, ProviderError, Providers, Translation, TranslationProvider,
    WeatherProvider, WeatherReport,
};
use lifehub_server::{build_router, AppState};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot`

pub const PASSWORD: &str = "correct-horse-42";

/// Router plus the temp dir that must outlive it
pub struct TestApp {
    pub router: Router,
    pub weather_calls: Arc<AtomicUsize>,
    pub dir: TempDir,
}

/// Response status, headers and JSON body (`Null` when empty or not JSON)
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
    pub text: String,
}

/// Registered user with a valid access token
pub struct TestUser {
    pub id: String,
    pub access: String,
    pub refresh: String,
}

pub fn test_config() -> TomlConfig {
    let mut config = TomlConfig::default();
    config.rate_limit.enabled = false;
    config
}

pub async fn setup() -> TestApp {
    setup_with(test_config()).await
}

pub async fn setup_with(config: TomlConfig) -> TestApp {
    setup_with_ocr(config, Arc::new(StubOcr)).await
}

pub async fn setup_with_ocr(config: TomlConfig, ocr: Arc<dyn OcrEngine>) -> TestApp {
    let dir = TempDir::new().expect("Should create temp dir");
    let db = init_database(&dir.path().join("lifehub.db"))
        .await
        .expect("Should initialize database");

    let weather_calls = Arc::new(AtomicUsize::new(0));
    let providers = Providers {
        weather: Arc::new(StubWeather {
            calls: weather_calls.clone(),
        }),
        translation: Arc::new(StubTranslation),
        geocoder: Arc::new(StubGeocoder),
        ocr,
    };
    let state = AppState::with_providers(db, config, "test-signing-secret", dir.path().join("media"), providers);

    TestApp {
        router: build_router(state),
        weather_calls,
        dir,
    }
}

impl TestApp {
    pub async fn send(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> TestResponse {
        self.send_with_headers(method, uri, token, &[], body).await
    }

    pub async fn send_with_headers(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        extra_headers: &[(&str, String)],
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::USER_AGENT, "lifehub-tests/1.0");
        for (name, value) in extra_headers {
            builder = builder.header(*name, value.as_str());
        }
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Should read body");
        let text = String::from_utf8_lossy(&bytes).to_string();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        TestResponse {
            status,
            headers,
            body,
            text,
        }
    }

    pub async fn get(&self, uri: &str, user: &TestUser) -> TestResponse {
        self.send("GET", uri, Some(&user.access), None).await
    }

    pub async fn post(&self, uri: &str, user: &TestUser, body: Value) -> TestResponse {
        self.send("POST", uri, Some(&user.access), Some(body)).await
    }

    pub async fn patch(&self, uri: &str, user: &TestUser, body: Value) -> TestResponse {
        self.send("PATCH", uri, Some(&user.access), Some(body)).await
    }

    pub async fn delete(&self, uri: &str, user: &TestUser) -> TestResponse {
        self.send("DELETE", uri, Some(&user.access), None).await
    }

    /// Register `name` as `<name>@example.com`
    pub async fn register(&self, name: &str) -> TestUser {
        let response = self
            .send(
                "POST",
                "/api/auth/register",
                None,
                Some(json!({
                    "username": name,
                    "email": format!("{}@example.com", name),
                    "password": PASSWORD,
                    "password_confirm": PASSWORD,
                })),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "register failed: {}", response.text);
        TestUser {
            id: response.body["user"]["id"].as_str().unwrap().to_string(),
            access: response.body["access"].as_str().unwrap().to_string(),
            refresh: response.body["refresh"].as_str().unwrap().to_string(),
        }
    }

    pub fn media_root(&self) -> std::path::PathBuf {
        self.dir.path().join("media")
    }

    pub fn database_path(&self) -> std::path::PathBuf {
        self.dir.path().join("lifehub.db")
    }
}

// Stub providers

pub struct StubWeather {
    pub calls: Arc<AtomicUsize>,
}

#[async_trait]
impl WeatherProvider for StubWeather {
    async fn current(&self, city: &str, country: Option<&str>, _units: &str) -> Result<WeatherReport, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if city.eq_ignore_ascii_case("atlantis") {
            return Err(ProviderError::NoResults(city.to_string()));
        }
        Ok(WeatherReport {
            city: city.to_string(),
            country: country.unwrap_or("CN").to_string(),
            temperature: 21.5,
            feels_like: 20.0,
            humidity: 60,
            pressure: 1013.0,
            wind_speed: 3.2,
            wind_direction: 180,
            visibility: Some(10.0),
            weather_main: "Clouds".to_string(),
            weather_description: "broken clouds".to_string(),
            weather_icon: "04d".to_string(),
            sunrise: None,
            sunset: None,
            data_time: Utc::now(),
            provider: "stub".to_string(),
            api_response: json!({"stub": true}),
        })
    }
}

pub struct StubTranslation;

#[async_trait]
impl TranslationProvider for StubTranslation {
    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<Translation, ProviderError> {
        Ok(Translation {
            translated_text: text.to_uppercase(),
            source_language: if source == "auto" { "en".to_string() } else { source.to_string() },
            target_language: target.to_string(),
            provider: "stub".to_string(),
            confidence: Some(0.9),
            api_response: json!({}),
        })
    }
}

pub struct StubGeocoder;

fn place(name: &str, lat: f64, lon: f64) -> Place {
    Place {
        name: name.to_string(),
        address: format!("{} Street", name),
        city: "Hangzhou".to_string(),
        country: "China".to_string(),
        latitude: lat,
        longitude: lon,
        location_type: "poi".to_string(),
        provider: "stub".to_string(),
        ..Place::default()
    }
}

#[async_trait]
impl Geocoder for StubGeocoder {
    async fn search(
        &self,
        query: &str,
        _city: Option<&str>,
        _region: Option<&str>,
    ) -> Result<(Vec<Place>, Value), ProviderError> {
        Ok((
            vec![place(&format!("{} A", query), 30.25, 120.16), place(&format!("{} B", query), 30.27, 120.15)],
            json!({"count": 2}),
        ))
    }

    async fn geocode(&self, address: &str) -> Result<(Place, Value), ProviderError> {
        if address.is_empty() {
            return Err(ProviderError::NoResults(address.to_string()));
        }
        Ok((place(address, 30.26, 120.17), json!({})))
    }
}

/// Recognizes every image except ones whose bytes start with `FAIL`
pub struct StubOcr;

#[async_trait]
impl OcrEngine for StubOcr {
    fn name(&self) -> &str {
        "stub"
    }

    async fn recognize(&self, image_path: &Path) -> Result<OcrOutput, ProviderError> {
        let bytes = tokio::fs::read(image_path)
            .await
            .map_err(|e| ProviderError::Engine(e.to_string()))?;
        if bytes.starts_with(b"FAIL") {
            return Err(ProviderError::Engine("unreadable image".to_string()));
        }
        Ok(OcrOutput {
            text: "Hello OCR".to_string(),
            confidence: Some(91.5),
            language: "eng".to_string(),
        })
    }
}

/// Recognizes like [`StubOcr`] after a fixed delay
pub struct SlowOcr {
    pub delay: std::time::Duration,
}

#[async_trait]
impl OcrEngine for SlowOcr {
    fn name(&self) -> &str {
        "slow"
    }

    async fn recognize(&self, image_path: &Path) -> Result<OcrOutput, ProviderError> {
        tokio::time::sleep(self.delay).await;
        StubOcr.recognize(image_path).await
    }
}
