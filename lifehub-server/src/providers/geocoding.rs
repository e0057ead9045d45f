//! Place search and geocoding through Nominatim

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ProviderError;

/// Normalized search result
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Place {
    pub name: String,
    pub address: String,
    pub city: String,
    pub province: String,
    pub country: String,
    pub postal_code: String,
    pub latitude: f64,
    pub longitude: f64,
    pub location_type: String,
    pub category: String,
    pub provider: String,
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Free-text place search, optionally narrowed to a city or region
    async fn search(&self, query: &str, city: Option<&str>, region: Option<&str>)
        -> Result<(Vec<Place>, Value), ProviderError>;

    /// Best match for an address
    async fn geocode(&self, address: &str) -> Result<(Place, Value), ProviderError>;
}

pub struct NominatimGeocoder {
    http: reqwest::Client,
    base_url: String,
}

impl NominatimGeocoder {
    pub fn new(http: reqwest::Client, base_url: String) -> Self {
        Self { http, base_url }
    }

    async fn query(&self, q: &str, limit: u32) -> Result<Value, ProviderError> {
        let limit = limit.to_string();
        let response = self
            .http
            .get(format!("{}/search", self.base_url.trim_end_matches('/')))
            .query(&[("q", q), ("format", "jsonv2"), ("addressdetails", "1"), ("limit", limit.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api(status, text));
        }
        Ok(response.json().await?)
    }
}

#[derive(Debug, Deserialize)]
struct NominatimHit {
    #[serde(default)]
    name: String,
    #[serde(default)]
    display_name: String,
    lat: String,
    lon: String,
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    address: NominatimAddress,
}

#[derive(Debug, Default, Deserialize)]
struct NominatimAddress {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    state: Option<String>,
    province: Option<String>,
    country: Option<String>,
    postcode: Option<String>,
}

/// Convert a Nominatim result array into places
pub fn parse_nominatim(body: &Value) -> Result<Vec<Place>, ProviderError> {
    let hits: Vec<NominatimHit> =
        serde_json::from_value(body.clone()).map_err(|e| ProviderError::Malformed(e.to_string()))?;

    hits.into_iter()
        .map(|hit| {
            let latitude = hit
                .lat
                .parse::<f64>()
                .map_err(|e| ProviderError::Malformed(format!("latitude: {}", e)))?;
            let longitude = hit
                .lon
                .parse::<f64>()
                .map_err(|e| ProviderError::Malformed(format!("longitude: {}", e)))?;
            let a = hit.address;
            let name = if hit.name.is_empty() {
                hit.display_name.split(',').next().unwrap_or_default().trim().to_string()
            } else {
                hit.name
            };
            Ok(Place {
                name,
                address: hit.display_name,
                city: a.city.or(a.town).or(a.village).unwrap_or_default(),
                province: a.state.or(a.province).unwrap_or_default(),
                country: a.country.unwrap_or_default(),
                postal_code: a.postcode.unwrap_or_default(),
                latitude,
                longitude,
                location_type: hit.kind,
                category: hit.category,
                provider: "nominatim".to_string(),
            })
        })
        .collect()
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn search(
        &self,
        query: &str,
        city: Option<&str>,
        region: Option<&str>,
    ) -> Result<(Vec<Place>, Value), ProviderError> {
        let q = [Some(query), city, region]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", ");
        let body = self.query(&q, 10).await?;
        let places = parse_nominatim(&body)?;
        Ok((places, body))
    }

    async fn geocode(&self, address: &str) -> Result<(Place, Value), ProviderError> {
        let body = self.query(address, 1).await?;
        let place = parse_nominatim(&body)?
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::NoResults(address.to_string()))?;
        Ok((place, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_nominatim() {
        let body = json!([{
            "name": "",
            "display_name": "Tiananmen, Dongcheng, Beijing, China",
            "lat": "39.9087",
            "lon": "116.3975",
            "type": "attraction",
            "category": "tourism",
            "address": {"city": "Beijing", "country": "China", "postcode": "100006"}
        }]);
        let places = parse_nominatim(&body).unwrap();
        assert_eq!(places.len(), 1);
        assert_eq!(places[0].name, "Tiananmen");
        assert_eq!(places[0].city, "Beijing");
        assert!((places[0].latitude - 39.9087).abs() < 1e-9);
        assert_eq!(places[0].location_type, "attraction");
    }

    #[test]
    fn test_parse_bad_coordinates() {
        let body = json!([{"display_name": "x", "lat": "north", "lon": "1"}]);
        assert!(parse_nominatim(&body).is_err());
    }
}
