// Tanklog - Log water quality sensor readings to Google Sheets
//
// Copyright 2025 The tanklog authors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use serde::Deserialize;

const DEFAULT_BASE: &str = "http://api.openweathermap.org/data/2.5";

/// Ambient conditions for the configured city at poll time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeatherReading {
    /// Air temperature in degrees fahrenheit, rounded to the nearest degree
    pub temp_f: i64,
    /// Short condition label, e.g. "Clouds" or "Rain"
    pub condition: String,
}

#[derive(Debug, Deserialize)]
struct WeatherResponse {
    main: MainSection,
    weather: Vec<ConditionSection>,
}

#[derive(Debug, Deserialize)]
struct MainSection {
    temp: f64,
}

#[derive(Debug, Deserialize)]
struct ConditionSection {
    main: String,
}

/// Client for the current-weather endpoint of the weather provider.
///
/// Weather is context for the measurement row, nothing more, so every failure
/// mode collapses to "no reading": callers never see an error from this
/// client, only a logged reason and `None`.
pub struct WeatherClient {
    http: reqwest::Client,
    base: String,
    api_key: String,
}

impl WeatherClient {
    pub fn new<K>(api_key: K) -> Self
    where
        K: Into<String>,
    {
        Self::with_base(DEFAULT_BASE, api_key)
    }

    pub fn with_base<B, K>(base: B, api_key: K) -> Self
    where
        B: Into<String>,
        K: Into<String>,
    {
        WeatherClient {
            http: reqwest::Client::new(),
            base: base.into(),
            api_key: api_key.into(),
        }
    }

    /// Current temperature and conditions for a `Name,CountryCode` city, or
    /// `None` when the provider is unreachable or answers with anything but a
    /// usable reading.
    pub async fn current(&self, city: &str) -> Option<WeatherReading> {
        let url = format!("{}/weather", self.base);
        let result = self
            .http
            .get(&url)
            .query(&[("q", city), ("appid", self.api_key.as_str()), ("units", "imperial")])
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(message = "weather request failed", city = city, error = %e);
                return None;
            }
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(message = "failed to read weather response", city = city, error = %e);
                return None;
            }
        };

        if !status.is_success() {
            tracing::warn!(
                message = "weather provider returned an error",
                city = city,
                status = %status,
                body = %body,
            );
            return None;
        }

        match reading_from_body(&body) {
            Ok(reading) => Some(reading),
            Err(reason) => {
                tracing::warn!(message = "unusable weather response", city = city, reason = %reason);
                None
            }
        }
    }
}

/// Extract the rounded temperature and primary condition label from a
/// successful provider response.
fn reading_from_body(body: &str) -> Result<WeatherReading, String> {
    let parsed: WeatherResponse = serde_json::from_str(body).map_err(|e| e.to_string())?;
    let condition = parsed
        .weather
        .into_iter()
        .next()
        .ok_or_else(|| "response carries no weather conditions".to_string())?;

    Ok(WeatherReading {
        temp_f: parsed.main.temp.round() as i64,
        condition: condition.main,
    })
}
