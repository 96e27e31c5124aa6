//! Daily weather forecast tool backed by the Google Weather API.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::debug;

use crate::error::ToolError;
use crate::tools::{Tool, ToolContext};

const DEFAULT_BASE_URL: &str = "https://weather.googleapis.com/v1";

pub struct WeatherForecastTool {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    forecast_days: u8,
}

impl WeatherForecastTool {
    pub fn new(client: reqwest::Client, api_key: SecretString, forecast_days: u8) -> Self {
        Self {
            client,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            forecast_days,
        }
    }

    /// Point the tool at a different endpoint (for tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn fetch_forecast(&self, latitude: f64, longitude: f64) -> Result<String, ToolError> {
        let url = format!("{}/forecast/days:lookup", self.base_url);
        let days = self.forecast_days.to_string();
        let response = self
            .client
            .get(&url)
            .query(&[
                ("key", self.api_key.expose_secret()),
                ("location.latitude", &latitude.to_string()),
                ("location.longitude", &longitude.to_string()),
                ("days", &days),
            ])
            .send()
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool: self.name().to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::ExecutionFailed {
                tool: self.name().to_string(),
                reason: format!("HTTP {status}"),
            });
        }

        let payload: Value = response.json().await.map_err(|e| ToolError::ExecutionFailed {
            tool: self.name().to_string(),
            reason: format!("bad JSON: {e}"),
        })?;

        Ok(format_forecast(&payload))
    }
}

/// Render the forecast payload as one line per day.
fn format_forecast(payload: &Value) -> String {
    let Some(days) = payload.get("forecastDays").and_then(Value::as_array) else {
        return "No forecast data available for this location.".to_string();
    };

    let mut lines = Vec::new();
    for day in days {
        let date = day
            .get("displayDate")
            .map(|d| {
                format!(
                    "{:04}-{:02}-{:02}",
                    d.get("year").and_then(Value::as_i64).unwrap_or(0),
                    d.get("month").and_then(Value::as_i64).unwrap_or(0),
                    d.get("day").and_then(Value::as_i64).unwrap_or(0),
                )
            })
            .unwrap_or_default();
        let max = day
            .pointer("/maxTemperature/degrees")
            .and_then(Value::as_f64)
            .map(|t| format!("{t:.0}"))
            .unwrap_or_else(|| "?".to_string());
        let min = day
            .pointer("/minTemperature/degrees")
            .and_then(Value::as_f64)
            .map(|t| format!("{t:.0}"))
            .unwrap_or_else(|| "?".to_string());
        let condition = day
            .pointer("/daytimeForecast/weatherCondition/description/text")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        lines.push(format!("📅 {date}: 🌡️ {min}°C / {max}°C, ☀️ {condition}"));
    }

    if lines.is_empty() {
        "No forecast data available for this location.".to_string()
    } else {
        lines.join("\n")
    }
}

#[async_trait]
impl Tool for WeatherForecastTool {
    fn name(&self) -> &str {
        "get_weather_forecast"
    }

    fn description(&self) -> &str {
        "Get the daily weather forecast for the farmer's registered location. \
         Use this for any question about rain, temperature, or weather conditions."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {},
        })
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<String, ToolError> {
        // Coordinates come from onboarding; without them there is no
        // location to forecast and the API is not called at all.
        let (Some(latitude), Some(longitude)) = (ctx.latitude, ctx.longitude) else {
            debug!(phone = %ctx.phone, "Weather requested without a location");
            return Ok(
                "I don't have your location on file, so I can't fetch the weather. \
                 Please share your area's pin code and I'll remember it."
                    .to_string(),
            );
        };

        self.fetch_forecast(latitude, longitude).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_coordinates_short_circuits() {
        let tool = WeatherForecastTool::new(
            reqwest::Client::new(),
            SecretString::from("key"),
            5,
        )
        // Unroutable address: proves no request is made
        .with_base_url("http://127.0.0.1:1");

        let ctx = ToolContext {
            phone: "+91".to_string(),
            latitude: None,
            longitude: None,
        };
        let reply = tool.execute(json!({}), &ctx).await.unwrap();
        assert!(reply.contains("pin code"));
    }

    #[test]
    fn formats_one_line_per_day() {
        let payload = json!({
            "forecastDays": [
                {
                    "displayDate": {"year": 2026, "month": 8, "day": 29},
                    "maxTemperature": {"degrees": 31.4},
                    "minTemperature": {"degrees": 23.8},
                    "daytimeForecast": {"weatherCondition": {"description": {"text": "Partly cloudy"}}}
                },
                {
                    "displayDate": {"year": 2026, "month": 8, "day": 30},
                    "maxTemperature": {"degrees": 29.1},
                    "minTemperature": {"degrees": 22.2},
                    "daytimeForecast": {"weatherCondition": {"description": {"text": "Rain"}}}
                }
            ]
        });
        let text = format_forecast(&payload);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "📅 2026-08-29: 🌡️ 24°C / 31°C, ☀️ Partly cloudy");
        assert!(lines[1].contains("Rain"));
    }

    #[test]
    fn empty_forecast_has_fallback_text() {
        assert!(format_forecast(&json!({})).contains("No forecast data"));
        assert!(format_forecast(&json!({"forecastDays": []})).contains("No forecast data"));
    }
}
