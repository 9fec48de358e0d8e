/// Weather tools backed by the US National Weather Service API
///
/// Implements the `get_alerts` and `get_forecast` tools. Upstream failures are
/// not errors: the tools answer with a short explanation the model can relay.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::WeatherConfig;
use crate::provider::{
    input_schema_for, parse_arguments, ToolArguments, ToolDefinition, ToolError,
    ToolHandler, ToolRegistry,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const FORECAST_PERIODS: usize = 5;

/// Thin NWS API client
pub struct NwsClient {
    client: reqwest::Client,
    api_base: String,
}

impl NwsClient {
    pub fn new(config: &WeatherConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// GET a GeoJSON document; any failure yields `None`
    pub async fn fetch(&self, url: &str) -> Option<Value> {
        debug!("NWS request: {}", url);

        let response = self
            .client
            .get(url)
            .header("Accept", "application/geo+json")
            .send()
            .await
            .and_then(|r| r.error_for_status());

        match response {
            Ok(response) => match response.json::<Value>().await {
                Ok(body) => Some(body),
                Err(e) => {
                    warn!("NWS response from {} was not JSON: {}", url, e);
                    None
                }
            },
            Err(e) => {
                warn!("NWS request to {} failed: {}", url, e);
                None
            }
        }
    }
}

/// Parameters for `get_alerts`
#[derive(Debug, Deserialize, JsonSchema)]
pub struct AlertsParams {
    /// Two-letter US state code (e.g. CA, NY)
    pub state: String,
}

/// Parameters for `get_forecast`
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ForecastParams {
    /// Latitude of the location
    pub latitude: f64,
    /// Longitude of the location
    pub longitude: f64,
}

pub struct GetAlerts {
    nws: Arc<NwsClient>,
}

#[async_trait]
impl ToolHandler for GetAlerts {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "get_alerts".to_string(),
            description: "Get weather alerts for a US state.".to_string(),
            input_schema: input_schema_for::<AlertsParams>(),
        }
    }

    async fn call(&self, arguments: ToolArguments) -> Result<String, ToolError> {
        let params: AlertsParams = parse_arguments(arguments)?;
        let state = params.state.trim().to_ascii_uppercase();
        if state.len() != 2 || !state.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ToolError::InvalidArguments(format!(
                "'{}' is not a two-letter state code",
                params.state
            )));
        }

        let url = format!("{}/alerts/active/area/{}", self.nws.api_base(), state);
        Ok(alerts_message(self.nws.fetch(&url).await.as_ref()))
    }
}

pub struct GetForecast {
    nws: Arc<NwsClient>,
}

#[async_trait]
impl ToolHandler for GetForecast {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "get_forecast".to_string(),
            description: "Get weather forecast for a location.".to_string(),
            input_schema: input_schema_for::<ForecastParams>(),
        }
    }

    async fn call(&self, arguments: ToolArguments) -> Result<String, ToolError> {
        let params: ForecastParams = parse_arguments(arguments)?;
        if !(-90.0..=90.0).contains(&params.latitude) {
            return Err(ToolError::InvalidArguments(format!(
                "latitude {} is outside [-90, 90]",
                params.latitude
            )));
        }
        if !(-180.0..=180.0).contains(&params.longitude) {
            return Err(ToolError::InvalidArguments(format!(
                "longitude {} is outside [-180, 180]",
                params.longitude
            )));
        }

        // The points endpoint tells us which grid forecast URL to use
        let points_url = format!(
            "{}/points/{},{}",
            self.nws.api_base(),
            params.latitude,
            params.longitude
        );
        let forecast_url = match self.nws.fetch(&points_url).await {
            Some(points) => points["properties"]["forecast"].as_str().map(str::to_string),
            None => None,
        };
        let Some(forecast_url) = forecast_url else {
            return Ok("Unable to fetch forecast data for this location.".to_string());
        };

        Ok(forecast_message(self.nws.fetch(&forecast_url).await.as_ref()))
    }
}

/// Render an alerts response
pub fn alerts_message(data: Option<&Value>) -> String {
    let features = match data.and_then(|d| d.get("features")).and_then(Value::as_array) {
        Some(features) => features,
        None => return "Unable to fetch alerts or no alerts found.".to_string(),
    };

    if features.is_empty() {
        return "No active alerts for this state.".to_string();
    }

    features
        .iter()
        .map(format_alert)
        .collect::<Vec<_>>()
        .join("\n---\n")
}

/// Render a forecast response, keeping the first few periods
pub fn forecast_message(data: Option<&Value>) -> String {
    let periods = match data.and_then(|d| d["properties"]["periods"].as_array()) {
        Some(periods) => periods,
        None => return "Unable to fetch detailed forecast.".to_string(),
    };

    periods
        .iter()
        .take(FORECAST_PERIODS)
        .map(format_period)
        .collect::<Vec<_>>()
        .join("\n---\n")
}

fn text_or<'a>(value: &'a Value, default: &'a str) -> &'a str {
    value.as_str().unwrap_or(default)
}

pub fn format_alert(feature: &Value) -> String {
    let props = &feature["properties"];
    format!(
        "\nEvent: {}\nArea: {}\nSeverity: {}\nDescription: {}\nInstructions: {}\n",
        text_or(&props["event"], "Unknown"),
        text_or(&props["areaDesc"], "Unknown"),
        text_or(&props["severity"], "Unknown"),
        text_or(&props["description"], "No description available"),
        text_or(&props["instruction"], "No specific instructions provided"),
    )
}

pub fn format_period(period: &Value) -> String {
    let temperature = match &period["temperature"] {
        Value::Null => "?".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    format!(
        "\n{}:\nTemperature: {}°{}\nWind: {} {}\nForecast: {}\n",
        text_or(&period["name"], "Unknown"),
        temperature,
        text_or(&period["temperatureUnit"], ""),
        text_or(&period["windSpeed"], "Unknown"),
        text_or(&period["windDirection"], ""),
        text_or(&period["detailedForecast"], "No forecast available"),
    )
}

/// Build the registry served as the `weather` server
pub fn weather_registry(config: &WeatherConfig) -> Result<ToolRegistry, super::ToolPackError> {
    let nws = Arc::new(NwsClient::new(config)?);

    let mut registry = ToolRegistry::new();
    registry.register(GetAlerts { nws: Arc::clone(&nws) })?;
    registry.register(GetForecast { nws })?;
    Ok(registry)
}
