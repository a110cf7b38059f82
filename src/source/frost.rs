//! Observation source backed by the MET Norway Frost API.
//!
//! Frost serves daily aggregates under `observations/v0.jsonld` with HTTP basic
//! auth, where the username is a registered client id and the password is
//! empty. Responses are JSON-LD; only the `data` section is of interest here.

use crate::observations::Observation;
use crate::source::error::FetchError;
use crate::source::ObservationSource;
use crate::window::{CollectionWindow, WindowStart};
use async_trait::async_trait;
use bon::bon;
use chrono::{DateTime, Days, Utc};
use log::{info, warn};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_ENDPOINT: &str = "https://frost.met.no";
const CLIENT_ID_VAR: &str = "FROST_CLIENT_ID";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The daily aggregate elements collected for every station.
pub const DAILY_ELEMENTS: [&str; 5] = [
    "min(air_temperature P1D)",
    "mean(air_temperature P1D)",
    "max(air_temperature P1D)",
    "sum(precipitation_amount P1D)",
    "max(wind_speed P1D)",
];

/// Client for the Frost observations endpoint.
pub struct FrostClient {
    client: reqwest::Client,
    client_id: String,
    endpoint: String,
}

#[bon]
impl FrostClient {
    /// Builds a client. The client id falls back to the `FROST_CLIENT_ID`
    /// environment variable when not given explicitly; the endpoint override
    /// exists for tests.
    #[builder]
    pub fn new(
        client_id: Option<String>,
        endpoint: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, FetchError> {
        let client_id = match client_id {
            Some(id) => id,
            None => std::env::var(CLIENT_ID_VAR).map_err(|_| FetchError::MissingClientId)?,
        };
        let client = reqwest::Client::builder()
            .timeout(timeout.unwrap_or(REQUEST_TIMEOUT))
            .gzip(true)
            .build()
            .map_err(FetchError::ClientBuild)?;
        Ok(Self {
            client,
            client_id,
            endpoint: endpoint.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
        })
    }
}

/// Renders a Frost `referencetime` range of whole days for a window, or `None`
/// when the window contains no whole day to ask for.
///
/// A resume point means data through that day exists, so the range starts the
/// day after it; a first start is included as-is.
pub(crate) fn daily_reference_time(window: &CollectionWindow) -> Option<String> {
    let from = match window.start {
        WindowStart::After(instant) => instant.date_naive().checked_add_days(Days::new(1))?,
        WindowStart::From(instant) => instant.date_naive(),
    };
    let to = window.end.date_naive();
    if from >= to {
        return None;
    }
    Some(format!("{from}/{to}"))
}

#[derive(Debug, Deserialize)]
struct FrostResponse {
    #[serde(default)]
    data: Vec<FrostItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FrostItem {
    source_id: String,
    reference_time: DateTime<Utc>,
    #[serde(default)]
    observations: Vec<FrostValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FrostValue {
    element_id: String,
    value: Option<f64>,
    #[serde(default)]
    unit: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FrostErrorBody {
    error: Option<FrostErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct FrostErrorDetail {
    reason: Option<String>,
}

/// Extracts the human-readable reason from a Frost error body, or falls back
/// to the raw body.
fn error_reason(body: &str) -> String {
    serde_json::from_str::<FrostErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .and_then(|e| e.reason)
        .unwrap_or_else(|| body.trim().to_string())
}

/// Classifies a non-success Frost status. 404 and 412 mean "no data matched
/// the request" and are not failures.
fn classify_status(status: StatusCode, station: &str, body: &str) -> Result<(), FetchError> {
    if status == StatusCode::NOT_FOUND || status == StatusCode::PRECONDITION_FAILED {
        return Ok(());
    }
    let reason = format!("{status}: {}", error_reason(body));
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Err(FetchError::Transient {
            station: station.to_string(),
            reason,
            source: None,
        })
    } else {
        Err(FetchError::Permanent {
            station: station.to_string(),
            reason,
            source: None,
        })
    }
}

/// Flattens the Frost response items into observation records. Elements with a
/// missing value are skipped. The station part of `sourceId` comes back
/// suffixed with a sensor number (`SN18700:0`); only the station part is kept.
fn parse_items(items: Vec<FrostItem>) -> Vec<Observation> {
    let mut observations = Vec::new();
    for item in items {
        let source_id = item
            .source_id
            .split(':')
            .next()
            .unwrap_or(item.source_id.as_str())
            .to_string();
        for value in item.observations {
            let Some(measured) = value.value else {
                continue;
            };
            observations.push(Observation {
                source_id: source_id.clone(),
                element_id: value.element_id,
                observation_time: item.reference_time,
                value: measured,
                unit: value.unit.clone().unwrap_or_default(),
            });
        }
    }
    observations
}

#[async_trait]
impl ObservationSource for FrostClient {
    async fn fetch(
        &self,
        station: &str,
        window: &CollectionWindow,
    ) -> Result<Vec<Observation>, FetchError> {
        let Some(reference_time) = daily_reference_time(window) else {
            return Ok(Vec::new());
        };
        let url = format!("{}/observations/v0.jsonld", self.endpoint);
        let elements = DAILY_ELEMENTS.join(",");
        info!("fetching station {station} for {reference_time}");

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.client_id, Some(""))
            .query(&[
                ("sources", station),
                ("elements", elements.as_str()),
                ("referencetime", reference_time.as_str()),
                ("levels", "default"),
                ("timeoffsets", "default"),
            ])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    FetchError::Transient {
                        station: station.to_string(),
                        reason: e.to_string(),
                        source: Some(e),
                    }
                } else {
                    FetchError::Permanent {
                        station: station.to_string(),
                        reason: e.to_string(),
                        source: Some(e),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            classify_status(status, station, &body)?;
            warn!("no data for station {station} in {reference_time}");
            return Ok(Vec::new());
        }

        let parsed: FrostResponse =
            response
                .json()
                .await
                .map_err(|e| FetchError::Decode {
                    station: station.to_string(),
                    source: e,
                })?;
        Ok(parse_items(parsed.data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};

    fn instant(d: u32) -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(2024, 3, d)
            .unwrap()
            .and_time(NaiveTime::MIN)
            .and_utc()
    }

    #[test]
    fn resume_windows_start_the_day_after_the_checkpoint() {
        let window = CollectionWindow {
            start: WindowStart::After(instant(4)),
            end: instant(10),
        };
        assert_eq!(
            daily_reference_time(&window).as_deref(),
            Some("2024-03-05/2024-03-10")
        );
    }

    #[test]
    fn first_windows_start_on_the_configured_day() {
        let window = CollectionWindow {
            start: WindowStart::From(instant(1)),
            end: instant(10),
        };
        assert_eq!(
            daily_reference_time(&window).as_deref(),
            Some("2024-03-01/2024-03-10")
        );
    }

    #[test]
    fn a_window_without_a_whole_day_yields_no_range() {
        let window = CollectionWindow {
            start: WindowStart::After(instant(9)),
            end: instant(10),
        };
        assert_eq!(daily_reference_time(&window), None);
    }

    #[test]
    fn decodes_a_frost_response() {
        let body = r#"{
            "@type": "ObservationResponse",
            "data": [
                {
                    "sourceId": "SN18700:0",
                    "referenceTime": "2024-03-01T00:00:00.000Z",
                    "observations": [
                        {
                            "elementId": "mean(air_temperature P1D)",
                            "value": -2.4,
                            "unit": "degC",
                            "timeOffset": "PT0H"
                        },
                        {
                            "elementId": "max(wind_speed P1D)",
                            "value": null,
                            "unit": "m/s"
                        }
                    ]
                }
            ]
        }"#;
        let parsed: FrostResponse = serde_json::from_str(body).unwrap();
        let observations = parse_items(parsed.data);
        assert_eq!(
            observations,
            vec![Observation {
                source_id: "SN18700".to_string(),
                element_id: "mean(air_temperature P1D)".to_string(),
                observation_time: instant(1),
                value: -2.4,
                unit: "degC".to_string(),
            }]
        );
    }

    #[test]
    fn no_data_statuses_are_not_failures() {
        assert!(classify_status(StatusCode::NOT_FOUND, "SN18700", "").is_ok());
        assert!(classify_status(StatusCode::PRECONDITION_FAILED, "SN18700", "").is_ok());
    }

    #[test]
    fn throttling_and_server_errors_are_transient() {
        for status in [
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::SERVICE_UNAVAILABLE,
        ] {
            let err = classify_status(status, "SN18700", "{}").unwrap_err();
            assert!(err.is_transient(), "{status}");
        }
    }

    #[test]
    fn client_errors_are_permanent_with_the_frost_reason() {
        let body = r#"{"error": {"reason": "Invalid client id"}}"#;
        let err = classify_status(StatusCode::UNAUTHORIZED, "SN18700", body).unwrap_err();
        assert!(!err.is_transient());
        assert!(err.to_string().contains("Invalid client id"));
    }
}
