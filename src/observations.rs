//! The observation record model and its tabular encoding.
//!
//! Observation timestamps are stored as timezone-naive UTC datetimes with
//! millisecond precision, matching how the parquet files are laid out on disk.

use chrono::{DateTime, TimeZone, Utc};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// One measured value for one element at one station and instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Station identifier, e.g. `SN18700`.
    pub source_id: String,
    /// Measured element, e.g. `mean(air_temperature P1D)`.
    pub element_id: String,
    pub observation_time: DateTime<Utc>,
    pub value: f64,
    pub unit: String,
}

/// A station known to the directory, as published alongside the observation
/// files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeatherStation {
    pub id: String,
    pub name: String,
}

pub const SOURCE_ID: &str = "source_id";
pub const ELEMENT_ID: &str = "element_id";
pub const OBSERVATION_TIME: &str = "observation_time";
pub const VALUE: &str = "value";
pub const UNIT: &str = "unit";

/// Builds the canonical observation table from a batch of records.
pub fn observations_to_frame(observations: &[Observation]) -> PolarsResult<DataFrame> {
    let source_ids: Vec<&str> = observations.iter().map(|o| o.source_id.as_str()).collect();
    let element_ids: Vec<&str> = observations.iter().map(|o| o.element_id.as_str()).collect();
    let times: Vec<i64> = observations
        .iter()
        .map(|o| o.observation_time.timestamp_millis())
        .collect();
    let values: Vec<f64> = observations.iter().map(|o| o.value).collect();
    let units: Vec<&str> = observations.iter().map(|o| o.unit.as_str()).collect();

    let mut frame = df! {
        SOURCE_ID => source_ids,
        ELEMENT_ID => element_ids,
        OBSERVATION_TIME => times,
        VALUE => values,
        UNIT => units,
    }?;
    let datetime = frame
        .column(OBSERVATION_TIME)?
        .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?;
    frame.replace(OBSERVATION_TIME, datetime.take_materialized_series())?;
    Ok(frame)
}

/// Reads a canonical observation table back into records. Rows with nulls in
/// any column are an encoding error upstream and are rejected here.
pub fn frame_to_observations(frame: &DataFrame) -> PolarsResult<Vec<Observation>> {
    let source_ids = frame.column(SOURCE_ID)?.str()?;
    let element_ids = frame.column(ELEMENT_ID)?.str()?;
    let times = frame.column(OBSERVATION_TIME)?.datetime()?;
    let values = frame.column(VALUE)?.f64()?;
    let units = frame.column(UNIT)?.str()?;

    let mut observations = Vec::with_capacity(frame.height());
    for row in 0..frame.height() {
        let (Some(source_id), Some(element_id), Some(time), Some(value), Some(unit)) = (
            source_ids.get(row),
            element_ids.get(row),
            times.get(row),
            values.get(row),
            units.get(row),
        ) else {
            polars_bail!(ComputeError: "null in observation row {}", row);
        };
        let Some(observation_time) = datetime_from_units(time, times.time_unit()) else {
            polars_bail!(ComputeError: "timestamp out of range in row {}", row);
        };
        observations.push(Observation {
            source_id: source_id.to_string(),
            element_id: element_id.to_string(),
            observation_time,
            value,
            unit: unit.to_string(),
        });
    }
    Ok(observations)
}

/// Converts a raw datetime column value into a UTC timestamp, honoring the
/// column's time unit.
pub(crate) fn datetime_from_units(value: i64, unit: TimeUnit) -> Option<DateTime<Utc>> {
    match unit {
        TimeUnit::Milliseconds => Utc.timestamp_millis_opt(value).single(),
        TimeUnit::Microseconds => Utc.timestamp_micros(value).single(),
        TimeUnit::Nanoseconds => Some(Utc.timestamp_nanos(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample() -> Vec<Observation> {
        let day = |d: u32| {
            NaiveDate::from_ymd_opt(2024, 3, d)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
                .and_utc()
        };
        vec![
            Observation {
                source_id: "SN18700".to_string(),
                element_id: "mean(air_temperature P1D)".to_string(),
                observation_time: day(1),
                value: -2.4,
                unit: "degC".to_string(),
            },
            Observation {
                source_id: "SN18700".to_string(),
                element_id: "sum(precipitation_amount P1D)".to_string(),
                observation_time: day(2),
                value: 11.0,
                unit: "mm".to_string(),
            },
        ]
    }

    #[test]
    fn frame_uses_naive_utc_millisecond_datetimes() -> PolarsResult<()> {
        let frame = observations_to_frame(&sample())?;
        assert_eq!(frame.height(), 2);
        assert_eq!(
            frame.column(OBSERVATION_TIME)?.dtype(),
            &DataType::Datetime(TimeUnit::Milliseconds, None)
        );
        Ok(())
    }

    #[test]
    fn records_survive_the_tabular_encoding() -> PolarsResult<()> {
        let records = sample();
        let frame = observations_to_frame(&records)?;
        assert_eq!(frame_to_observations(&frame)?, records);
        Ok(())
    }

    #[test]
    fn empty_batch_builds_an_empty_frame() -> PolarsResult<()> {
        let frame = observations_to_frame(&[])?;
        assert_eq!(frame.height(), 0);
        assert_eq!(
            frame.get_column_names_str(),
            vec![SOURCE_ID, ELEMENT_ID, OBSERVATION_TIME, VALUE, UNIT]
        );
        Ok(())
    }
}
