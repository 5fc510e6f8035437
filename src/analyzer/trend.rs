use crate::analyzer::{date_value, numeric_value, text_value};
use crate::model::{Dataset, EngineError, Field, FieldKind};
use chrono::{Datelike, Duration, NaiveDate};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::info;

/// Calendar bucket used for trend series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum Period {
    Day,
    Week,
    Month,
}

impl Period {
    /// First day of the bucket containing `date`. Weeks start on Monday.
    pub fn start_of(self, date: NaiveDate) -> NaiveDate {
        match self {
            Period::Day => date,
            Period::Week => date - Duration::days(i64::from(date.weekday().num_days_from_monday())),
            Period::Month => date - Duration::days(i64::from(date.day0())),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::Day => f.write_str("day"),
            Period::Week => f.write_str("week"),
            Period::Month => f.write_str("month"),
        }
    }
}

impl FromStr for Period {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "D" | "d" => Ok(Period::Day),
            "W" | "w" => Ok(Period::Week),
            "M" | "m" => Ok(Period::Month),
            other => match other.to_lowercase().as_str() {
                "day" | "daily" => Ok(Period::Day),
                "week" | "weekly" => Ok(Period::Week),
                "month" | "monthly" => Ok(Period::Month),
                _ => Err(EngineError::InvalidParameter(format!(
                    "period must be day, week or month, got '{}'",
                    other
                ))),
            },
        }
    }
}

impl TryFrom<String> for Period {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesRow {
    pub period_start: NaiveDate,
    pub group_key: Option<String>,
    /// One total per metric column, in request order.
    pub totals: Vec<f64>,
}

/// Sparse series: only periods containing at least one record appear.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesTable {
    pub date_field: Field,
    pub period: Period,
    pub metric_fields: Vec<Field>,
    pub group_field: Option<Field>,
    pub rows: Vec<TimeSeriesRow>,
}

/// Sums each metric per `(period_start[, group])`, ordered by period then group.
/// Gaps are left out rather than zero-filled.
pub fn aggregate_time<D: Dataset>(
    data: &D,
    date_field: Field,
    period: Period,
    metric_fields: &[Field],
    group_field: Option<Field>,
) -> Result<TimeSeriesTable, EngineError> {
    if metric_fields.is_empty() {
        return Err(EngineError::InvalidParameter(
            "at least one metric column is required".into(),
        ));
    }
    let schema = data.schema();
    schema.require_kind(date_field, FieldKind::Date)?;
    for (i, field) in metric_fields.iter().enumerate() {
        schema.require_kind(*field, FieldKind::Numeric)?;
        if metric_fields[..i].contains(field) {
            return Err(EngineError::InvalidParameter(format!(
                "metric column '{}' requested twice",
                field
            )));
        }
    }
    if let Some(group) = group_field {
        schema.require_kind(group, FieldKind::Text)?;
    }

    let mut buckets: BTreeMap<(NaiveDate, Option<&str>), Vec<f64>> = BTreeMap::new();
    for row in data.rows() {
        let start = period.start_of(date_value(row, date_field)?);
        let key = match group_field {
            Some(group) => Some(text_value(row, group)?),
            None => None,
        };
        let totals = buckets
            .entry((start, key))
            .or_insert_with(|| vec![0.0; metric_fields.len()]);
        for (total, field) in totals.iter_mut().zip(metric_fields) {
            *total += numeric_value(row, *field)?;
        }
    }

    let rows: Vec<TimeSeriesRow> = buckets
        .into_iter()
        .map(|((period_start, key), totals)| TimeSeriesRow {
            period_start,
            group_key: key.map(str::to_string),
            totals,
        })
        .collect();

    match group_field {
        Some(group) => info!(
            "Aggregated {} rows by {} and '{}'.",
            rows.len(),
            period,
            group
        ),
        None => info!("Aggregated {} rows by {}.", rows.len(), period),
    }
    Ok(TimeSeriesTable {
        date_field,
        period,
        metric_fields: metric_fields.to_vec(),
        group_field,
        rows,
    })
}
