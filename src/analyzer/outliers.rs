use crate::analyzer::statistics::quantile;
use crate::analyzer::{numeric_value, text_value};
use crate::model::{Dataset, EngineError, Field, FieldKind};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Default IQR multiplier for the fences.
pub const IQR_FACTOR: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IqrBounds {
    pub q1: f64,
    pub q3: f64,
    pub low: f64,
    pub high: f64,
}

impl IqrBounds {
    pub fn iqr(&self) -> f64 {
        self.q3 - self.q1
    }

    /// True when `value` lies outside `[low, high]`.
    pub fn is_outlier(&self, value: f64) -> bool {
        value < self.low || value > self.high
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutlierFlag {
    /// Position of the row in the input.
    pub row_index: usize,
    pub group_key: Option<String>,
    pub value: f64,
    pub bounds: IqrBounds,
    pub is_outlier: bool,
}

/// One flag per input row, in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct OutlierReport {
    pub field: Field,
    pub group_field: Option<Field>,
    pub flags: Vec<OutlierFlag>,
}

impl OutlierReport {
    pub fn outlier_count(&self) -> usize {
        self.flags.iter().filter(|f| f.is_outlier).count()
    }
}

pub fn iqr_bounds(values: &[f64]) -> Result<IqrBounds, EngineError> {
    iqr_bounds_with_factor(values, IQR_FACTOR)
}

/// Tukey fences `Q1 - factor * IQR` and `Q3 + factor * IQR`.
///
/// Small samples are not rejected; with fewer than four values the fences
/// simply tend to contain everything.
pub fn iqr_bounds_with_factor(values: &[f64], factor: f64) -> Result<IqrBounds, EngineError> {
    check_factor(factor)?;
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let q1 = quantile(&sorted, 0.25)?;
    let q3 = quantile(&sorted, 0.75)?;
    let iqr = q3 - q1;
    Ok(IqrBounds {
        q1,
        q3,
        low: q1 - factor * iqr,
        high: q3 + factor * iqr,
    })
}

pub fn flag_outliers<D: Dataset>(
    data: &D,
    field: Field,
    group_field: Option<Field>,
) -> Result<OutlierReport, EngineError> {
    flag_outliers_with_factor(data, field, group_field, IQR_FACTOR)
}

/// Flags every row whose `field` value falls outside the IQR fences of its
/// group, or of the whole input when no group field is given.
pub fn flag_outliers_with_factor<D: Dataset>(
    data: &D,
    field: Field,
    group_field: Option<Field>,
    factor: f64,
) -> Result<OutlierReport, EngineError> {
    check_factor(factor)?;
    let schema = data.schema();
    schema.require_kind(field, FieldKind::Numeric)?;
    if let Some(group) = group_field {
        schema.require_kind(group, FieldKind::Text)?;
    }
    if data.is_empty() {
        return Err(EngineError::EmptyInput(format!(
            "no rows to scan for outliers in '{}'",
            field
        )));
    }

    let mut keyed = Vec::with_capacity(data.len());
    let mut groups: BTreeMap<Option<&str>, Vec<f64>> = BTreeMap::new();
    for row in data.rows() {
        let key = match group_field {
            Some(group) => Some(text_value(row, group)?),
            None => None,
        };
        let value = numeric_value(row, field)?;
        groups.entry(key).or_default().push(value);
        keyed.push((key, value));
    }

    let mut bounds = BTreeMap::new();
    for (key, values) in &groups {
        let group_bounds = iqr_bounds_with_factor(values, factor)?;
        debug!(
            "IQR of '{}' for {}: {} (fences {} to {}).",
            field,
            key.unwrap_or("all rows"),
            group_bounds.iqr(),
            group_bounds.low,
            group_bounds.high
        );
        bounds.insert(*key, group_bounds);
    }

    let mut flags = Vec::with_capacity(keyed.len());
    for (row_index, (key, value)) in keyed.into_iter().enumerate() {
        let group_bounds = bounds[&key];
        flags.push(OutlierFlag {
            row_index,
            group_key: key.map(str::to_string),
            value,
            bounds: group_bounds,
            is_outlier: group_bounds.is_outlier(value),
        });
    }

    let report = OutlierReport {
        field,
        group_field,
        flags,
    };
    info!(
        "Detected {} outliers in column '{}' using IQR.",
        report.outlier_count(),
        field
    );
    Ok(report)
}

fn check_factor(factor: f64) -> Result<(), EngineError> {
    if factor.is_finite() && factor > 0.0 {
        Ok(())
    } else {
        Err(EngineError::InvalidParameter(format!(
            "IQR factor must be a positive number, got {}",
            factor
        )))
    }
}
