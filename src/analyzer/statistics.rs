use crate::analyzer::{numeric_value, text_value};
use crate::model::{Dataset, EngineError, Field, FieldKind};
use std::collections::BTreeMap;
use tracing::info;

/// Descriptive statistics of one numeric column within one group.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnStats {
    pub field: Field,
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    /// Sample standard deviation; `None` for single-value groups.
    pub std: Option<f64>,
    pub min: f64,
    pub q1: f64,
    pub q3: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatsRow {
    pub group_key: String,
    /// One entry per requested metric column, in request order.
    pub columns: Vec<ColumnStats>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatsTable {
    pub group_field: Field,
    pub metric_fields: Vec<Field>,
    pub rows: Vec<StatsRow>,
}

impl ColumnStats {
    pub fn from_values(field: Field, mut values: Vec<f64>) -> Result<Self, EngineError> {
        if values.is_empty() {
            return Err(EngineError::EmptyInput(format!(
                "no values to describe for column '{}'",
                field
            )));
        }
        values.sort_by(f64::total_cmp);

        let count = values.len();
        let n = count as f64;
        let mean = values.iter().sum::<f64>() / n;
        let std = if count > 1 {
            let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
            Some(variance.sqrt())
        } else {
            None
        };

        Ok(Self {
            field,
            count,
            mean,
            median: quantile(&values, 0.5)?,
            std,
            min: values[0],
            q1: quantile(&values, 0.25)?,
            q3: quantile(&values, 0.75)?,
            max: values[count - 1],
        })
    }
}

/// Quantile `p` of ascending-sorted values, interpolating linearly between
/// the two nearest order statistics at position `(n - 1) * p`.
pub fn quantile(sorted: &[f64], p: f64) -> Result<f64, EngineError> {
    if sorted.is_empty() {
        return Err(EngineError::EmptyInput(
            "quantile of an empty sample".into(),
        ));
    }
    if !(0.0..=1.0).contains(&p) {
        return Err(EngineError::InvalidParameter(format!(
            "quantile must lie in [0, 1], got {}",
            p
        )));
    }
    let position = (sorted.len() - 1) as f64 * p;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    Ok(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// Per-group count, mean, median, sample std, min, quartiles and max for each
/// metric column. Rows come out in ascending group order.
pub fn summary_stats<D: Dataset>(
    data: &D,
    group_field: Field,
    metric_fields: &[Field],
) -> Result<StatsTable, EngineError> {
    if metric_fields.is_empty() {
        return Err(EngineError::InvalidParameter(
            "at least one metric column is required".into(),
        ));
    }
    let schema = data.schema();
    schema.require_kind(group_field, FieldKind::Text)?;
    for (i, field) in metric_fields.iter().enumerate() {
        schema.require_kind(*field, FieldKind::Numeric)?;
        if metric_fields[..i].contains(field) {
            return Err(EngineError::InvalidParameter(format!(
                "metric column '{}' requested twice",
                field
            )));
        }
    }

    let mut groups: BTreeMap<&str, Vec<Vec<f64>>> = BTreeMap::new();
    for row in data.rows() {
        let key = text_value(row, group_field)?;
        let columns = groups
            .entry(key)
            .or_insert_with(|| vec![Vec::new(); metric_fields.len()]);
        for (values, field) in columns.iter_mut().zip(metric_fields) {
            values.push(numeric_value(row, *field)?);
        }
    }

    let mut rows = Vec::with_capacity(groups.len());
    for (key, columns) in groups {
        let columns = columns
            .into_iter()
            .zip(metric_fields)
            .map(|(values, field)| ColumnStats::from_values(*field, values))
            .collect::<Result<Vec<_>, _>>()?;
        rows.push(StatsRow {
            group_key: key.to_string(),
            columns,
        });
    }

    for field in metric_fields {
        info!("Statistics computed for column '{}'.", field);
    }
    info!("Summary statistics computed for {} groups.", rows.len());
    Ok(StatsTable {
        group_field,
        metric_fields: metric_fields.to_vec(),
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Record, RecordSet, Schema};
    use chrono::NaiveDate;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn data() -> RecordSet {
        let date = NaiveDate::from_ymd_opt(2022, 5, 2).unwrap();
        RecordSet::from_records(vec![
            Record::new("B", date, 1.0, 10.0),
            Record::new("A", date, 1.0, 100.0),
            Record::new("A", date, 2.0, 200.0),
            Record::new("A", date, 3.0, 300.0),
            Record::new("A", date, 4.0, 400.0),
        ])
    }

    #[test]
    fn quantile_interpolates_between_order_statistics() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert!(close(quantile(&values, 0.25).unwrap(), 1.75));
        assert!(close(quantile(&values, 0.5).unwrap(), 2.5));
        assert!(close(quantile(&values, 0.75).unwrap(), 3.25));
        assert!(close(quantile(&values, 1.0).unwrap(), 4.0));
        assert!(close(quantile(&[7.0], 0.25).unwrap(), 7.0));
    }

    #[test]
    fn quantile_rejects_empty_sample() {
        assert!(matches!(quantile(&[], 0.5), Err(EngineError::EmptyInput(_))));
    }

    #[test]
    fn describes_each_group_in_key_order() {
        let table = summary_stats(&data(), Field::Asin, &[Field::Qty, Field::Amount]).unwrap();
        let keys: Vec<&str> = table.rows.iter().map(|r| r.group_key.as_str()).collect();
        assert_eq!(keys, vec!["A", "B"]);

        let qty = &table.rows[0].columns[0];
        assert_eq!(qty.field, Field::Qty);
        assert_eq!(qty.count, 4);
        assert!(close(qty.mean, 2.5));
        assert!(close(qty.median, 2.5));
        assert!(close(qty.std.unwrap(), (5.0f64 / 3.0).sqrt()));
        assert!(close(qty.q1, 1.75));
        assert!(close(qty.q3, 3.25));
        assert!(close(qty.min, 1.0));
        assert!(close(qty.max, 4.0));

        let amount = &table.rows[0].columns[1];
        assert!(close(amount.mean, 250.0));
    }

    #[test]
    fn single_value_group_has_no_std() {
        let table = summary_stats(&data(), Field::Asin, &[Field::Qty]).unwrap();
        let b = &table.rows[1].columns[0];
        assert_eq!(b.count, 1);
        assert_eq!(b.std, None);
        assert!(close(b.q1, 1.0) && close(b.q3, 1.0));
    }

    #[test]
    fn quartiles_are_ordered() {
        let table = summary_stats(&data(), Field::Asin, &[Field::Qty, Field::Amount]).unwrap();
        for row in &table.rows {
            for c in &row.columns {
                assert!(c.min <= c.q1 && c.q1 <= c.median && c.median <= c.q3 && c.q3 <= c.max);
            }
        }
    }

    #[test]
    fn rejects_missing_columns_and_empty_metric_list() {
        let data = RecordSet::new(Schema::new([Field::Asin, Field::Qty]), vec![]);
        assert_eq!(
            summary_stats(&data, Field::Asin, &[Field::Qty, Field::Amount]),
            Err(EngineError::MissingColumn(Field::Amount))
        );
        assert_eq!(
            summary_stats(&data, Field::Sku, &[Field::Qty]),
            Err(EngineError::MissingColumn(Field::Sku))
        );
        assert!(matches!(
            summary_stats(&data, Field::Asin, &[]),
            Err(EngineError::InvalidParameter(_))
        ));
    }
}
