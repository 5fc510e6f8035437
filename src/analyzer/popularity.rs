use crate::analyzer::{numeric_value, text_value};
use crate::model::{Dataset, EngineError, Field, FieldKind, Metric, Row};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::info;

#[derive(Debug, Clone, PartialEq)]
pub struct PopularityRow {
    pub product_key: String,
    pub total: f64,
}

/// Products ranked by a summed metric, highest first.
#[derive(Debug, Clone, PartialEq)]
pub struct PopularityTable {
    pub product_field: Field,
    pub metric: Metric,
    pub rows: Vec<PopularityRow>,
}

impl PopularityTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn grand_total(&self) -> f64 {
        self.rows.iter().map(|r| r.total).sum()
    }
}

/// Sums `metric` per product and ranks the products.
pub fn compute_popularity<D: Dataset>(
    data: &D,
    product_field: Field,
    metric: Metric,
) -> Result<PopularityTable, EngineError> {
    let rows = rank_totals(data, product_field, metric.field())?;
    info!(
        "Popularity computed by {} for {} products.",
        metric,
        rows.len()
    );
    Ok(PopularityTable {
        product_field,
        metric,
        rows,
    })
}

/// First `n` rows of the ranking; `n` past the end yields the whole table.
pub fn top_n_products(table: &PopularityTable, n: usize) -> Result<PopularityTable, EngineError> {
    if n == 0 {
        return Err(EngineError::InvalidParameter(
            "n must be a positive integer".into(),
        ));
    }
    let rows: Vec<PopularityRow> = table.rows.iter().take(n).cloned().collect();
    info!("Selected top {} of {} products.", rows.len(), table.len());
    Ok(PopularityTable {
        product_field: table.product_field,
        metric: table.metric,
        rows,
    })
}

/// Groups rows by `key_field`, sums `metric_field` and sorts the totals.
///
/// Shared by the long-tail segmenter and the region ranking.
pub(crate) fn rank_totals<D: Dataset>(
    data: &D,
    key_field: Field,
    metric_field: Field,
) -> Result<Vec<PopularityRow>, EngineError> {
    let schema = data.schema();
    schema.require_kind(key_field, FieldKind::Text)?;
    schema.require_kind(metric_field, FieldKind::Numeric)?;

    let totals = accumulate(data.rows(), |row| text_value(row, key_field), metric_field)?;
    let mut ranked: Vec<PopularityRow> = totals
        .into_iter()
        .map(|(key, total)| PopularityRow {
            product_key: key.to_string(),
            total,
        })
        .collect();
    ranked.sort_by(by_total_desc);
    Ok(ranked)
}

/// Descending total, ties broken by ascending key.
pub(crate) fn by_total_desc(a: &PopularityRow, b: &PopularityRow) -> Ordering {
    b.total
        .total_cmp(&a.total)
        .then_with(|| a.product_key.cmp(&b.product_key))
}

/// Sums a metric per key over arbitrary rows, without ranking.
pub(crate) fn accumulate<'r, R: Row, K: Ord>(
    rows: &'r [R],
    mut key: impl FnMut(&'r R) -> Result<K, EngineError>,
    metric_field: Field,
) -> Result<BTreeMap<K, f64>, EngineError> {
    let mut totals = BTreeMap::new();
    for row in rows {
        let k = key(row)?;
        *totals.entry(k).or_insert(0.0) += numeric_value(row, metric_field)?;
    }
    Ok(totals)
}
