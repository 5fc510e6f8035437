use crate::analyzer::popularity::rank_totals;
use crate::model::{Dataset, EngineError, Field};
use std::fmt;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    Head,
    Tail,
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Head => f.write_str("head"),
            Segment::Tail => f.write_str("tail"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LongTailRow {
    pub product_key: String,
    pub total: f64,
    pub cumulative_total: f64,
    pub cumulative_share: f64,
    pub segment: Segment,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LongTailTable {
    pub group_field: Field,
    pub metric_field: Field,
    pub threshold: f64,
    pub rows: Vec<LongTailRow>,
}

impl LongTailTable {
    pub fn head(&self) -> impl Iterator<Item = &LongTailRow> {
        self.rows.iter().filter(|r| r.segment == Segment::Head)
    }

    pub fn tail(&self) -> impl Iterator<Item = &LongTailRow> {
        self.rows.iter().filter(|r| r.segment == Segment::Tail)
    }
}

/// Splits the ranked groups into a head holding the first `threshold` share
/// of the grand total and the tail holding the rest.
///
/// Rows stay in ranking order. A row is `Head` while its cumulative share is
/// at most `threshold`; once a row crosses it, every later row is `Tail`.
pub fn long_tail_analysis<D: Dataset>(
    data: &D,
    group_field: Field,
    metric_field: Field,
    threshold: f64,
) -> Result<LongTailTable, EngineError> {
    if !(threshold > 0.0 && threshold < 1.0) {
        return Err(EngineError::InvalidParameter(format!(
            "threshold must lie strictly between 0 and 1, got {}",
            threshold
        )));
    }
    let ranked = rank_totals(data, group_field, metric_field)?;
    let grand_total: f64 = ranked.iter().map(|r| r.total).sum();
    if grand_total == 0.0 {
        return Err(EngineError::DegenerateInput(format!(
            "grand total of '{}' is zero, cumulative share is undefined",
            metric_field
        )));
    }

    let mut cumulative_total = 0.0;
    let mut in_head = true;
    let rows: Vec<LongTailRow> = ranked
        .into_iter()
        .map(|r| {
            cumulative_total += r.total;
            let cumulative_share = cumulative_total / grand_total;
            in_head = in_head && cumulative_share <= threshold;
            LongTailRow {
                product_key: r.product_key,
                total: r.total,
                cumulative_total,
                cumulative_share,
                segment: if in_head { Segment::Head } else { Segment::Tail },
            }
        })
        .collect();

    let table = LongTailTable {
        group_field,
        metric_field,
        threshold,
        rows,
    };
    info!(
        "Long tail: {} 'head' groups out of {}.",
        table.head().count(),
        table.rows.len()
    );
    Ok(table)
}
