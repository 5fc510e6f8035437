use crate::analyzer::popularity::{accumulate, by_total_desc, PopularityRow};
use crate::analyzer::text_value;
use crate::model::{Dataset, EngineError, Field, FieldKind, Metric, Row, Schema, UNMAPPED_REGION};
use crate::normalizer::{clean_label, normalize_key};
use chrono::NaiveDate;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Validated lookup from normalized geography code to region label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionMapping {
    entries: BTreeMap<String, String>,
}

impl RegionMapping {
    /// Region for a raw geography value, normalized the same way as the keys.
    pub fn lookup(&self, raw: &str) -> Option<&str> {
        self.entries.get(&normalize_key(raw)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn regions(&self) -> BTreeSet<&str> {
        self.entries.values().map(String::as_str).collect()
    }
}

/// Builds a mapping from raw `(geography, region)` pairs.
///
/// Keys are trimmed and case-folded. Repeating a key with the same region is
/// accepted; repeating it with a different region is a `DuplicateKey` error.
pub fn define_regions<I, K, V>(raw_mapping: I) -> Result<RegionMapping, EngineError>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut entries = BTreeMap::new();
    for (raw_key, raw_region) in raw_mapping {
        let raw_key = raw_key.as_ref();
        let key = normalize_key(raw_key);
        if key.is_empty() {
            return Err(EngineError::InvalidParameter(
                "region mapping contains a blank geography code".into(),
            ));
        }
        let region = clean_label(raw_region.as_ref()).ok_or_else(|| {
            EngineError::InvalidParameter(format!("geography '{}' has a blank region", raw_key))
        })?;
        if region == UNMAPPED_REGION {
            return Err(EngineError::InvalidParameter(format!(
                "region label '{}' is reserved",
                UNMAPPED_REGION
            )));
        }

        match entries.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(region.to_string());
            }
            Entry::Occupied(slot) if slot.get().as_str() != region => {
                return Err(EngineError::DuplicateKey {
                    key: slot.key().clone(),
                    existing: slot.get().clone(),
                    conflicting: region.to_string(),
                });
            }
            Entry::Occupied(slot) => {
                debug!("Repeated mapping for '{}' ignored.", slot.key());
            }
        }
    }

    if entries.is_empty() {
        return Err(EngineError::EmptyInput("region mapping is empty".into()));
    }
    info!("Defined {} region mappings.", entries.len());
    Ok(RegionMapping { entries })
}

/// A row paired with the region it was mapped to.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedRecord<'a, R> {
    pub row: &'a R,
    pub region: &'a str,
}

impl<R: Row> Row for TaggedRecord<'_, R> {
    fn text(&self, field: Field) -> Option<&str> {
        match field {
            Field::Region => Some(self.region),
            _ => self.row.text(field),
        }
    }

    fn number(&self, field: Field) -> Option<f64> {
        self.row.number(field)
    }

    fn date(&self, field: Field) -> Option<NaiveDate> {
        self.row.date(field)
    }
}

/// Region-tagged view over an input dataset; exposes the `region` column.
#[derive(Debug, Clone)]
pub struct RegionTaggedSet<'a, R> {
    schema: Schema,
    rows: Vec<TaggedRecord<'a, R>>,
}

impl<'a, R: Row> Dataset for RegionTaggedSet<'a, R> {
    type Row = TaggedRecord<'a, R>;

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn rows(&self) -> &[TaggedRecord<'a, R>] {
        &self.rows
    }
}

#[derive(Debug, Clone)]
pub struct RegionAssignment<'a, R> {
    pub tagged: RegionTaggedSet<'a, R>,
    /// Raw geography values without a mapping entry, with their row counts.
    pub unmapped: BTreeMap<String, usize>,
}

impl<R> RegionAssignment<'_, R> {
    pub fn unmapped_rows(&self) -> usize {
        self.unmapped.values().sum()
    }
}

/// Tags every row with its region, falling back to `Unmapped`.
///
/// The run never aborts on an unknown code; the caller is expected to warn
/// about each entry of `unmapped`.
pub fn map_to_region<'a, D: Dataset>(
    data: &'a D,
    geography_field: Field,
    mapping: &'a RegionMapping,
) -> Result<RegionAssignment<'a, D::Row>, EngineError> {
    data.schema().require_kind(geography_field, FieldKind::Text)?;

    let mut rows = Vec::with_capacity(data.len());
    let mut unmapped: BTreeMap<String, usize> = BTreeMap::new();
    for row in data.rows() {
        let raw = text_value(row, geography_field)?;
        let region = match mapping.lookup(raw) {
            Some(region) => region,
            None => {
                *unmapped.entry(raw.to_string()).or_insert(0) += 1;
                UNMAPPED_REGION
            }
        };
        rows.push(TaggedRecord { row, region });
    }

    let assignment = RegionAssignment {
        tagged: RegionTaggedSet {
            schema: data.schema().with(Field::Region),
            rows,
        },
        unmapped,
    };
    info!(
        "Mapped column '{}' to regions. Unmapped rows: {}",
        geography_field,
        assignment.unmapped_rows()
    );
    Ok(assignment)
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegionPopularityRow {
    pub region: String,
    pub product_key: String,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegionPopularityTable {
    pub region_field: Field,
    pub product_field: Field,
    pub metric: Metric,
    pub rows: Vec<RegionPopularityRow>,
}

/// Sums `metric` per `(region, product)`: regions ascending, products ranked
/// within each region like `compute_popularity`.
pub fn popularity_by_region<D: Dataset>(
    data: &D,
    region_field: Field,
    product_field: Field,
    metric: Metric,
) -> Result<RegionPopularityTable, EngineError> {
    let schema = data.schema();
    schema.require_kind(region_field, FieldKind::Text)?;
    schema.require_kind(product_field, FieldKind::Text)?;
    schema.require_kind(metric.field(), FieldKind::Numeric)?;

    let totals = accumulate(
        data.rows(),
        |row| Ok((text_value(row, region_field)?, text_value(row, product_field)?)),
        metric.field(),
    )?;

    let mut by_region: BTreeMap<&str, Vec<PopularityRow>> = BTreeMap::new();
    for ((region, product), total) in totals {
        by_region.entry(region).or_default().push(PopularityRow {
            product_key: product.to_string(),
            total,
        });
    }

    let region_count = by_region.len();
    let mut products = BTreeSet::new();
    let mut rows = Vec::new();
    for (region, mut ranked) in by_region {
        ranked.sort_by(by_total_desc);
        for r in ranked {
            products.insert(r.product_key.clone());
            rows.push(RegionPopularityRow {
                region: region.to_string(),
                product_key: r.product_key,
                total: r.total,
            });
        }
    }

    info!(
        "Region popularity computed for {} products in {} regions.",
        products.len(),
        region_count
    );
    Ok(RegionPopularityTable {
        region_field,
        product_field,
        metric,
        rows,
    })
}
