// Core structs: Record, RecordSet, Schema and the error taxonomy
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Region label assigned to records whose geography has no mapping entry.
pub const UNMAPPED_REGION: &str = "Unmapped";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Numeric,
    Date,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Text => f.write_str("text"),
            FieldKind::Numeric => f.write_str("numeric"),
            FieldKind::Date => f.write_str("date"),
        }
    }
}

/// Column identifiers of the cleaned sales report.
///
/// `Region` never comes from ingestion; it only exists on region-tagged rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(try_from = "String")]
pub enum Field {
    OrderId,
    Date,
    Status,
    Fulfilment,
    SalesChannel,
    ShipServiceLevel,
    Style,
    Sku,
    Category,
    Size,
    Asin,
    CourierStatus,
    Qty,
    Currency,
    Amount,
    ShipCity,
    ShipState,
    ShipPostalCode,
    ShipCountry,
    B2b,
    Region,
}

impl Field {
    /// Every column a `Record` carries.
    pub const RECORD_FIELDS: [Field; 20] = [
        Field::OrderId,
        Field::Date,
        Field::Status,
        Field::Fulfilment,
        Field::SalesChannel,
        Field::ShipServiceLevel,
        Field::Style,
        Field::Sku,
        Field::Category,
        Field::Size,
        Field::Asin,
        Field::CourierStatus,
        Field::Qty,
        Field::Currency,
        Field::Amount,
        Field::ShipCity,
        Field::ShipState,
        Field::ShipPostalCode,
        Field::ShipCountry,
        Field::B2b,
    ];

    /// Column name as it appears in the sales report header.
    pub fn header(self) -> &'static str {
        match self {
            Field::OrderId => "Order ID",
            Field::Date => "Date",
            Field::Status => "Status",
            Field::Fulfilment => "Fulfilment",
            Field::SalesChannel => "Sales Channel",
            Field::ShipServiceLevel => "ship-service-level",
            Field::Style => "Style",
            Field::Sku => "SKU",
            Field::Category => "Category",
            Field::Size => "Size",
            Field::Asin => "ASIN",
            Field::CourierStatus => "Courier Status",
            Field::Qty => "Qty",
            Field::Currency => "currency",
            Field::Amount => "Amount",
            Field::ShipCity => "ship-city",
            Field::ShipState => "ship-state",
            Field::ShipPostalCode => "ship-postal-code",
            Field::ShipCountry => "ship-country",
            Field::B2b => "B2B",
            Field::Region => "region",
        }
    }

    pub fn kind(self) -> FieldKind {
        match self {
            Field::Date => FieldKind::Date,
            Field::Qty | Field::Amount => FieldKind::Numeric,
            _ => FieldKind::Text,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header())
    }
}

impl FromStr for Field {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        Field::RECORD_FIELDS
            .iter()
            .chain(std::iter::once(&Field::Region))
            .find(|f| f.header().eq_ignore_ascii_case(name))
            .copied()
            .ok_or_else(|| EngineError::InvalidParameter(format!("unknown field '{}'", name)))
    }
}

impl TryFrom<String> for Field {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Popularity metric: units sold or revenue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum Metric {
    Quantity,
    Revenue,
}

impl Metric {
    /// The numeric column summed for this metric.
    pub fn field(self) -> Field {
        match self {
            Metric::Quantity => Field::Qty,
            Metric::Revenue => Field::Amount,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Quantity => f.write_str("quantity"),
            Metric::Revenue => f.write_str("revenue"),
        }
    }
}

impl FromStr for Metric {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "quantity" => Ok(Metric::Quantity),
            "revenue" => Ok(Metric::Revenue),
            other => Err(EngineError::InvalidParameter(format!(
                "metric must be 'quantity' or 'revenue', got '{}'",
                other
            ))),
        }
    }
}

impl TryFrom<String> for Metric {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Set of columns actually supplied by ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schema {
    fields: BTreeSet<Field>,
}

impl Schema {
    pub fn new(fields: impl IntoIterator<Item = Field>) -> Self {
        Self {
            fields: fields.into_iter().collect(),
        }
    }

    /// Schema with every record column present.
    pub fn full() -> Self {
        Self::new(Field::RECORD_FIELDS)
    }

    pub fn contains(&self, field: Field) -> bool {
        self.fields.contains(&field)
    }

    pub fn with(&self, field: Field) -> Self {
        let mut fields = self.fields.clone();
        fields.insert(field);
        Self { fields }
    }

    pub fn fields(&self) -> impl Iterator<Item = Field> + '_ {
        self.fields.iter().copied()
    }

    pub fn require(&self, field: Field) -> Result<(), EngineError> {
        if self.contains(field) {
            Ok(())
        } else {
            Err(EngineError::MissingColumn(field))
        }
    }

    /// Checks presence first, then that the column holds values of `kind`.
    pub fn require_kind(&self, field: Field, kind: FieldKind) -> Result<(), EngineError> {
        self.require(field)?;
        if field.kind() != kind {
            return Err(EngineError::InvalidParameter(format!(
                "column '{}' is {}, expected a {} column",
                field,
                field.kind(),
                kind
            )));
        }
        Ok(())
    }
}

/// Typed access to a row's columns.
pub trait Row {
    fn text(&self, field: Field) -> Option<&str>;
    fn number(&self, field: Field) -> Option<f64>;
    fn date(&self, field: Field) -> Option<NaiveDate>;
}

/// A read-only, schema-checked collection of rows.
pub trait Dataset {
    type Row: Row;

    fn schema(&self) -> &Schema;
    fn rows(&self) -> &[Self::Row];

    fn len(&self) -> usize {
        self.rows().len()
    }

    fn is_empty(&self) -> bool {
        self.rows().is_empty()
    }
}

/// One sale line-item of the cleaned report.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub order_id: String,
    pub date: NaiveDate,
    pub status: String,
    pub fulfilment: String,
    pub sales_channel: String,
    pub ship_service_level: String,
    pub style: String,
    pub sku: String,
    pub category: String,
    pub size: String,
    pub asin: String,
    pub courier_status: String,
    pub qty: f64,
    pub currency: String,
    pub amount: f64,
    pub ship_city: String,
    pub ship_state: String,
    pub ship_postal_code: String,
    pub ship_country: String,
    pub b2b: String,
}

impl Record {
    /// Builds a record with the analytic core filled and every categorical column empty.
    pub fn new(asin: impl Into<String>, date: NaiveDate, qty: f64, amount: f64) -> Self {
        Self {
            order_id: String::new(),
            date,
            status: String::new(),
            fulfilment: String::new(),
            sales_channel: String::new(),
            ship_service_level: String::new(),
            style: String::new(),
            sku: String::new(),
            category: String::new(),
            size: String::new(),
            asin: asin.into(),
            courier_status: String::new(),
            qty,
            currency: String::new(),
            amount,
            ship_city: String::new(),
            ship_state: String::new(),
            ship_postal_code: String::new(),
            ship_country: String::new(),
            b2b: String::new(),
        }
    }

    /// Sets a text column; non-text fields are left untouched.
    pub fn with_text(mut self, field: Field, value: impl Into<String>) -> Self {
        self.set_text(field, value.into());
        self
    }

    /// Returns false when `field` is not a text column of a record.
    pub fn set_text(&mut self, field: Field, value: String) -> bool {
        match self.text_slot(field) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    fn text_slot(&mut self, field: Field) -> Option<&mut String> {
        let slot = match field {
            Field::OrderId => &mut self.order_id,
            Field::Status => &mut self.status,
            Field::Fulfilment => &mut self.fulfilment,
            Field::SalesChannel => &mut self.sales_channel,
            Field::ShipServiceLevel => &mut self.ship_service_level,
            Field::Style => &mut self.style,
            Field::Sku => &mut self.sku,
            Field::Category => &mut self.category,
            Field::Size => &mut self.size,
            Field::Asin => &mut self.asin,
            Field::CourierStatus => &mut self.courier_status,
            Field::Currency => &mut self.currency,
            Field::ShipCity => &mut self.ship_city,
            Field::ShipState => &mut self.ship_state,
            Field::ShipPostalCode => &mut self.ship_postal_code,
            Field::ShipCountry => &mut self.ship_country,
            Field::B2b => &mut self.b2b,
            Field::Date | Field::Qty | Field::Amount | Field::Region => return None,
        };
        Some(slot)
    }
}

impl Row for Record {
    fn text(&self, field: Field) -> Option<&str> {
        let value = match field {
            Field::OrderId => &self.order_id,
            Field::Status => &self.status,
            Field::Fulfilment => &self.fulfilment,
            Field::SalesChannel => &self.sales_channel,
            Field::ShipServiceLevel => &self.ship_service_level,
            Field::Style => &self.style,
            Field::Sku => &self.sku,
            Field::Category => &self.category,
            Field::Size => &self.size,
            Field::Asin => &self.asin,
            Field::CourierStatus => &self.courier_status,
            Field::Currency => &self.currency,
            Field::ShipCity => &self.ship_city,
            Field::ShipState => &self.ship_state,
            Field::ShipPostalCode => &self.ship_postal_code,
            Field::ShipCountry => &self.ship_country,
            Field::B2b => &self.b2b,
            Field::Date | Field::Qty | Field::Amount | Field::Region => return None,
        };
        Some(value.as_str())
    }

    fn number(&self, field: Field) -> Option<f64> {
        match field {
            Field::Qty => Some(self.qty),
            Field::Amount => Some(self.amount),
            _ => None,
        }
    }

    fn date(&self, field: Field) -> Option<NaiveDate> {
        match field {
            Field::Date => Some(self.date),
            _ => None,
        }
    }
}

/// Ordered, read-only records shared by every analysis of a run.
#[derive(Debug, Clone)]
pub struct RecordSet {
    schema: Schema,
    records: Vec<Record>,
}

impl RecordSet {
    pub fn new(schema: Schema, records: Vec<Record>) -> Self {
        Self { schema, records }
    }

    /// Wraps records that carry every column.
    pub fn from_records(records: Vec<Record>) -> Self {
        Self::new(Schema::full(), records)
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }
}

impl Dataset for RecordSet {
    type Row = Record;

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn rows(&self) -> &[Record] {
        &self.records
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("missing column '{0}'")]
    MissingColumn(Field),
    #[error("degenerate input: {0}")]
    DegenerateInput(String),
    #[error("region key '{key}' maps to both '{existing}' and '{conflicting}'")]
    DuplicateKey {
        key: String,
        existing: String,
        conflicting: String,
    },
    #[error("empty input: {0}")]
    EmptyInput(String),
}

#[derive(Debug, Error)]
pub enum ParserError {
    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("row {row}, column '{column}': cannot parse '{value}'")]
    InvalidCell {
        row: usize,
        column: String,
        value: String,
    },
    #[error("required column '{0}' is missing from the header")]
    MissingHeader(Field),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("invalid stored value: {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_parses_from_header_case_insensitively() {
        assert_eq!("asin".parse::<Field>(), Ok(Field::Asin));
        assert_eq!(" ship-state ".parse::<Field>(), Ok(Field::ShipState));
        assert_eq!("Courier Status".parse::<Field>(), Ok(Field::CourierStatus));
        assert!(matches!(
            "promotion-ids".parse::<Field>(),
            Err(EngineError::InvalidParameter(_))
        ));
    }

    #[test]
    fn metric_maps_to_its_column() {
        assert_eq!("Quantity".parse::<Metric>().map(Metric::field), Ok(Field::Qty));
        assert_eq!("revenue".parse::<Metric>().map(Metric::field), Ok(Field::Amount));
        assert!("units".parse::<Metric>().is_err());
    }

    #[test]
    fn schema_reports_missing_and_mistyped_columns() {
        let schema = Schema::new([Field::Asin, Field::Qty]);
        assert_eq!(schema.require(Field::Amount), Err(EngineError::MissingColumn(Field::Amount)));
        assert!(schema.require_kind(Field::Qty, FieldKind::Numeric).is_ok());
        assert!(matches!(
            schema.require_kind(Field::Asin, FieldKind::Numeric),
            Err(EngineError::InvalidParameter(_))
        ));
    }

    #[test]
    fn record_text_columns_round_trip_through_accessors() {
        let date = NaiveDate::from_ymd_opt(2022, 4, 30).unwrap();
        let record = Record::new("B09", date, 2.0, 100.0)
            .with_text(Field::ShipState, "MAHARASHTRA")
            .with_text(Field::Qty, "ignored");
        assert_eq!(record.text(Field::ShipState), Some("MAHARASHTRA"));
        assert_eq!(record.text(Field::Region), None);
        assert_eq!(record.number(Field::Qty), Some(2.0));
        assert_eq!(record.date(Field::Date), Some(date));
    }
}
