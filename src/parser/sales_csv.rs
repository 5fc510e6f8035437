// Cleaned sales report (CSV) parsing
use crate::model::{Field, FieldKind, ParserError, Record, RecordSet, Schema};
use crate::parser::Parser;
use crate::utils::{parse_date, parse_number};
use csv::{ReaderBuilder, StringRecord, Trim};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

/// Columns every cleaned report must carry.
const REQUIRED: [Field; 4] = [Field::Date, Field::Asin, Field::Qty, Field::Amount];

/// Reads an already-cleaned sales report into a typed `RecordSet`.
///
/// No cleaning happens here: blank or malformed cells in recognized columns
/// are errors, unrecognized columns are skipped.
pub struct SalesCsvParser;

impl SalesCsvParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse_file(&self, path: &Path) -> Result<RecordSet, ParserError> {
        let records = self.parse_reader(File::open(path)?)?;
        info!(
            "Loaded {} records from {}.",
            records.records().len(),
            path.display()
        );
        Ok(records)
    }

    pub fn parse_reader<R: Read>(&self, reader: R) -> Result<RecordSet, ParserError> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .trim(Trim::All)
            .from_reader(reader);

        let columns = Self::map_header(rdr.headers()?)?;
        let schema = Schema::new(columns.iter().map(|(_, field)| *field));
        debug!(
            "Recognized columns: {}",
            schema.fields().map(Field::header).collect::<Vec<_>>().join(", ")
        );
        let date_idx = columns
            .iter()
            .find(|(_, field)| *field == Field::Date)
            .map(|(idx, _)| *idx)
            .ok_or(ParserError::MissingHeader(Field::Date))?;

        let mut records = Vec::new();
        for (i, row) in rdr.records().enumerate() {
            let row = row?;
            let line = i + 1;
            let date = Self::parse_cell(&row, date_idx, Field::Date, line, parse_date)?;
            let mut record = Record::new(String::new(), date, 0.0, 0.0);
            for (idx, field) in &columns {
                match field.kind() {
                    FieldKind::Date => {}
                    FieldKind::Numeric => {
                        let value = Self::parse_cell(&row, *idx, *field, line, parse_number)?;
                        match field {
                            Field::Qty => record.qty = value,
                            _ => record.amount = value,
                        }
                    }
                    FieldKind::Text => {
                        let value = row.get(*idx).unwrap_or_default().to_string();
                        record.set_text(*field, value);
                    }
                }
            }
            records.push(record);
        }

        Ok(RecordSet::new(schema, records))
    }

    fn map_header(header: &StringRecord) -> Result<Vec<(usize, Field)>, ParserError> {
        let mut columns: Vec<(usize, Field)> = Vec::new();
        for (idx, name) in header.iter().enumerate() {
            match name.parse::<Field>() {
                Ok(Field::Region) | Err(_) => debug!("Skipping column '{}'.", name),
                Ok(field) if columns.iter().any(|(_, f)| *f == field) => {
                    warn!("Duplicate column '{}' ignored.", name);
                }
                Ok(field) => columns.push((idx, field)),
            }
        }
        for field in REQUIRED {
            if !columns.iter().any(|(_, f)| *f == field) {
                return Err(ParserError::MissingHeader(field));
            }
        }
        Ok(columns)
    }

    fn parse_cell<T>(
        row: &StringRecord,
        idx: usize,
        field: Field,
        line: usize,
        parse: impl Fn(&str) -> Option<T>,
    ) -> Result<T, ParserError> {
        let raw = row.get(idx).unwrap_or_default();
        parse(raw).ok_or_else(|| ParserError::InvalidCell {
            row: line,
            column: field.header().to_string(),
            value: raw.to_string(),
        })
    }
}

impl Default for SalesCsvParser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser for SalesCsvParser {
    fn parse(&self, text: &str) -> Result<RecordSet, ParserError> {
        self.parse_reader(text.as_bytes())
    }
}

/// Reads a two-column `(geography, region)` table. The first row is a header.
pub fn parse_region_mapping<R: Read>(reader: R) -> Result<Vec<(String, String)>, ParserError> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let mut pairs = Vec::new();
    for (i, row) in rdr.records().enumerate() {
        let row = row?;
        match (row.get(0), row.get(1)) {
            (Some(geo), Some(region)) => pairs.push((geo.to_string(), region.to_string())),
            _ => {
                return Err(ParserError::InvalidCell {
                    row: i + 1,
                    column: "region".into(),
                    value: row.iter().collect::<Vec<_>>().join(","),
                });
            }
        }
    }
    Ok(pairs)
}

/// Loads a region mapping table from disk.
pub fn load_region_mapping(path: &Path) -> Result<Vec<(String, String)>, ParserError> {
    let pairs = parse_region_mapping(File::open(path)?)?;
    info!("Read {} region mapping rows from {}.", pairs.len(), path.display());
    Ok(pairs)
}
