// Parsers for the cleaned sales report and the region mapping table.

pub mod sales_csv;

pub use sales_csv::{load_region_mapping, parse_region_mapping, SalesCsvParser};

use crate::model::{ParserError, RecordSet};

pub trait Parser {
    fn parse(&self, text: &str) -> Result<RecordSet, ParserError>;
}
