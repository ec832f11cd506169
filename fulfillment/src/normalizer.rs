//! Turns an uploaded spreadsheet into `OrderIntentRecord`s.
//!
//! Only the first sheet is read. The first row holds the headers; columns are
//! matched against fixed alias lists, case-sensitively and untrimmed, first
//! alias present wins. Data cells are trimmed when the record is built.

use crate::errors::ParseError;
use crate::types::OrderIntentRecord;
use calamine::{Data, Reader, Xls, Xlsx};
use std::io::Cursor;

const ORDER_COLUMNS: &[&str] = &["OrderNumber", "Name", "Order Number", "order_number"];
const TRACKING_NUMBER_COLUMNS: &[&str] = &["TrackingNumber", "Tracking Number", "tracking_number"];
const TRACKING_COMPANY_COLUMNS: &[&str] =
    &["TrackingCompany", "Tracking Company", "tracking_company"];
const TRACKING_URL_COLUMNS: &[&str] = &["TrackingUrl", "Tracking URL", "tracking_url"];

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileFormat {
    Xlsx,
    Xls,
    Csv,
}

impl FileFormat {
    pub const ALLOWED_EXTENSIONS: &'static [&'static str] = &[".xlsx", ".xls", ".csv"];

    /// Picks the format from a file name's extension, ignoring case.
    pub fn from_file_name(file_name: &str) -> Result<Self, ParseError> {
        let extension = file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "xlsx" => Ok(FileFormat::Xlsx),
            "xls" => Ok(FileFormat::Xls),
            "csv" => Ok(FileFormat::Csv),
            _ => Err(ParseError::UnsupportedFormat(format!(
                "{file_name}. Allowed types: {}",
                Self::ALLOWED_EXTENSIONS.join(", ")
            ))),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            FileFormat::Xlsx => ".xlsx",
            FileFormat::Xls => ".xls",
            FileFormat::Csv => ".csv",
        }
    }
}

/// Parses `bytes` as `format`. Missing tracking companies fall back to
/// `default_company`.
pub fn parse(
    bytes: &[u8],
    format: FileFormat,
    default_company: &str,
) -> Result<Vec<OrderIntentRecord>, ParseError> {
    let rows = match format {
        FileFormat::Csv => read_csv(bytes)?,
        FileFormat::Xlsx => read_first_sheet::<Xlsx<Cursor<&[u8]>>>(bytes)?,
        FileFormat::Xls => read_first_sheet::<Xls<Cursor<&[u8]>>>(bytes)?,
    };

    records_from_rows(rows, default_company)
}

fn read_csv(bytes: &[u8]) -> Result<Vec<Vec<String>>, ParseError> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    reader
        .records()
        .map(|record| {
            record
                .map(|r| r.iter().map(String::from).collect())
                .map_err(|e| ParseError::Unreadable(e.to_string()))
        })
        .collect()
}

fn read_first_sheet<'a, R>(bytes: &'a [u8]) -> Result<Vec<Vec<String>>, ParseError>
where
    R: Reader<Cursor<&'a [u8]>>,
    R::Error: std::fmt::Display,
{
    let mut workbook = R::new(Cursor::new(bytes)).map_err(|e| ParseError::Unreadable(e.to_string()))?;

    let range = match workbook.worksheet_range_at(0) {
        Some(range) => range.map_err(|e| ParseError::Unreadable(e.to_string()))?,
        None => return Err(ParseError::NoRows),
    };

    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_to_string).collect())
        .collect())
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        // f64 Display drops the trailing ".0" of whole numbers
        Data::Float(f) => f.to_string(),
        other => other.to_string(),
    }
}

/// Column positions resolved from the header row.
struct ColumnMap {
    order_number: usize,
    tracking_number: usize,
    tracking_company: Option<usize>,
    tracking_url: Option<usize>,
}

impl ColumnMap {
    fn from_headers(headers: &[String]) -> Result<Self, ParseError> {
        let find = |aliases: &[&str]| {
            aliases
                .iter()
                .find_map(|alias| headers.iter().position(|header| header == alias))
        };

        Ok(ColumnMap {
            order_number: find(ORDER_COLUMNS).ok_or(ParseError::MissingOrderColumn)?,
            tracking_number: find(TRACKING_NUMBER_COLUMNS)
                .ok_or(ParseError::MissingTrackingColumn)?,
            tracking_company: find(TRACKING_COMPANY_COLUMNS),
            tracking_url: find(TRACKING_URL_COLUMNS),
        })
    }
}

fn records_from_rows(
    rows: Vec<Vec<String>>,
    default_company: &str,
) -> Result<Vec<OrderIntentRecord>, ParseError> {
    let mut rows = rows.into_iter();
    let headers = rows.next().ok_or(ParseError::NoRows)?;

    let data_rows: Vec<Vec<String>> = rows
        .filter(|row| row.iter().any(|cell| !cell.trim().is_empty()))
        .collect();

    if data_rows.is_empty() {
        return Err(ParseError::NoRows);
    }

    let columns = ColumnMap::from_headers(&headers)?;

    let records = data_rows
        .iter()
        .map(|row| {
            let cell = |index: usize| row.get(index).map(String::as_str).unwrap_or("");

            let company = columns
                .tracking_company
                .map(cell)
                .filter(|company| !company.trim().is_empty())
                .unwrap_or(default_company);

            OrderIntentRecord::new(
                cell(columns.order_number),
                cell(columns.tracking_number),
                company,
                columns.tracking_url.map(cell),
            )
        })
        .collect();

    Ok(records)
}
