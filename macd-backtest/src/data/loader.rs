//! CSV loader for daily price data.
//!
//! Expected header (case-insensitive, any order, extra columns ignored):
//! - `date` (required): `YYYY-MM-DD` or `YYYY-MM-DD HH:MM:SS`
//! - `close` (required)
//! - `open`, `high`, `low` (empty or absent cells default to `close`)
//! - `volume` (empty or absent cells default to 0)
//!
//! Rows are sorted by date on load.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use tracing::debug;

use super::types::{PriceBar, PriceSeries};
use crate::error::{BacktestError, Result};

/// Columns that must be present in the header.
pub const REQUIRED_COLUMNS: &[&str] = &["date", "close"];

/// Column positions resolved from a header row.
#[derive(Debug, Clone, Copy)]
struct ColumnMap {
    date: usize,
    open: Option<usize>,
    high: Option<usize>,
    low: Option<usize>,
    close: usize,
    volume: Option<usize>,
}

impl ColumnMap {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
        };

        let missing: Vec<&str> = REQUIRED_COLUMNS
            .iter()
            .copied()
            .filter(|c| find(c).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(BacktestError::MalformedData(format!(
                "missing required columns: {}",
                missing.join(", ")
            )));
        }

        Ok(Self {
            date: find("date").unwrap_or_default(),
            open: find("open"),
            high: find("high"),
            low: find("low"),
            close: find("close").unwrap_or_default(),
            volume: find("volume"),
        })
    }
}

/// Load a price series from a CSV file.
pub fn load_csv<P: AsRef<Path>>(path: P) -> Result<PriceSeries> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            BacktestError::MalformedData(format!("file not found: {}", path.display()))
        } else {
            BacktestError::Io(e)
        }
    })?;
    let series = load_csv_reader(file)?;
    debug!("Loaded {} bars from {}", series.len(), path.display());
    Ok(series)
}

/// Load a price series from any CSV source.
pub fn load_csv_reader<R: Read>(reader: R) -> Result<PriceSeries> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let columns = ColumnMap::from_headers(reader.headers()?)?;

    let mut bars = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let row = idx + 1;
        let record = record.map_err(|e| {
            if e.is_io_error() {
                BacktestError::Csv(e)
            } else {
                BacktestError::MalformedData(format!("row {}: {}", row, e))
            }
        })?;
        bars.push(parse_row(&record, &columns).map_err(|e| {
            BacktestError::MalformedData(format!("row {}: {}", row, e))
        })?);
    }

    bars.sort_by_key(|b| b.date);
    PriceSeries::load(bars)
}

/// Parse a calendar date, accepting an optional time component.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|dt| dt.date())
        })
        .or_else(|| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
                .ok()
                .map(|dt| dt.date())
        })
}

fn parse_row(record: &csv::StringRecord, columns: &ColumnMap) -> std::result::Result<PriceBar, String> {
    let raw_date = record.get(columns.date).unwrap_or("");
    if raw_date.is_empty() {
        return Err("missing date".to_string());
    }
    let date = parse_date(raw_date).ok_or_else(|| format!("unparseable date '{}'", raw_date))?;

    let close = parse_number(record, Some(columns.close), "close")?
        .ok_or_else(|| format!("missing close on {}", date))?;
    let open = parse_number(record, columns.open, "open")?.unwrap_or(close);
    let high = parse_number(record, columns.high, "high")?.unwrap_or(close);
    let low = parse_number(record, columns.low, "low")?.unwrap_or(close);
    let volume = parse_number(record, columns.volume, "volume")?.unwrap_or(0.0);

    Ok(PriceBar {
        date,
        open,
        high,
        low,
        close,
        volume,
    })
}

fn parse_number(
    record: &csv::StringRecord,
    column: Option<usize>,
    name: &str,
) -> std::result::Result<Option<f64>, String> {
    let Some(raw) = column.and_then(|c| record.get(c)) else {
        return Ok(None);
    };
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<f64>()
        .map(Some)
        .map_err(|_| format!("unparseable {} '{}'", name, raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CSV: &str = "\
date,open,high,low,close,volume,adj_close
2023-01-04,101,103,100,102,1500,1
2023-01-03,100,102,99,101,1000,1
2023-01-05,102,104,101,103,2000,1
";

    #[test]
    fn test_load_sorts_rows() {
        let series = load_csv_reader(CSV.as_bytes()).unwrap();
        assert_eq!(series.len(), 3);
        assert_eq!(series.closes(), vec![101.0, 102.0, 103.0]);
        assert_eq!(
            series.first_date(),
            NaiveDate::from_ymd_opt(2023, 1, 3)
        );
    }

    #[test]
    fn test_missing_close_column() {
        let err = load_csv_reader("date,open\n2023-01-01,1\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("close"));
    }

    #[test]
    fn test_unparseable_date_reports_row() {
        let data = "date,close\n2023-01-01,10\nyesterday,11\n";
        let err = load_csv_reader(data.as_bytes()).unwrap_err();
        assert!(matches!(err, BacktestError::MalformedData(_)));
        assert!(err.to_string().contains("row 2"));
    }

    #[test]
    fn test_invalid_utf8_reports_row() {
        let mut data = b"date,close\n2023-01-01,10\n2023-01-02,".to_vec();
        data.extend_from_slice(&[0xff, 0xfe]);
        data.push(b'\n');
        let err = load_csv_reader(data.as_slice()).unwrap_err();
        assert!(matches!(err, BacktestError::MalformedData(_)));
        assert!(err.to_string().contains("row 2"));
    }

    #[test]
    fn test_duplicate_dates_rejected() {
        let data = "date,close\n2023-01-01,10\n2023-01-01,11\n";
        assert!(matches!(
            load_csv_reader(data.as_bytes()),
            Err(BacktestError::MalformedData(_))
        ));
    }

    #[test]
    fn test_optional_columns_default_to_close() {
        let data = "date,close,open\n2023-01-01 00:00:00,10,\n";
        let series = load_csv_reader(data.as_bytes()).unwrap();
        let bar = series.bars()[0];
        assert_eq!(bar.open, 10.0);
        assert_eq!(bar.high, 10.0);
        assert_eq!(bar.volume, 0.0);
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 2, 29);
        assert_eq!(parse_date("2024-02-29"), expected);
        assert_eq!(parse_date("2024-02-29 16:00:00"), expected);
        assert_eq!(parse_date("2024-02-29T16:00:00"), expected);
        assert_eq!(parse_date("02/29/2024"), None);
    }

    #[test]
    fn test_load_csv_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CSV.as_bytes()).unwrap();
        let series = load_csv(file.path()).unwrap();
        assert_eq!(series.len(), 3);
    }

    #[test]
    fn test_load_csv_missing_file() {
        let err = load_csv("does/not/exist.csv").unwrap_err();
        assert!(err.to_string().contains("file not found"));
    }
}
