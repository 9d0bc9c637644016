//! CSV ingest and normalization.
//!
//! This module turns the two tabular feeds (bond analytics and positions) into
//! typed `BondObservation` / `PositionRow` records.
//!
//! Design goals:
//! - **Strict schema** for required columns (clear errors + exit code 2)
//! - **Row-level validation** (skip bad rows, but report what happened)
//! - **Deterministic behavior** (rows keep file order)
//! - **Separation of concerns**: no screening logic here

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use csv::StringRecord;

use crate::domain::{BondObservation, PositionRow};
use crate::error::AppError;

const BOND_TICKER: &[&str] = &["ticker"];
const BOND_COUPON: &[&str] = &["coupon"];
const BOND_MATURITY: &[&str] = &["maturdate", "maturity_date"];
const BOND_CUSIP: &[&str] = &["cusip"];
const BOND_DURATION: &[&str] = &["duradjmod", "duration"];
const BOND_SPREAD: &[&str] = &["oas_bp", "oas"];

const POS_CUSIP: &[&str] = &["cusip"];
const POS_DESK: &[&str] = &["tick", "desk"];
const POS_STRATEGY: &[&str] = &["crd_strategy", "strategy"];
const POS_QUANTITY: &[&str] = &["share_par_value", "quantity"];

/// A row-level error encountered during ingest.
#[derive(Debug, Clone, PartialEq)]
pub struct RowError {
    pub line: usize,
    pub id: Option<String>,
    pub message: String,
}

/// Bond feed after validation.
#[derive(Debug, Clone)]
pub struct BondFeed {
    pub bonds: Vec<BondObservation>,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

/// Position feed after validation.
#[derive(Debug, Clone)]
pub struct PositionFeed {
    pub positions: Vec<PositionRow>,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

/// Load the bond analytics CSV.
pub fn load_bonds(path: &Path) -> Result<BondFeed, AppError> {
    let file = open(path, "bond")?;
    read_bonds(file)
}

/// Load the positions CSV.
pub fn load_positions(path: &Path) -> Result<PositionFeed, AppError> {
    let file = open(path, "positions")?;
    read_positions(file)
}

fn open(path: &Path, what: &str) -> Result<File, AppError> {
    File::open(path).map_err(|e| AppError::new(2, format!("Failed to open {what} CSV '{}': {e}", path.display())))
}

/// Parse bond rows from any reader.
///
/// Rows with a missing or non-numeric duration/spread, a non-positive duration,
/// or an unreadable maturity date are dropped and reported in `row_errors`.
pub fn read_bonds<R: Read>(input: R) -> Result<BondFeed, AppError> {
    let (mut reader, header_map) = csv_reader(input, "bond")?;
    let cols = BondColumns {
        ticker: require_column(&header_map, BOND_TICKER, "bond")?,
        coupon: require_column(&header_map, BOND_COUPON, "bond")?,
        maturity: require_column(&header_map, BOND_MATURITY, "bond")?,
        cusip: require_column(&header_map, BOND_CUSIP, "bond")?,
        duration: require_column(&header_map, BOND_DURATION, "bond")?,
        spread: require_column(&header_map, BOND_SPREAD, "bond")?,
    };

    let mut bonds = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        // records() starts after the header line; CSV lines are 1-based.
        let line = idx + 2;
        rows_read += 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    id: None,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };

        match parse_bond(&record, &cols) {
            Ok(bond) => bonds.push(bond),
            Err((id, message)) => row_errors.push(RowError { line, id, message }),
        }
    }

    if !row_errors.is_empty() {
        tracing::warn!(dropped = row_errors.len(), rows = rows_read, "dropped bond rows");
    }
    if bonds.is_empty() {
        return Err(AppError::new(3, "No valid bond rows remain after validation."));
    }

    Ok(BondFeed {
        bonds,
        row_errors,
        rows_read,
    })
}

/// Parse position rows from any reader.
///
/// A non-numeric quantity is kept as `None`; only rows without an instrument
/// key are dropped. An empty feed is valid (nothing is owned).
pub fn read_positions<R: Read>(input: R) -> Result<PositionFeed, AppError> {
    let (mut reader, header_map) = csv_reader(input, "positions")?;
    let cusip = require_column(&header_map, POS_CUSIP, "positions")?;
    let desk = require_column(&header_map, POS_DESK, "positions")?;
    let strategy = find_column(&header_map, POS_STRATEGY);
    let quantity = find_column(&header_map, POS_QUANTITY);

    let mut positions = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        rows_read += 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    id: None,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };

        let Some(key) = field(&record, Some(cusip)) else {
            row_errors.push(RowError {
                line,
                id: None,
                message: "Missing required value: `cusip`".to_string(),
            });
            continue;
        };

        positions.push(PositionRow {
            cusip: key.to_string(),
            desk: field(&record, Some(desk)).unwrap_or_default().to_string(),
            strategy: field(&record, strategy).unwrap_or_default().to_string(),
            quantity: parse_opt_f64(field(&record, quantity)),
        });
    }

    if !row_errors.is_empty() {
        tracing::warn!(dropped = row_errors.len(), rows = rows_read, "dropped position rows");
    }

    Ok(PositionFeed {
        positions,
        row_errors,
        rows_read,
    })
}

struct BondColumns {
    ticker: usize,
    coupon: usize,
    maturity: usize,
    cusip: usize,
    duration: usize,
    spread: usize,
}

fn csv_reader<R: Read>(input: R, what: &str) -> Result<(csv::Reader<R>, HashMap<String, usize>), AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input);

    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read {what} CSV headers: {e}")))?
        .clone();

    Ok((reader, build_header_map(&headers)))
}

fn parse_bond(record: &StringRecord, cols: &BondColumns) -> Result<BondObservation, (Option<String>, String)> {
    let cusip = field(record, Some(cols.cusip)).map(str::to_string);
    let fail = |message: String| (cusip.clone(), message);

    let ticker = field(record, Some(cols.ticker)).ok_or_else(|| fail("Missing required value: `ticker`".into()))?;
    let coupon = field(record, Some(cols.coupon)).ok_or_else(|| fail("Missing required value: `coupon`".into()))?;
    let key = cusip
        .clone()
        .ok_or_else(|| fail("Missing required value: `cusip`".into()))?;
    let maturity_raw =
        field(record, Some(cols.maturity)).ok_or_else(|| fail("Missing required value: `maturdate`".into()))?;
    let maturity_date = parse_maturity(maturity_raw).map_err(fail)?;

    let duration = parse_opt_f64(field(record, Some(cols.duration)))
        .ok_or_else(|| fail("Missing/invalid duration value.".into()))?;
    if duration <= 0.0 {
        return Err(fail(format!("Duration must be > 0 (got {duration}).")));
    }
    let spread = parse_opt_f64(field(record, Some(cols.spread)))
        .ok_or_else(|| fail("Missing/invalid spread value.".into()))?;

    Ok(BondObservation {
        id: BondObservation::compose_id(ticker, coupon, maturity_date),
        cusip: key,
        ticker: ticker.to_string(),
        coupon: coupon.to_string(),
        maturity_date,
        duration,
        spread,
    })
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    let mut map = HashMap::new();
    for (idx, name) in headers.iter().enumerate() {
        // First occurrence of a duplicated header wins.
        map.entry(normalize_header_name(name)).or_insert(idx);
    }
    map
}

fn normalize_header_name(name: &str) -> String {
    // Excel-style exports often prefix the first header with a UTF-8 BOM.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn find_column(header_map: &HashMap<String, usize>, names: &[&str]) -> Option<usize> {
    names.iter().find_map(|n| header_map.get(*n).copied())
}

fn require_column(header_map: &HashMap<String, usize>, names: &[&str], what: &str) -> Result<usize, AppError> {
    find_column(header_map, names).ok_or_else(|| {
        let alts = names.iter().map(|n| format!("`{n}`")).collect::<Vec<_>>().join(" or ");
        AppError::new(2, format!("Missing required column in {what} CSV: {alts}"))
    })
}

fn field(record: &StringRecord, idx: Option<usize>) -> Option<&str> {
    record.get(idx?).map(str::trim).filter(|s| !s.is_empty())
}

fn parse_maturity(s: &str) -> Result<NaiveDate, String> {
    // Analytics exports carry `YYYYMMDD`, sometimes as a float ("20300615.0").
    let compact = s.strip_suffix(".0").unwrap_or(s);
    const FMTS: [&str; 3] = ["%Y%m%d", "%Y-%m-%d", "%m/%d/%Y"];
    for fmt in FMTS {
        if let Ok(d) = NaiveDate::parse_from_str(compact, fmt) {
            return Ok(d);
        }
    }
    Err(format!(
        "Invalid maturity date '{s}'. Expected one of: YYYYMMDD, YYYY-MM-DD, MM/DD/YYYY."
    ))
}

fn parse_opt_f64(s: Option<&str>) -> Option<f64> {
    let s = s?;
    let v = s.replace(',', "").parse::<f64>().ok()?;
    if v.is_finite() { Some(v) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BONDS: &str = "\u{feff}TICKER,COUPON,MATURDATE,CUSIP,DURADJMOD,OAS_BP\n\
        ABC,4.5,20300615,C1,4.2,120.5\n\
        ABC,5,20350101,C2,7.9,160\n\
        XYZ,3.25,2029-03-01,C3,3.1,95\n";

    #[test]
    fn reads_bonds_and_composes_ids() {
        let feed = read_bonds(BONDS.as_bytes()).unwrap();
        assert_eq!(feed.rows_read, 3);
        assert!(feed.row_errors.is_empty());
        assert_eq!(feed.bonds.len(), 3);

        let b = &feed.bonds[0];
        assert_eq!(b.id, "ABC 4.5 06/15/2030");
        assert_eq!(b.cusip, "C1");
        assert_eq!(b.duration, 4.2);
        assert_eq!(b.spread, 120.5);
        assert_eq!(feed.bonds[2].maturity_date, NaiveDate::from_ymd_opt(2029, 3, 1).unwrap());
    }

    #[test]
    fn drops_bad_rows_with_line_numbers() {
        let csv = "ticker,coupon,maturdate,cusip,duration,oas\n\
            ABC,4.5,20300615,C1,4.2,120\n\
            ABC,4.5,20300615,C2,n/a,120\n\
            ABC,4.5,20300615,C3,0,120\n\
            ABC,4.5,notadate,C4,3.0,120\n\
            ABC,4.5,20300615,C5,3.0,\n";
        let feed = read_bonds(csv.as_bytes()).unwrap();
        assert_eq!(feed.bonds.len(), 1);
        let lines: Vec<usize> = feed.row_errors.iter().map(|e| e.line).collect();
        assert_eq!(lines, [3, 4, 5, 6]);
        assert_eq!(feed.row_errors[1].id.as_deref(), Some("C3"));
    }

    #[test]
    fn duplicated_header_keeps_first_column() {
        let csv = "ticker,coupon,maturdate,cusip,oas_bp,duradjmod,oas_bp\n\
            ABC,4.5,20300615,C1,120,4.2,999\n";
        let feed = read_bonds(csv.as_bytes()).unwrap();
        assert_eq!(feed.bonds[0].spread, 120.0);
    }

    #[test]
    fn missing_column_is_a_config_error() {
        let csv = "ticker,coupon,maturdate,cusip,duradjmod\nABC,4.5,20300615,C1,4.2\n";
        let err = read_bonds(csv.as_bytes()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn no_usable_rows_is_reported() {
        let csv = "ticker,coupon,maturdate,cusip,duradjmod,oas_bp\nABC,4.5,20300615,C1,-1,120\n";
        let err = read_bonds(csv.as_bytes()).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn reads_positions_with_aliases() {
        let csv = "CUSIP,TICK,CRD_STRATEGY,SHARE_PAR_VALUE\n\
            C1,DESK1,CORE,\"1,200,000\"\n\
            C1,DESK1,CORE,abc\n\
            ,DESK2,CORE,5\n";
        let feed = read_positions(csv.as_bytes()).unwrap();
        assert_eq!(feed.positions.len(), 2);
        assert_eq!(feed.positions[0].quantity, Some(1_200_000.0));
        assert_eq!(feed.positions[1].quantity, None);
        assert_eq!(feed.positions[0].desk, "DESK1");
        assert_eq!(feed.row_errors.len(), 1);
    }

    #[test]
    fn positions_without_strategy_column_are_accepted() {
        let csv = "cusip,desk,quantity\nC1,D1,10\n";
        let feed = read_positions(csv.as_bytes()).unwrap();
        assert_eq!(feed.positions[0].strategy, "");
    }
}
