//! Export screen results to CSV.
//!
//! The exports are meant to be easy to consume in spreadsheets or downstream
//! scripts. Numeric columns are rounded to 2 decimals, matching the tables.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use serde::Serialize;

use crate::domain::{DeviationRecord, OutlierKind, TradeCandidate};
use crate::error::AppError;
use crate::math::round2;

#[derive(Debug, Serialize)]
struct TradeRow<'a> {
    ticker: &'a str,
    sell_id: &'a str,
    sell_cusip: &'a str,
    sell_strategies: &'a str,
    sell_duration: f64,
    sell_spread: f64,
    sell_deviation: Option<f64>,
    buy_id: &'a str,
    buy_cusip: &'a str,
    buy_duration: f64,
    buy_spread: f64,
    buy_deviation: Option<f64>,
    spread_diff: f64,
    duration_diff: f64,
    ratio: f64,
    deviation_diff: Option<f64>,
}

impl<'a> From<&'a TradeCandidate> for TradeRow<'a> {
    fn from(c: &'a TradeCandidate) -> Self {
        Self {
            ticker: &c.ticker,
            sell_id: &c.sell.id,
            sell_cusip: &c.sell.cusip,
            sell_strategies: c.sell_strategies.as_deref().unwrap_or(""),
            sell_duration: round2(c.sell.duration),
            sell_spread: round2(c.sell.spread),
            sell_deviation: c.sell.deviation.map(round2),
            buy_id: &c.buy.id,
            buy_cusip: &c.buy.cusip,
            buy_duration: round2(c.buy.duration),
            buy_spread: round2(c.buy.spread),
            buy_deviation: c.buy.deviation.map(round2),
            spread_diff: round2(c.spread_diff),
            duration_diff: round2(c.duration_diff),
            ratio: round2(c.ratio),
            deviation_diff: c.deviation_diff.map(round2),
        }
    }
}

#[derive(Debug, Serialize)]
struct DeviationRow<'a> {
    ticker: &'a str,
    id: &'a str,
    cusip: &'a str,
    owned: bool,
    duration: f64,
    spread: f64,
    fitted: f64,
    deviation: f64,
    direction: &'static str,
    outlier: &'static str,
}

/// Write trade candidates to a CSV file.
pub fn write_trades_csv(path: &Path, trades: &[TradeCandidate]) -> Result<(), AppError> {
    let file = create(path, "trades")?;
    write_trades(file, trades)
}

/// Write trade candidates as CSV to any writer.
pub fn write_trades<W: Write>(out: W, trades: &[TradeCandidate]) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_writer(out);
    for c in trades {
        writer
            .serialize(TradeRow::from(c))
            .map_err(|e| AppError::new(4, format!("Failed to write trades CSV row: {e}")))?;
    }
    if trades.is_empty() {
        // Header only, so consumers still see the schema.
        writer
            .write_record(TRADE_HEADER)
            .map_err(|e| AppError::new(4, format!("Failed to write trades CSV header: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| AppError::new(4, format!("Failed to flush trades CSV: {e}")))
}

const TRADE_HEADER: [&str; 16] = [
    "ticker",
    "sell_id",
    "sell_cusip",
    "sell_strategies",
    "sell_duration",
    "sell_spread",
    "sell_deviation",
    "buy_id",
    "buy_cusip",
    "buy_duration",
    "buy_spread",
    "buy_deviation",
    "spread_diff",
    "duration_diff",
    "ratio",
    "deviation_diff",
];

/// Write per-bond deviations (one block per issuer) to a CSV file.
pub fn write_deviations_csv(path: &Path, issuers: &[(&str, &[DeviationRecord])]) -> Result<(), AppError> {
    let file = create(path, "deviations")?;
    write_deviations(file, issuers)
}

/// Write per-bond deviations as CSV to any writer.
pub fn write_deviations<W: Write>(out: W, issuers: &[(&str, &[DeviationRecord])]) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_writer(out);
    for (ticker, records) in issuers {
        for r in records.iter() {
            let row = DeviationRow {
                ticker,
                id: &r.id,
                cusip: &r.cusip,
                owned: r.owned,
                duration: round2(r.duration),
                spread: round2(r.spread),
                fitted: round2(r.fitted),
                deviation: round2(r.deviation),
                direction: r.direction.label(),
                outlier: match r.outlier {
                    Some(OutlierKind::BelowOwned) => "below-owned",
                    Some(OutlierKind::AboveUnowned) => "above-unowned",
                    None => "",
                },
            };
            writer
                .serialize(row)
                .map_err(|e| AppError::new(4, format!("Failed to write deviations CSV row: {e}")))?;
        }
    }
    writer
        .flush()
        .map_err(|e| AppError::new(4, format!("Failed to flush deviations CSV: {e}")))
}

fn create(path: &Path, what: &str) -> Result<File, AppError> {
    File::create(path)
        .map_err(|e| AppError::new(4, format!("Failed to create {what} CSV '{}': {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Direction, TradeLeg};

    fn trade() -> TradeCandidate {
        TradeCandidate {
            ticker: "ABC".to_string(),
            sell: TradeLeg {
                id: "ABC 4.5 06/15/2030".to_string(),
                cusip: "C1".to_string(),
                duration: 3.0,
                spread: 150.0,
                deviation: Some(-9.876),
            },
            buy: TradeLeg {
                id: "ABC 5 01/01/2035".to_string(),
                cusip: "C2".to_string(),
                duration: 6.0,
                spread: 230.0,
                deviation: None,
            },
            sell_strategies: Some("ALPHA, CORE".to_string()),
            ratio: 80.0 / 3.0,
            spread_diff: 80.0,
            duration_diff: 3.0,
            deviation_diff: None,
        }
    }

    #[test]
    fn trades_csv_has_header_and_rounded_values() {
        let mut buf = Vec::new();
        write_trades(&mut buf, &[trade()]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), TRADE_HEADER.join(","));
        let row = lines.next().unwrap();
        assert!(row.contains("26.67"), "{row}");
        assert!(row.contains("-9.88"), "{row}");
        assert!(row.contains("\"ALPHA, CORE\""), "{row}");
    }

    #[test]
    fn empty_trades_still_write_header() {
        let mut buf = Vec::new();
        write_trades(&mut buf, &[]).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap().trim_end(), TRADE_HEADER.join(","));
    }

    #[test]
    fn deviations_csv_labels_outliers() {
        let record = DeviationRecord {
            id: "ABC 4.5 06/15/2030".to_string(),
            cusip: "C1".to_string(),
            duration: 3.0,
            spread: 90.0,
            owned: true,
            fitted: 100.0,
            deviation: -10.0,
            direction: Direction::Below,
            outlier: Some(OutlierKind::BelowOwned),
        };
        let mut buf = Vec::new();
        write_deviations(&mut buf, &[("ABC", std::slice::from_ref(&record))]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("ticker,id,cusip,owned,"));
        assert!(text.contains("ABC,ABC 4.5 06/15/2030,C1,true,3.0,90.0,100.0,-10.0,Below,below-owned"));
    }
}
