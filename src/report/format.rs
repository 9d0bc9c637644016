//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the screening code stays clean and testable
//! - output changes are localized
//!
//! Every numeric column is shown at 2 decimals.

use crate::app::pipeline::{IssuerScreen, ScreenOutput, SkippedIssuer};
use crate::domain::{CurveFit, DeviationRecord, OutlierKind, PairingMode, Segment, TradeCandidate};

const ID_WIDTH: usize = 26;

/// Run header: segment constants and universe counts.
pub fn format_run_summary(segment: Segment, output: &ScreenOutput) -> String {
    let rules = &output.rules;
    let mut out = String::new();

    out.push_str(&format!("=== rv - {} relative value screen ===\n", segment.display_name()));
    out.push_str(&format!(
        "Rules: threshold={:.2}% | min ratio={:.2}bp/yr | min bonds/ticker={} | min holding={}\n",
        rules.threshold_percent,
        rules.min_ratio,
        rules.min_observations,
        rules
            .min_holding
            .map(|h| format!("{h:.0}"))
            .unwrap_or_else(|| "none".to_string()),
    ));
    out.push_str(&format!(
        "Pairing: {}\n",
        match rules.pairing {
            PairingMode::OutlierFiltered => "owned below curve -> unowned above curve",
            PairingMode::Relaxed => "owned -> any longer bond of the issuer",
        }
    ));
    out.push_str(&format!(
        "Universe: bonds={} owned={} | issuers screened={} skipped={}\n",
        output.bond_count,
        output.owned_count,
        output.issuers.len(),
        output.skipped.len(),
    ));
    out.push_str(&format!(
        "Outliers: below-owned={} above-unowned={} | trades={}\n",
        output.outlier_count(OutlierKind::BelowOwned),
        output.outlier_count(OutlierKind::AboveUnowned),
        output.trades.len(),
    ));

    out
}

/// Trade candidates table. `top_n == 0` shows every row.
pub fn format_trades(trades: &[TradeCandidate], top_n: usize, with_cusips: bool) -> String {
    let mut out = String::new();
    if trades.is_empty() {
        out.push_str("(no trade candidates)\n");
        return out;
    }

    let cusip_cols = |sell: &str, buy: &str| {
        if with_cusips {
            format!(" {sell:<10} {buy:<10}")
        } else {
            String::new()
        }
    };

    push_line(
        &mut out,
        format!(
            "{:<w$} {:<w$}{} {:>8} {:>9} {:>8} {:>8} {:<20}",
            "sell",
            "buy",
            cusip_cols("sell_cusip", "buy_cusip"),
            "ratio",
            "spd_diff",
            "dur_diff",
            "dev_diff",
            "strategies",
            w = ID_WIDTH,
        ),
    );
    push_line(
        &mut out,
        format!(
            "{:-<w$} {:-<w$}{} {:-<8} {:-<9} {:-<8} {:-<8} {:-<20}",
            "",
            "",
            if with_cusips {
                format!(" {:-<10} {:-<10}", "", "")
            } else {
                String::new()
            },
            "",
            "",
            "",
            "",
            "",
            w = ID_WIDTH,
        ),
    );

    for c in take(trades, top_n) {
        push_line(
            &mut out,
            format!(
                "{:<w$} {:<w$}{} {:>8.2} {:>9.2} {:>8.2} {:>8} {:<20}",
                truncate(&c.sell.id, ID_WIDTH),
                truncate(&c.buy.id, ID_WIDTH),
                cusip_cols(truncate(&c.sell.cusip, 10).as_str(), truncate(&c.buy.cusip, 10).as_str()),
                c.ratio,
                c.spread_diff,
                c.duration_diff,
                fmt_opt(c.deviation_diff),
                truncate(c.sell_strategies.as_deref().unwrap_or(""), 20),
                w = ID_WIDTH,
            ),
        );
    }
    push_more(&mut out, trades.len(), top_n);

    out
}

/// Per-bond deviations from the issuer curve.
pub fn format_deviations(records: &[DeviationRecord], top_n: usize) -> String {
    let mut out = String::new();
    push_line(
        &mut out,
        format!(
            "{:<w$} {:<10} {:>5} {:>8} {:>9} {:>9} {:>9} {:<6} {:<13}",
            "id",
            "cusip",
            "owned",
            "duration",
            "spread",
            "fitted",
            "deviation",
            "side",
            "outlier",
            w = ID_WIDTH,
        ),
    );
    push_line(
        &mut out,
        format!(
            "{:-<w$} {:-<10} {:-<5} {:-<8} {:-<9} {:-<9} {:-<9} {:-<6} {:-<13}",
            "",
            "",
            "",
            "",
            "",
            "",
            "",
            "",
            "",
            w = ID_WIDTH,
        ),
    );
    for r in take(records, top_n) {
        push_line(
            &mut out,
            format!(
                "{:<w$} {:<10} {:>5} {:>8.2} {:>9.2} {:>9.2} {:>9.2} {:<6} {:<13}",
                truncate(&r.id, ID_WIDTH),
                truncate(&r.cusip, 10),
                if r.owned { "yes" } else { "" },
                r.duration,
                r.spread,
                r.fitted,
                r.deviation,
                r.direction.label(),
                outlier_label(r.outlier),
                w = ID_WIDTH,
            ),
        );
    }
    push_more(&mut out, records.len(), top_n);
    out
}

/// Owned bonds trading through the lower band.
pub fn format_below_owned(issuer: &IssuerScreen) -> String {
    let rows = issuer.below_owned();
    let mut out = String::new();
    if rows.is_empty() {
        out.push_str("(no owned bonds below the curve band)\n");
        return out;
    }
    push_line(&mut out, format!("{:<w$} {:<10} {:>9}", "id", "cusip", "deviation", w = ID_WIDTH));
    push_line(&mut out, format!("{:-<w$} {:-<10} {:-<9}", "", "", "", w = ID_WIDTH));
    for r in rows {
        push_line(
            &mut out,
            format!(
                "{:<w$} {:<10} {:>9.2}",
                truncate(&r.id, ID_WIDTH),
                truncate(&r.cusip, 10),
                r.deviation,
                w = ID_WIDTH
            ),
        );
    }
    out
}

/// Issuers that contributed nothing, with the reason.
pub fn format_skipped(skipped: &[SkippedIssuer], top_n: usize) -> String {
    let mut out = String::new();
    for s in take(skipped, top_n) {
        push_line(&mut out, format!("{:<10} {}", truncate(&s.ticker, 10), s.reason));
    }
    push_more(&mut out, skipped.len(), top_n);
    out
}

/// Fitted parameters and diagnostics for one issuer.
pub fn format_curve(ticker: &str, fit: &CurveFit) -> String {
    let p = &fit.params;
    let mut out = String::new();
    out.push_str(&format!("Curve {ticker}: n={} SSE={:.3} RMSE={:.3}bp evals={}\n", fit.n, fit.sse, fit.rmse, fit.evaluations));
    out.push_str(&format!(
        "- level={:.4} slope={:.4} curvature={:.4} decay={:.4}\n",
        p.level, p.slope, p.curvature, p.decay
    ));
    out
}

fn outlier_label(kind: Option<OutlierKind>) -> &'static str {
    match kind {
        Some(OutlierKind::BelowOwned) => "below-owned",
        Some(OutlierKind::AboveUnowned) => "above-unowned",
        None => "",
    }
}

fn take<T>(rows: &[T], top_n: usize) -> &[T] {
    if top_n == 0 { rows } else { &rows[..rows.len().min(top_n)] }
}

fn push_line(out: &mut String, line: String) {
    out.push_str(line.trim_end());
    out.push('\n');
}

fn push_more(out: &mut String, total: usize, top_n: usize) {
    if top_n > 0 && total > top_n {
        out.push_str(&format!("... {} more (use --top 0 to show all)\n", total - top_n));
    }
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map(|x| format!("{x:.2}")).unwrap_or_else(|| "-".to_string())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('.');
    out
}
