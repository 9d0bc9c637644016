//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - loads `.env` and initializes logging
//! - parses CLI arguments
//! - loads the bond and position feeds (or a synthetic universe)
//! - runs the screen
//! - prints reports and writes optional exports

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::app::pipeline::{ScreenOutput, run_screen};
use crate::cli::{Command, CurveArgs, DemoArgs, FeedArgs, OutputArgs, RuleArgs, ScreenArgs};
use crate::data::{SampleConfig, generate_universe};
use crate::domain::{BondObservation, PositionRow, ScreenConfig, Segment, SegmentRules};
use crate::error::AppError;
use crate::io::{curve_file, load_bonds, load_positions, write_curve_json, write_deviations_csv, write_trades_csv};
use crate::report;

pub mod pipeline;

/// Entry point for the `rv` binary.
pub fn run() -> Result<(), AppError> {
    dotenvy::dotenv().ok();

    // `rv --bonds a.csv ...` behaves like `rv screen --bonds a.csv ...`.
    let argv = rewrite_args(std::env::args().collect());
    let cli = crate::cli::Cli::parse_from(argv);
    init_tracing(cli.verbose);

    match cli.command {
        Command::Screen(args) => handle_screen(args),
        Command::Curve(args) => handle_curve(args),
        Command::Demo(args) => handle_demo(args),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "rv_trades=debug" } else { "rv_trades=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // Tables go to stdout; logs stay on stderr.
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn handle_screen(args: ScreenArgs) -> Result<(), AppError> {
    let config = screen_config_from_args(&args.rules, &args.output)?;
    let (bonds, positions) = load_feeds(&args.feeds)?;
    let output = run_screen(&bonds, &positions, &config.rules);
    print_and_export(&config, &output)
}

fn handle_demo(args: DemoArgs) -> Result<(), AppError> {
    let config = screen_config_from_args(&args.rules, &args.output)?;
    let sample = SampleConfig {
        issuers: args.issuers,
        ..SampleConfig::for_segment(config.segment, args.seed)
    };
    let universe = generate_universe(&sample)?;
    tracing::info!(
        seed = args.seed,
        bonds = universe.bonds.len(),
        positions = universe.positions.len(),
        asof = %universe.asof_date,
        "generated synthetic universe"
    );
    let output = run_screen(&universe.bonds, &universe.positions, &config.rules);
    print_and_export(&config, &output)
}

fn handle_curve(args: CurveArgs) -> Result<(), AppError> {
    let rules = rules_from_args(&args.rules)?;
    let (bonds, positions) = load_feeds(&args.feeds)?;

    let ticker = args.ticker.trim();
    let issuer_bonds: Vec<BondObservation> = bonds
        .into_iter()
        .filter(|b| b.ticker.eq_ignore_ascii_case(ticker))
        .collect();
    if issuer_bonds.is_empty() {
        return Err(AppError::new(3, format!("No bonds found for ticker '{ticker}'.")));
    }

    let output = run_screen(&issuer_bonds, &positions, &rules);
    if let Some(skip) = output.skipped_issuer(ticker) {
        return Err(AppError::new(3, format!("No curve for {}: {}", skip.ticker, skip.reason)));
    }
    let issuer = output
        .issuer(ticker)
        .ok_or_else(|| AppError::new(4, format!("Issuer '{ticker}' missing from screen output.")))?;
    let Some(fit) = &issuer.curve else {
        let reason = issuer
            .curve_issue
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "curve unavailable".to_string());
        return Err(AppError::new(3, format!("No curve for {}: {reason}", issuer.ticker)));
    };

    println!("{}", report::format_curve(&issuer.ticker, fit));
    println!("{}", report::format_deviations(&issuer.deviations, 0));

    if let Some(path) = &args.export_curve {
        let durations: Vec<f64> = issuer.observations.iter().map(|o| o.bond.duration).collect();
        let file = curve_file(args.rules.segment, &issuer.ticker, fit, rules.threshold_percent, &durations)?;
        write_curve_json(path, &file)?;
        tracing::info!(path = %path.display(), "wrote curve JSON");
    }
    Ok(())
}

fn load_feeds(feeds: &FeedArgs) -> Result<(Vec<BondObservation>, Vec<PositionRow>), AppError> {
    let bond_feed = load_bonds(&feeds.bonds)?;
    let position_feed = load_positions(&feeds.positions)?;

    for e in bond_feed.row_errors.iter().chain(&position_feed.row_errors) {
        tracing::debug!(line = e.line, id = ?e.id, "{}", e.message);
    }
    tracing::info!(
        bonds = bond_feed.bonds.len(),
        bond_rows = bond_feed.rows_read,
        positions = position_feed.positions.len(),
        position_rows = position_feed.rows_read,
        "loaded feeds"
    );
    Ok((bond_feed.bonds, position_feed.positions))
}

fn print_and_export(config: &ScreenConfig, output: &ScreenOutput) -> Result<(), AppError> {
    println!("{}", report::format_run_summary(config.segment, output));

    println!("Universe trade candidates:");
    println!(
        "{}",
        report::format_trades(&output.trades, config.top_n, config.segment == Segment::Hy)
    );

    if !output.skipped.is_empty() {
        println!("Skipped issuers:");
        println!("{}", report::format_skipped(&output.skipped, config.top_n));
    }

    if let Some(ticker) = &config.ticker {
        print_ticker_view(config, output, ticker)?;
    }

    if let Some(path) = &config.export_trades {
        write_trades_csv(path, &output.trades)?;
        tracing::info!(path = %path.display(), rows = output.trades.len(), "wrote trades CSV");
    }
    if let Some(path) = &config.export_deviations {
        let blocks: Vec<(&str, &[_])> = output
            .issuers
            .iter()
            .map(|i| (i.ticker.as_str(), i.deviations.as_slice()))
            .collect();
        write_deviations_csv(path, &blocks)?;
        tracing::info!(path = %path.display(), "wrote deviations CSV");
    }
    Ok(())
}

fn print_ticker_view(config: &ScreenConfig, output: &ScreenOutput, ticker: &str) -> Result<(), AppError> {
    if let Some(skip) = output.skipped_issuer(ticker) {
        println!("Ticker {}: skipped ({})", skip.ticker, skip.reason);
        return Ok(());
    }
    let issuer = output
        .issuer(ticker)
        .ok_or_else(|| AppError::new(3, format!("Ticker '{ticker}' not found in the bond universe.")))?;

    println!(
        "=== {} | bonds={} owned={} ===",
        issuer.ticker,
        issuer.observations.len(),
        issuer.owned_count()
    );
    match (&issuer.curve, &issuer.curve_issue) {
        (Some(fit), _) => println!("{}", report::format_curve(&issuer.ticker, fit)),
        (None, Some(reason)) => println!("No curve: {reason}\n"),
        (None, None) => {}
    }

    println!("Owned bonds below the curve:");
    println!("{}", report::format_below_owned(issuer));
    println!("Trade candidates for {}:", issuer.ticker);
    println!(
        "{}",
        report::format_trades(&issuer.ticker_trades, config.top_n, config.segment == Segment::Hy)
    );
    if !issuer.deviations.is_empty() {
        println!("Curve deviations:");
        println!("{}", report::format_deviations(&issuer.deviations, config.top_n));
    }

    if let (Some(path), Some(fit)) = (&config.export_curve, &issuer.curve) {
        let durations: Vec<f64> = issuer.observations.iter().map(|o| o.bond.duration).collect();
        let file = curve_file(config.segment, &issuer.ticker, fit, config.rules.threshold_percent, &durations)?;
        write_curve_json(path, &file)?;
        tracing::info!(path = %path.display(), "wrote curve JSON");
    }
    Ok(())
}

/// Segment defaults with the CLI overrides applied.
pub fn rules_from_args(args: &RuleArgs) -> Result<SegmentRules, AppError> {
    let mut rules = SegmentRules::for_segment(args.segment);

    if let Some(t) = args.threshold {
        if !(t.is_finite() && t >= 0.0) {
            return Err(AppError::new(2, format!("--threshold must be a finite value >= 0 (got {t}).")));
        }
        rules.threshold_percent = t;
    }
    if let Some(r) = args.min_ratio {
        if !r.is_finite() {
            return Err(AppError::new(2, format!("--min-ratio must be finite (got {r}).")));
        }
        rules.min_ratio = r;
    }
    if let Some(n) = args.min_observations {
        rules.min_observations = n;
    }
    if let Some(h) = args.min_holding {
        if !(h.is_finite() && h >= 0.0) {
            return Err(AppError::new(2, format!("--min-holding must be a finite value >= 0 (got {h}).")));
        }
        rules.min_holding = Some(h);
    }
    Ok(rules)
}

pub fn screen_config_from_args(rules: &RuleArgs, output: &OutputArgs) -> Result<ScreenConfig, AppError> {
    if output.export_curve.is_some() && output.ticker.is_none() {
        return Err(AppError::new(2, "--export-curve requires --ticker."));
    }
    Ok(ScreenConfig {
        segment: rules.segment,
        rules: rules_from_args(rules)?,
        ticker: output.ticker.clone(),
        top_n: output.top,
        export_trades: output.export_trades.clone(),
        export_deviations: output.export_deviations.clone(),
        export_curve: output.export_curve.clone(),
    })
}

/// Rewrite argv so bare flags mean `rv screen`.
///
/// Rules:
/// - `rv`                      -> `rv demo`
/// - `rv --bonds a.csv ...`    -> `rv screen --bonds a.csv ...`
/// - `rv --help/--version/-h`  -> unchanged (show top-level help/version)
fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    let Some(arg1) = argv.get(1).cloned() else {
        argv.push("demo".to_string());
        return argv;
    };

    let is_top_level_help_or_version = matches!(arg1.as_str(), "-h" | "--help" | "-V" | "--version" | "help");
    if is_top_level_help_or_version {
        return argv;
    }

    let is_subcommand = matches!(arg1.as_str(), "screen" | "curve" | "demo");
    if is_subcommand {
        return argv;
    }

    // If the first token is a flag, treat it as "screen flags".
    if arg1.starts_with('-') {
        argv.insert(1, "screen".to_string());
        return argv;
    }

    argv
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn rule_args(segment: Segment) -> RuleArgs {
        RuleArgs {
            segment,
            threshold: None,
            min_ratio: None,
            min_observations: None,
            min_holding: None,
        }
    }

    #[test]
    fn bare_flags_become_screen() {
        assert_eq!(
            rewrite_args(args(&["rv", "--bonds", "b.csv"])),
            args(&["rv", "screen", "--bonds", "b.csv"])
        );
        assert_eq!(rewrite_args(args(&["rv"])), args(&["rv", "demo"]));
        assert_eq!(rewrite_args(args(&["rv", "--help"])), args(&["rv", "--help"]));
        assert_eq!(rewrite_args(args(&["rv", "curve", "-t", "X"])), args(&["rv", "curve", "-t", "X"]));
    }

    #[test]
    fn overrides_replace_segment_defaults() {
        let mut a = rule_args(Segment::Ig);
        a.threshold = Some(7.5);
        a.min_holding = Some(1_000_000.0);
        let rules = rules_from_args(&a).unwrap();
        assert_eq!(rules.threshold_percent, 7.5);
        assert_eq!(rules.min_holding, Some(1_000_000.0));
        assert_eq!(rules.min_ratio, 12.0);
        assert_eq!(rules.min_observations, 5);
    }

    #[test]
    fn invalid_override_is_a_config_error() {
        let mut a = rule_args(Segment::Hy);
        a.threshold = Some(-1.0);
        assert_eq!(rules_from_args(&a).unwrap_err().exit_code(), 2);
    }

    #[test]
    fn curve_export_needs_a_ticker() {
        let output = OutputArgs {
            ticker: None,
            top: 10,
            export_trades: None,
            export_deviations: None,
            export_curve: Some("c.json".into()),
        };
        let err = screen_config_from_args(&rule_args(Segment::Ig), &output).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
