//! Shared screening pipeline used by the `screen`, `curve` and `demo` commands.
//!
//! bonds + positions -> ownership -> group by issuer -> min-count filter
//! -> fit -> classify -> pair -> universe sort
//!
//! Issuers are independent, so the per-issuer cycle runs on the rayon pool.
//! Results are collected in issuer order and the universe list is sorted once
//! at the end, so output does not depend on scheduling.

use std::collections::HashMap;

use rayon::prelude::*;

use crate::domain::{
    BondObservation, CurveFit, DeviationRecord, OutlierKind, OwnedBond, PairingMode, PositionRow, SegmentRules,
    SkipReason, TradeCandidate,
};
use crate::error::FitFailure;
use crate::fit::{MIN_FIT_OBSERVATIONS, SolverOptions, fit_curve};
use crate::ownership::{OwnershipPolicy, resolve};
use crate::signals::{BuyUniverse, classify, outlier_pairs, relaxed_pairs, sort_candidates};

/// Everything computed for one issuer.
#[derive(Debug, Clone)]
pub struct IssuerScreen {
    pub ticker: String,
    pub observations: Vec<OwnedBond>,
    pub curve: Option<CurveFit>,
    /// Why `curve` is missing when the issuer still produced trades.
    pub curve_issue: Option<SkipReason>,
    pub deviations: Vec<DeviationRecord>,
    /// Pairs contributed to the universe view (emission order).
    pub universe_trades: Vec<TradeCandidate>,
    /// Pairs shown when this issuer is viewed on its own (sorted).
    pub ticker_trades: Vec<TradeCandidate>,
}

impl IssuerScreen {
    /// Owned bonds trading through the lower band.
    pub fn below_owned(&self) -> Vec<&DeviationRecord> {
        crate::signals::below_owned(&self.deviations)
    }

    pub fn owned_count(&self) -> usize {
        self.observations.iter().filter(|o| o.owned).count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedIssuer {
    pub ticker: String,
    pub reason: SkipReason,
}

/// Result of screening a whole universe.
#[derive(Debug, Clone)]
pub struct ScreenOutput {
    pub rules: SegmentRules,
    pub bond_count: usize,
    pub owned_count: usize,
    pub issuers: Vec<IssuerScreen>,
    pub skipped: Vec<SkippedIssuer>,
    /// Universe view: all issuers' pairs, sorted once.
    pub trades: Vec<TradeCandidate>,
}

impl ScreenOutput {
    /// Find an issuer by ticker (case-insensitive).
    pub fn issuer(&self, ticker: &str) -> Option<&IssuerScreen> {
        let ticker = ticker.trim();
        self.issuers.iter().find(|i| i.ticker.eq_ignore_ascii_case(ticker))
    }

    pub fn skipped_issuer(&self, ticker: &str) -> Option<&SkippedIssuer> {
        let ticker = ticker.trim();
        self.skipped.iter().find(|s| s.ticker.eq_ignore_ascii_case(ticker))
    }

    pub fn outlier_count(&self, kind: OutlierKind) -> usize {
        self.issuers
            .iter()
            .flat_map(|i| &i.deviations)
            .filter(|r| r.outlier == Some(kind))
            .count()
    }
}

/// Screen a universe of bonds against the current positions.
pub fn run_screen(bonds: &[BondObservation], positions: &[PositionRow], rules: &SegmentRules) -> ScreenOutput {
    let policy = OwnershipPolicy::from_rules(rules);
    let enriched = resolve(bonds, positions, &policy);
    let owned_count = enriched.iter().filter(|o| o.owned).count();

    let groups = group_by_ticker(enriched);
    tracing::info!(
        bonds = bonds.len(),
        owned = owned_count,
        issuers = groups.len(),
        "screening universe"
    );

    let solver = SolverOptions::default();
    let outcomes: Vec<Result<IssuerScreen, SkippedIssuer>> = groups
        .into_par_iter()
        .map(|(ticker, observations)| screen_issuer(ticker, observations, rules, &solver))
        .collect();

    let mut issuers = Vec::new();
    let mut skipped = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(issuer) => issuers.push(issuer),
            Err(skip) => skipped.push(skip),
        }
    }

    let mut trades: Vec<TradeCandidate> = issuers
        .iter()
        .flat_map(|i| i.universe_trades.iter().cloned())
        .collect();
    sort_candidates(&mut trades);

    tracing::info!(
        screened = issuers.len(),
        skipped = skipped.len(),
        trades = trades.len(),
        "screen complete"
    );

    ScreenOutput {
        rules: rules.clone(),
        bond_count: bonds.len(),
        owned_count,
        issuers,
        skipped,
        trades,
    }
}

/// Group observations by ticker, keeping first-appearance order.
fn group_by_ticker(observations: Vec<OwnedBond>) -> Vec<(String, Vec<OwnedBond>)> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(String, Vec<OwnedBond>)> = Vec::new();
    for obs in observations {
        let slot = *index.entry(obs.bond.ticker.clone()).or_insert_with(|| {
            groups.push((obs.bond.ticker.clone(), Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(obs);
    }
    groups
}

fn screen_issuer(
    ticker: String,
    observations: Vec<OwnedBond>,
    rules: &SegmentRules,
    solver: &SolverOptions,
) -> Result<IssuerScreen, SkippedIssuer> {
    let count = observations.len();
    let required = rules.min_observations.max(MIN_FIT_OBSERVATIONS);
    if count < required {
        tracing::debug!(%ticker, count, required, "skipping issuer: not enough bonds");
        return Err(SkippedIssuer {
            ticker,
            reason: SkipReason::InsufficientData { count, required },
        });
    }

    let durations: Vec<f64> = observations.iter().map(|o| o.bond.duration).collect();
    let spreads: Vec<f64> = observations.iter().map(|o| o.bond.spread).collect();

    let (curve, deviations, curve_issue) = match fit_curve(&durations, &spreads, solver) {
        Ok(fit) => {
            tracing::debug!(
                %ticker,
                n = fit.n,
                rmse = fit.rmse,
                evaluations = fit.evaluations,
                decay = fit.params.decay,
                "fitted curve"
            );
            match classify(&observations, &fit.params, rules.threshold_percent) {
                Ok(records) => (Some(fit), records, None),
                Err(e) => {
                    tracing::warn!(%ticker, error = %e, "fitted curve cannot be evaluated");
                    (None, Vec::new(), Some(SkipReason::CurveUnavailable(e)))
                }
            }
        }
        Err(e) => {
            tracing::warn!(%ticker, error = %e, "curve fit failed");
            (None, Vec::new(), Some(fit_skip_reason(e)))
        }
    };

    let (universe_trades, mut ticker_trades) = match rules.pairing {
        PairingMode::OutlierFiltered => {
            if let Some(reason) = curve_issue {
                return Err(SkippedIssuer { ticker, reason });
            }
            let trades = outlier_pairs(&ticker, &observations, &deviations, rules.min_ratio);
            (trades.clone(), trades)
        }
        PairingMode::Relaxed => {
            let records = (!deviations.is_empty()).then_some(deviations.as_slice());
            (
                relaxed_pairs(&ticker, &observations, records, BuyUniverse::All, rules.min_ratio),
                relaxed_pairs(&ticker, &observations, records, BuyUniverse::Unowned, rules.min_ratio),
            )
        }
    };
    sort_candidates(&mut ticker_trades);

    Ok(IssuerScreen {
        ticker,
        observations,
        curve,
        curve_issue,
        deviations,
        universe_trades,
        ticker_trades,
    })
}

fn fit_skip_reason(e: FitFailure) -> SkipReason {
    match e {
        FitFailure::InsufficientData { required, actual } => SkipReason::InsufficientData {
            count: actual,
            required,
        },
        other => SkipReason::FitFailed(other),
    }
}
