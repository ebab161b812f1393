//! Run summary across finished windows, with a go/no-go verdict.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::engine::WindowMetrics;
use crate::fills::FillModel;

/// Windows whose Up mid ranged wider than this count as high volatility.
pub const HIGH_VOLATILITY: Decimal = Decimal::from_parts(2, 0, 0, false, 2);

const KILL_BELOW: Decimal = Decimal::from_parts(20, 0, 0, false, 2);
const PROMISING_ABOVE: Decimal = Decimal::from_parts(50, 0, 0, false, 2);
const PROMISING_MEDIAN_EDGE: Decimal = Decimal::from_parts(5, 0, 0, false, 3);

/// Go/no-go call on the tracking model's results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    /// Not enough first-leg fills to decide.
    Inconclusive,
    /// Pairs rarely complete.
    Kill,
    /// Neither kill nor promising.
    Marginal,
    /// Pairs usually complete at a worthwhile edge.
    Promising,
}

/// Totals for one fill model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSummary {
    /// Model.
    pub model: FillModel,
    /// First-leg fills across windows.
    pub first_leg_fills: u64,
    /// Completed pairs across windows.
    pub completed_pairs: u64,
    /// `completed / first`, when any first legs filled.
    pub p_complete: Option<Decimal>,
    /// Median locked edge.
    pub median_edge: Option<Decimal>,
    /// 10th percentile locked edge (minimum below ten samples).
    pub p10_edge: Option<Decimal>,
}

/// Tracking-model totals for a volatility bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StratumSummary {
    /// Bucket name.
    pub label: String,
    /// Windows in the bucket.
    pub windows: u64,
    /// First-leg fills.
    pub first_leg_fills: u64,
    /// Completed pairs.
    pub completed_pairs: u64,
    /// `completed / first`.
    pub p_complete: Option<Decimal>,
}

/// Summary of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Windows finalized.
    pub windows_seen: u64,
    /// Windows that passed the pre-filter.
    pub windows_passed_prefilter: u64,
    /// Windows that entered rescue mode.
    pub windows_rescued: u64,
    /// Model the verdict is based on.
    pub tracking_model: FillModel,
    /// Per-model totals.
    pub models: Vec<ModelSummary>,
    /// Tracking-model results by volatility.
    pub strata: Vec<StratumSummary>,
    /// The call.
    pub verdict: Verdict,
    /// Why.
    pub verdict_reason: String,
}

impl RunSummary {
    /// Summarize finished windows.
    pub fn from_windows(windows: &[WindowMetrics], tracking_model: FillModel, min_first_leg_fills: u64) -> Self {
        let models: Vec<ModelSummary> = FillModel::ALL
            .into_iter()
            .map(|model| summarize_model(windows, model))
            .collect();

        let (high, low): (Vec<&WindowMetrics>, Vec<&WindowMetrics>) = windows
            .iter()
            .partition(|w| w.volatility_proxy > HIGH_VOLATILITY);
        let strata = vec![
            stratum("high_vol", &high, tracking_model),
            stratum("low_vol", &low, tracking_model),
        ];

        let tracked = &models[tracking_model.index()];
        let (verdict, verdict_reason) = decide(tracked, min_first_leg_fills);

        Self {
            windows_seen: windows.len() as u64,
            windows_passed_prefilter: windows.iter().filter(|w| w.passed_prefilter).count() as u64,
            windows_rescued: windows.iter().filter(|w| w.rescue_triggered).count() as u64,
            tracking_model,
            models,
            strata,
            verdict,
            verdict_reason,
        }
    }

    /// Totals for one model.
    pub fn model(&self, model: FillModel) -> &ModelSummary {
        &self.models[model.index()]
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Windows: {}", self.windows_seen)?;
        writeln!(f, "Passed pre-filter: {}", self.windows_passed_prefilter)?;
        writeln!(f, "Rescued: {}", self.windows_rescued)?;

        for m in &self.models {
            writeln!(f, "--- Model {} ({}) ---", m.model.code(), m.model)?;
            writeln!(f, "  First-leg fills: {}", m.first_leg_fills)?;
            writeln!(f, "  Completed pairs: {}", m.completed_pairs)?;
            if let Some(p) = m.p_complete {
                writeln!(f, "  P(complete|first): {}%", (p * Decimal::ONE_HUNDRED).round_dp(1))?;
            }
            if let (Some(median), Some(p10)) = (m.median_edge, m.p10_edge) {
                writeln!(f, "  Edge median: {} cents", (median * Decimal::ONE_HUNDRED).round_dp(2))?;
                writeln!(f, "  Edge p10: {} cents", (p10 * Decimal::ONE_HUNDRED).round_dp(2))?;
            }
        }

        writeln!(f, "--- Stratified by volatility ({}) ---", self.tracking_model.code())?;
        for s in self.strata.iter().filter(|s| s.windows > 0) {
            let p = s.p_complete.unwrap_or_default() * Decimal::ONE_HUNDRED;
            writeln!(
                f,
                "  {}: {} windows, fills={}, P(complete)={}%",
                s.label,
                s.windows,
                s.first_leg_fills,
                p.round_dp(1)
            )?;
        }

        write!(f, "DECISION: {} ({})", self.verdict, self.verdict_reason)
    }
}

fn summarize_model(windows: &[WindowMetrics], model: FillModel) -> ModelSummary {
    let first_leg_fills: u64 = windows.iter().map(|w| u64::from(w.model(model).first_leg_fills)).sum();
    let completed_pairs: u64 = windows.iter().map(|w| u64::from(w.model(model).completed_pairs)).sum();

    let mut edges: Vec<Decimal> = windows
        .iter()
        .flat_map(|w| w.model(model).edge_nets.iter().copied())
        .collect();
    edges.sort();

    ModelSummary {
        model,
        first_leg_fills,
        completed_pairs,
        p_complete: ratio(completed_pairs, first_leg_fills),
        median_edge: median(&edges),
        p10_edge: p10(&edges),
    }
}

fn stratum(label: &str, windows: &[&WindowMetrics], model: FillModel) -> StratumSummary {
    let first_leg_fills: u64 = windows.iter().map(|w| u64::from(w.model(model).first_leg_fills)).sum();
    let completed_pairs: u64 = windows.iter().map(|w| u64::from(w.model(model).completed_pairs)).sum();
    StratumSummary {
        label: label.to_string(),
        windows: windows.len() as u64,
        first_leg_fills,
        completed_pairs,
        p_complete: ratio(completed_pairs, first_leg_fills),
    }
}

fn decide(tracked: &ModelSummary, min_first_leg_fills: u64) -> (Verdict, String) {
    if tracked.first_leg_fills < min_first_leg_fills {
        return (
            Verdict::Inconclusive,
            format!(
                "only {} first-leg fills (need {}+)",
                tracked.first_leg_fills, min_first_leg_fills
            ),
        );
    }

    let p = tracked.p_complete.unwrap_or_default();
    let median = tracked.median_edge.unwrap_or_default();
    let pct = (p * Decimal::ONE_HUNDRED).round_dp(1);
    let cents = (median * Decimal::ONE_HUNDRED).round_dp(2);

    if p < KILL_BELOW {
        (Verdict::Kill, format!("P(complete|first) = {pct}% < 20%"))
    } else if p > PROMISING_ABOVE && median > PROMISING_MEDIAN_EDGE {
        (Verdict::Promising, format!("P(complete|first) = {pct}% > 50%, edge = {cents}c"))
    } else {
        (Verdict::Marginal, format!("P(complete|first) = {pct}%, edge = {cents}c"))
    }
}

fn ratio(num: u64, den: u64) -> Option<Decimal> {
    (den > 0).then(|| Decimal::from(num) / Decimal::from(den))
}

/// Median of sorted values (mean of the middle two for even counts).
fn median(sorted: &[Decimal]) -> Option<Decimal> {
    let n = sorted.len();
    match n {
        0 => None,
        _ if n % 2 == 1 => Some(sorted[n / 2]),
        _ => Some((sorted[n / 2 - 1] + sorted[n / 2]) / Decimal::TWO),
    }
}

fn p10(sorted: &[Decimal]) -> Option<Decimal> {
    if sorted.len() >= 10 {
        Some(sorted[sorted.len() / 10])
    } else {
        sorted.first().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn window(first: u32, completed: u32, edges: &[Decimal], volatility: Decimal) -> WindowMetrics {
        let mut w = WindowMetrics {
            passed_prefilter: true,
            volatility_proxy: volatility,
            ..WindowMetrics::default()
        };
        for model in FillModel::ALL {
            let m = w.model_mut(model);
            m.first_leg_fills = first;
            m.completed_pairs = completed;
            m.edge_nets = edges.to_vec();
        }
        w
    }

    #[test]
    fn median_and_p10() {
        assert_eq!(median(&[]), None);
        assert_eq!(median(&[dec!(1), dec!(3)]), Some(dec!(2)));
        assert_eq!(median(&[dec!(1), dec!(2), dec!(9)]), Some(dec!(2)));

        let values: Vec<Decimal> = (0..20).map(Decimal::from).collect();
        assert_eq!(p10(&values), Some(dec!(2)));
        assert_eq!(p10(&values[..5]), Some(dec!(0)));
    }

    #[test]
    fn few_fills_is_inconclusive() {
        let windows = vec![window(1, 1, &[dec!(0.02)], dec!(0.01))];
        let summary = RunSummary::from_windows(&windows, FillModel::QueueAware, 100);
        assert_eq!(summary.verdict, Verdict::Inconclusive);
    }

    #[test]
    fn low_completion_is_kill() {
        let mut windows = vec![window(1, 0, &[], dec!(0.01)); 9];
        windows.push(window(1, 1, &[dec!(0.01)], dec!(0.01)));

        let summary = RunSummary::from_windows(&windows, FillModel::QueueAware, 10);
        assert_eq!(summary.model(FillModel::QueueAware).p_complete, Some(dec!(0.1)));
        assert_eq!(summary.verdict, Verdict::Kill);
    }

    #[test]
    fn high_completion_with_edge_is_promising() {
        let windows = vec![window(1, 1, &[dec!(0.015)], dec!(0.05)); 4];

        let summary = RunSummary::from_windows(&windows, FillModel::QueueAware, 4);
        assert_eq!(summary.verdict, Verdict::Promising);
        assert_eq!(summary.strata[0].windows, 4);
        assert_eq!(summary.strata[1].windows, 0);
        assert!(summary.to_string().contains("DECISION: PROMISING"));
    }

    #[test]
    fn thin_edge_is_marginal() {
        let windows = vec![window(1, 1, &[dec!(0.004)], dec!(0.01)); 4];
        let summary = RunSummary::from_windows(&windows, FillModel::QueueAware, 4);
        assert_eq!(summary.verdict, Verdict::Marginal);
    }
}
