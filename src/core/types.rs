use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionInput {
    pub initial_amount: f64,
    /// Drives the "average" deterministic path and every Monte Carlo path.
    pub monthly_contribution_average: f64,
    /// Drives only the deterministic "goal" path.
    pub monthly_contribution_goal: f64,
    pub annual_return: f64,
    pub annual_volatility: f64,
    pub contribution_annual_growth: f64,
    pub horizon_years: u32,
    /// Zero means no target.
    #[serde(default)]
    pub target_amount: f64,
    /// `YYYY-MM-DD` or RFC 3339; only read together with `target_amount`.
    #[serde(default)]
    pub target_date: Option<String>,
}

impl ProjectionInput {
    pub fn months(&self) -> usize {
        self.horizon_years as usize * 12
    }

    pub fn has_target(&self) -> bool {
        self.target_amount > 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Composition {
    pub contribution_share_pct: f64,
    pub growth_share_pct: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeterministicPoint {
    pub year_index: u32,
    pub average_value: f64,
    pub goal_value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PercentileBand {
    pub year_index: u32,
    pub p10: f64,
    pub p50: f64,
    pub p90: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionResult {
    pub seed: u32,
    pub average_final_value: f64,
    pub goal_final_value: f64,
    pub composition: Composition,
    pub annual_deterministic_series: Vec<DeterministicPoint>,
    pub annual_percentile_bands: Vec<PercentileBand>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub months_to_target: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_monthly_contribution: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probability_to_target: Option<f64>,
}
