use chrono::{Local, NaiveDate};
use tracing::debug;

use super::error::{ProjectionError, Result};
use super::rng::{Rng, derive_seed};
use super::solver::{resolve_target_date, solve_goal};
use super::types::{
    Composition, DeterministicPoint, PercentileBand, ProjectionInput, ProjectionResult,
};

pub const DEFAULT_PATH_COUNT: usize = 300;
pub const MAX_PATH_COUNT: usize = 10_000;
pub const MAX_HORIZON_YEARS: u32 = 100;

const MONTHS_PER_YEAR: usize = 12;
const BAND_PERCENTILES: [f64; 3] = [10.0, 50.0, 90.0];

#[derive(Debug, Clone)]
struct DeterministicPath {
    annual_values: Vec<f64>,
    final_value: f64,
    total_contributed: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeterministicProjection {
    pub series: Vec<DeterministicPoint>,
    pub average_final_value: f64,
    pub goal_final_value: f64,
    pub composition: Composition,
}

/// All simulated trajectories, stored month-major so a cross-section at one
/// month is a contiguous slice.
#[derive(Debug, Clone, PartialEq)]
pub struct PathEnsemble {
    path_count: usize,
    months: usize,
    values: Vec<f64>,
}

impl PathEnsemble {
    fn zeroed(path_count: usize, months: usize) -> Self {
        Self {
            path_count,
            months,
            values: vec![0.0; path_count * (months + 1)],
        }
    }

    pub fn path_count(&self) -> usize {
        self.path_count
    }

    pub fn months(&self) -> usize {
        self.months
    }

    /// Values of every path after `month` months.
    pub fn cross_section(&self, month: usize) -> &[f64] {
        let start = month * self.path_count;
        &self.values[start..start + self.path_count]
    }

    pub fn path(&self, index: usize) -> Vec<f64> {
        (0..=self.months)
            .map(|m| self.values[m * self.path_count + index])
            .collect()
    }

    fn set(&mut self, month: usize, index: usize, value: f64) {
        self.values[month * self.path_count + index] = value;
    }
}

/// Runs the full pipeline with "now" taken from the local clock.
pub fn project(input: &ProjectionInput, path_count: usize) -> Result<ProjectionResult> {
    project_as_of(input, path_count, Local::now().date_naive())
}

pub fn project_as_of(
    input: &ProjectionInput,
    path_count: usize,
    today: NaiveDate,
) -> Result<ProjectionResult> {
    validate_input(input)?;
    validate_path_count(path_count)?;

    let seed = derive_seed(input);
    debug!(
        seed,
        months = input.months(),
        path_count,
        has_target = input.has_target(),
        "running projection"
    );

    let ensemble = simulate_paths(input, seed, path_count);
    let annual_percentile_bands = aggregate_bands(&ensemble);
    let deterministic = project_deterministic(input);
    let goal = solve_goal(input, &ensemble, today)?;

    let result = ProjectionResult {
        seed,
        average_final_value: deterministic.average_final_value,
        goal_final_value: deterministic.goal_final_value,
        composition: deterministic.composition,
        annual_deterministic_series: deterministic.series,
        annual_percentile_bands,
        months_to_target: goal.months_to_target,
        required_monthly_contribution: goal.required_monthly_contribution,
        probability_to_target: goal.probability_to_target,
    };
    ensure_finite(&result)?;
    Ok(result)
}

pub fn validate_input(input: &ProjectionInput) -> Result<()> {
    if input.horizon_years == 0 || input.horizon_years > MAX_HORIZON_YEARS {
        return Err(ProjectionError::InvalidHorizon {
            value: input.horizon_years,
            max: MAX_HORIZON_YEARS,
        });
    }

    for (field, value) in [
        ("initialAmount", input.initial_amount),
        ("monthlyContributionAverage", input.monthly_contribution_average),
        ("monthlyContributionGoal", input.monthly_contribution_goal),
        ("targetAmount", input.target_amount),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(ProjectionError::InvalidAmount { field, value });
        }
    }

    for (field, value) in [
        ("annualReturn", input.annual_return),
        ("contributionAnnualGrowth", input.contribution_annual_growth),
    ] {
        if !value.is_finite() {
            return Err(ProjectionError::invalid_rate(field, "must be finite"));
        }
        if value < -1.0 {
            return Err(ProjectionError::invalid_rate(
                field,
                format!("{value} is below -100%"),
            ));
        }
    }

    if !input.annual_volatility.is_finite() || input.annual_volatility < 0.0 {
        return Err(ProjectionError::invalid_rate(
            "annualVolatility",
            format!("must be a finite rate >= 0, got {}", input.annual_volatility),
        ));
    }

    resolve_target_date(input)?;

    Ok(())
}

pub fn validate_path_count(path_count: usize) -> Result<()> {
    if path_count == 0 || path_count > MAX_PATH_COUNT {
        return Err(ProjectionError::InvalidPathCount {
            value: path_count,
            max: MAX_PATH_COUNT,
        });
    }
    Ok(())
}

/// Monthly rate that compounds to `annual_rate` over twelve months.
pub fn monthly_rate(annual_rate: f64) -> f64 {
    (1.0 + annual_rate).powf(1.0 / 12.0) - 1.0
}

fn is_snapshot_month(month: usize, months: usize) -> bool {
    month % MONTHS_PER_YEAR == 0 || month == months
}

fn run_deterministic_path(
    input: &ProjectionInput,
    monthly_contribution: f64,
    months: usize,
) -> DeterministicPath {
    let mu = monthly_rate(input.annual_return);
    let g = monthly_rate(input.contribution_annual_growth);

    let mut value = input.initial_amount;
    let mut contribution = monthly_contribution;
    let mut total_contributed = 0.0;
    let mut annual_values = Vec::with_capacity(months / MONTHS_PER_YEAR + 1);

    for m in 0..=months {
        if is_snapshot_month(m, months) {
            annual_values.push(value);
        }
        if m < months {
            value = value * (1.0 + mu) + contribution;
            total_contributed += contribution;
            contribution *= 1.0 + g;
        }
    }

    DeterministicPath {
        annual_values,
        final_value: value,
        total_contributed,
    }
}

/// Final value of the deterministic path after `months` months at the given
/// starting contribution.
pub fn deterministic_value_after(
    input: &ProjectionInput,
    monthly_contribution: f64,
    months: usize,
) -> f64 {
    run_deterministic_path(input, monthly_contribution, months).final_value
}

pub fn project_deterministic(input: &ProjectionInput) -> DeterministicProjection {
    let months = input.months();
    let average = run_deterministic_path(input, input.monthly_contribution_average, months);
    let goal = run_deterministic_path(input, input.monthly_contribution_goal, months);

    let series = average
        .annual_values
        .iter()
        .zip(goal.annual_values.iter())
        .enumerate()
        .map(|(year, (&average_value, &goal_value))| DeterministicPoint {
            year_index: year as u32,
            average_value,
            goal_value,
        })
        .collect();

    DeterministicProjection {
        series,
        average_final_value: average.final_value,
        goal_final_value: goal.final_value,
        composition: composition(average.total_contributed, average.final_value),
    }
}

fn composition(total_contributed: f64, final_value: f64) -> Composition {
    let contribution_share_pct = if final_value > 0.0 {
        (total_contributed / final_value * 100.0).clamp(0.0, 100.0)
    } else {
        0.0
    };
    Composition {
        contribution_share_pct,
        growth_share_pct: 100.0 - contribution_share_pct,
    }
}

/// One rng is advanced path by path, month by month, two uniforms per step.
/// Path `i` therefore always sees the same draws regardless of how many paths
/// follow it.
pub fn simulate_paths(input: &ProjectionInput, seed: u32, path_count: usize) -> PathEnsemble {
    let months = input.months();
    let mu = monthly_rate(input.annual_return);
    let g = monthly_rate(input.contribution_annual_growth);
    let monthly_sigma = input.annual_volatility / 12f64.sqrt();

    let mut rng = Rng::new(seed);
    let mut ensemble = PathEnsemble::zeroed(path_count, months);

    for path_index in 0..path_count {
        let mut value = input.initial_amount;
        let mut contribution = input.monthly_contribution_average;
        for m in 0..=months {
            ensemble.set(m, path_index, value);
            if m < months {
                let z = rng.standard_normal();
                let monthly_return = mu + monthly_sigma * z;
                value = value * (1.0 + monthly_return).max(0.0) + contribution;
                contribution *= 1.0 + g;
            }
        }
    }

    ensemble
}

/// Nearest-rank: floor-indexed into an ascending slice, no interpolation.
pub fn nearest_rank(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let index = ((p / 100.0) * (sorted.len() - 1) as f64).floor() as usize;
    sorted[index.min(sorted.len() - 1)]
}

pub fn aggregate_bands(ensemble: &PathEnsemble) -> Vec<PercentileBand> {
    let months = ensemble.months();
    let mut scratch = Vec::with_capacity(ensemble.path_count());

    (0..=months)
        .filter(|&m| is_snapshot_month(m, months))
        .map(|m| {
            scratch.clear();
            scratch.extend_from_slice(ensemble.cross_section(m));
            scratch.sort_by(|a, b| a.total_cmp(b));
            let [p10, p50, p90] = BAND_PERCENTILES.map(|p| nearest_rank(&scratch, p));
            PercentileBand {
                year_index: (m / MONTHS_PER_YEAR) as u32,
                p10,
                p50,
                p90,
            }
        })
        .collect()
}

fn ensure_finite(result: &ProjectionResult) -> Result<()> {
    let scalars = [
        ("averageFinalValue", result.average_final_value),
        ("goalFinalValue", result.goal_final_value),
        (
            "composition",
            result.composition.contribution_share_pct + result.composition.growth_share_pct,
        ),
    ];
    for (label, value) in scalars {
        if !value.is_finite() {
            return Err(ProjectionError::NonFiniteResult(label));
        }
    }
    if result
        .annual_deterministic_series
        .iter()
        .any(|p| !p.average_value.is_finite() || !p.goal_value.is_finite())
    {
        return Err(ProjectionError::NonFiniteResult("annualDeterministicSeries"));
    }
    if result
        .annual_percentile_bands
        .iter()
        .any(|b| !b.p10.is_finite() || !b.p50.is_finite() || !b.p90.is_finite())
    {
        return Err(ProjectionError::NonFiniteResult("annualPercentileBands"));
    }
    if result
        .required_monthly_contribution
        .is_some_and(|v| !v.is_finite())
    {
        return Err(ProjectionError::NonFiniteResult("requiredMonthlyContribution"));
    }
    Ok(())
}
