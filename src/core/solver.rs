use chrono::{DateTime, NaiveDate};
use serde::Serialize;

use super::engine::{
    PathEnsemble, monthly_rate, simulate_paths, validate_input, validate_path_count,
};
use super::error::{ProjectionError, Result};
use super::rng::derive_seed;
use super::types::ProjectionInput;

const AVERAGE_DAYS_PER_MONTH: f64 = 365.25 / 12.0;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GoalOutcome {
    pub months_to_target: Option<u32>,
    pub required_monthly_contribution: Option<f64>,
    pub probability_to_target: Option<f64>,
}

pub fn parse_target_date(raw: &str) -> Result<NaiveDate> {
    let trimmed = raw.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .or_else(|_| DateTime::parse_from_rfc3339(trimmed).map(|dt| dt.date_naive()))
        .map_err(|_| ProjectionError::InvalidTargetDate {
            value: raw.to_string(),
        })
}

/// Blank dates count as unset.
pub fn resolve_target_date(input: &ProjectionInput) -> Result<Option<NaiveDate>> {
    match input.target_date.as_deref() {
        Some(raw) if !raw.trim().is_empty() => parse_target_date(raw).map(Some),
        _ => Ok(None),
    }
}

pub fn months_between(from: NaiveDate, to: NaiveDate) -> f64 {
    (to - from).num_days() as f64 / AVERAGE_DAYS_PER_MONTH
}

/// `None` unless both a target amount and a target date are set. Dates in the
/// past resolve to month 0, dates past the horizon to the last month.
pub fn months_to_target(input: &ProjectionInput, today: NaiveDate) -> Result<Option<usize>> {
    if !input.has_target() {
        return Ok(None);
    }
    let Some(target_date) = resolve_target_date(input)? else {
        return Ok(None);
    };
    let months = months_between(today, target_date)
        .round()
        .clamp(0.0, input.months() as f64);
    Ok(Some(months as usize))
}

/// Level monthly contribution that grows `initial_amount` to `target_amount`
/// in `months` months at `rate` per month (ordinary annuity). With no months
/// left the whole shortfall is due at once.
pub fn required_monthly_contribution(
    initial_amount: f64,
    target_amount: f64,
    rate: f64,
    months: usize,
) -> f64 {
    if months == 0 {
        return (target_amount - initial_amount).max(0.0);
    }
    let n = months as i32;
    let growth = (1.0 + rate).powi(n);
    let future_initial = initial_amount * growth;
    let factor = if rate == 0.0 {
        months as f64
    } else {
        (growth - 1.0) / rate
    };
    ((target_amount - future_initial) / factor).max(0.0)
}

pub fn probability_to_target(ensemble: &PathEnsemble, month: usize, target_amount: f64) -> f64 {
    let cross_section = ensemble.cross_section(month);
    if cross_section.is_empty() {
        return 0.0;
    }
    let hits = cross_section.iter().filter(|&&v| v >= target_amount).count();
    hits as f64 / cross_section.len() as f64
}

pub fn solve_goal(
    input: &ProjectionInput,
    ensemble: &PathEnsemble,
    today: NaiveDate,
) -> Result<GoalOutcome> {
    let Some(n) = months_to_target(input, today)? else {
        return Ok(GoalOutcome::default());
    };

    let required = required_monthly_contribution(
        input.initial_amount,
        input.target_amount,
        monthly_rate(input.annual_return),
        n,
    );
    let probability = probability_to_target(ensemble, n, input.target_amount);

    Ok(GoalOutcome {
        months_to_target: Some(n as u32),
        required_monthly_contribution: Some(required),
        probability_to_target: Some(probability),
    })
}

#[derive(Debug, Clone, Copy)]
pub struct ConfidenceSolveConfig {
    pub target_probability: f64,
    pub search_min: f64,
    pub search_max: f64,
    pub tolerance: f64,
    pub max_iterations: u32,
    pub path_count: usize,
}

impl ConfidenceSolveConfig {
    /// Searches from zero up to contributing the whole target every month,
    /// which always reaches it when at least one month remains.
    pub fn for_input(input: &ProjectionInput, target_probability: f64, path_count: usize) -> Self {
        Self {
            target_probability,
            search_min: 0.0,
            search_max: input.target_amount.max(1.0),
            tolerance: 1.0,
            max_iterations: 40,
            path_count,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceSolveIteration {
    pub iteration: u32,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub candidate_value: f64,
    pub probability: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceSolveResult {
    pub target_probability: f64,
    pub months_to_target: u32,
    pub solved_contribution: Option<f64>,
    pub achieved_probability: Option<f64>,
    pub iterations: Vec<ConfidenceSolveIteration>,
    pub converged: bool,
    pub feasible: bool,
    pub message: String,
}

/// Bisects `monthly_contribution_average` for the smallest value whose
/// probability of reaching the target meets `target_probability`. Every
/// candidate reuses the seed of `input`, so all candidates face the same
/// draws and the probability is monotone in the contribution.
pub fn solve_contribution_for_confidence(
    input: &ProjectionInput,
    today: NaiveDate,
    config: ConfidenceSolveConfig,
) -> Result<ConfidenceSolveResult> {
    validate_input(input)?;
    validate_config(config)?;
    let Some(n) = months_to_target(input, today)? else {
        return Err(ProjectionError::InvalidSolveConfig(
            "targetAmount and targetDate are required".to_string(),
        ));
    };

    let seed = derive_seed(input);
    let evaluate = |candidate: f64| {
        let mut candidate_input = input.clone();
        candidate_input.monthly_contribution_average = candidate.max(0.0);
        let ensemble = simulate_paths(&candidate_input, seed, config.path_count);
        probability_to_target(&ensemble, n, input.target_amount)
    };
    let meets = |probability: f64| probability + 1e-12 >= config.target_probability;

    let mut iterations = Vec::with_capacity(config.max_iterations as usize);
    let mut solved_value = None;
    let mut converged = false;
    let feasible;
    let message;

    if meets(evaluate(config.search_min)) {
        solved_value = Some(config.search_min);
        converged = true;
        feasible = true;
        message = "Already meets target confidence at lower contribution bound.".to_string();
    } else if !meets(evaluate(config.search_max)) {
        feasible = false;
        message = "No feasible contribution found within the search bounds.".to_string();
    } else {
        let mut lo = config.search_min;
        let mut hi = config.search_max;
        let mut it = 0;
        while it < config.max_iterations {
            it += 1;
            let mid = (lo + hi) * 0.5;
            let probability = evaluate(mid);
            iterations.push(ConfidenceSolveIteration {
                iteration: it,
                lower_bound: lo,
                upper_bound: hi,
                candidate_value: mid,
                probability,
            });

            if meets(probability) {
                hi = mid;
            } else {
                lo = mid;
            }

            if (hi - lo).abs() <= config.tolerance {
                converged = true;
                break;
            }
        }
        solved_value = Some(hi);
        feasible = true;
        message = if converged {
            "Solved contribution for target confidence.".to_string()
        } else {
            "Reached max iterations before tolerance was met; returning best estimate.".to_string()
        };
    }

    Ok(ConfidenceSolveResult {
        target_probability: config.target_probability,
        months_to_target: n as u32,
        solved_contribution: solved_value,
        achieved_probability: solved_value.map(&evaluate),
        iterations,
        converged,
        feasible,
        message,
    })
}

fn validate_config(config: ConfidenceSolveConfig) -> Result<()> {
    let invalid = |msg: &str| -> Result<()> {
        Err(ProjectionError::InvalidSolveConfig(msg.to_string()))
    };
    if !(config.target_probability > 0.0 && config.target_probability <= 1.0) {
        return invalid("targetProbability must be in (0, 1]");
    }
    if !config.search_min.is_finite() || !config.search_max.is_finite() {
        return invalid("search bounds must be finite");
    }
    if config.search_min < 0.0 {
        return invalid("searchMin must be >= 0");
    }
    if config.search_max <= config.search_min {
        return invalid("searchMax must be greater than searchMin");
    }
    if !config.tolerance.is_finite() || config.tolerance <= 0.0 {
        return invalid("tolerance must be > 0");
    }
    if config.max_iterations == 0 {
        return invalid("maxIterations must be > 0");
    }
    validate_path_count(config.path_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::engine::{deterministic_value_after, project_as_of};
    use proptest::prelude::{prop_assert, proptest};

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}, tolerance {tol}"
        );
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn today() -> NaiveDate {
        date(2025, 1, 15)
    }

    fn target_input() -> ProjectionInput {
        ProjectionInput {
            initial_amount: 20_000.0,
            monthly_contribution_average: 800.0,
            monthly_contribution_goal: 1_200.0,
            annual_return: 0.08,
            annual_volatility: 0.15,
            contribution_annual_growth: 0.0,
            horizon_years: 10,
            target_amount: 150_000.0,
            target_date: Some("2033-01-15".to_string()),
        }
    }

    #[test]
    fn parse_target_date_accepts_plain_and_rfc3339_dates() {
        assert_eq!(parse_target_date("2030-06-01").expect("plain"), date(2030, 6, 1));
        assert_eq!(
            parse_target_date("2030-06-01T12:30:00Z").expect("rfc3339"),
            date(2030, 6, 1)
        );
        assert_eq!(parse_target_date(" 2030-06-01 ").expect("trimmed"), date(2030, 6, 1));
        assert!(matches!(
            parse_target_date("01/06/2030"),
            Err(ProjectionError::InvalidTargetDate { .. })
        ));
        assert!(parse_target_date("2030-02-30").is_err());
    }

    #[test]
    fn blank_target_date_is_unset() {
        let mut input = target_input();
        input.target_date = Some("   ".to_string());
        assert_eq!(resolve_target_date(&input).expect("blank is fine"), None);
        assert_eq!(months_to_target(&input, today()).expect("blank is fine"), None);
    }

    #[test]
    fn months_between_uses_average_month_length() {
        assert_close(months_between(today(), date(2026, 1, 15)), 11.992, 0.001);
        assert_close(months_between(today(), date(2025, 1, 15)), 0.0, 1e-12);
        assert!(months_between(today(), date(2024, 1, 15)) < 0.0);
    }

    #[test]
    fn months_to_target_rounds_and_clamps() {
        let input = target_input();
        assert_eq!(months_to_target(&input, today()).expect("valid"), Some(96));

        let mut past = target_input();
        past.target_date = Some("2020-01-01".to_string());
        assert_eq!(months_to_target(&past, today()).expect("valid"), Some(0));

        let mut beyond = target_input();
        beyond.target_date = Some("2090-01-01".to_string());
        assert_eq!(months_to_target(&beyond, today()).expect("valid"), Some(120));

        let mut no_amount = target_input();
        no_amount.target_amount = 0.0;
        assert_eq!(months_to_target(&no_amount, today()).expect("valid"), None);
    }

    #[test]
    fn required_contribution_matches_zero_rate_division() {
        assert_close(required_monthly_contribution(1_000.0, 13_000.0, 0.0, 12), 1_000.0, 1e-9);
        assert_close(required_monthly_contribution(20_000.0, 10_000.0, 0.01, 24), 0.0, 1e-12);
        assert_close(required_monthly_contribution(2_000.0, 5_000.0, 0.01, 0), 3_000.0, 1e-12);
    }

    #[test]
    fn required_contribution_survives_total_loss_rate() {
        // Every month wipes the balance, so only the last deposit counts.
        let c = required_monthly_contribution(10_000.0, 5_000.0, -1.0, 6);
        assert_close(c, 5_000.0, 1e-9);
    }

    #[test]
    fn goal_outputs_are_omitted_without_target_date() {
        let mut input = target_input();
        input.target_date = None;
        let result = project_as_of(&input, 50, today()).expect("valid input");
        assert!(result.months_to_target.is_none());
        assert!(result.required_monthly_contribution.is_none());
        assert!(result.probability_to_target.is_none());
    }

    #[test]
    fn goal_outputs_are_present_with_target() {
        let result = project_as_of(&target_input(), 200, today()).expect("valid input");
        assert_eq!(result.months_to_target, Some(96));
        let probability = result.probability_to_target.expect("probability expected");
        assert!((0.0..=1.0).contains(&probability));
        let required = result
            .required_monthly_contribution
            .expect("required contribution expected");
        assert!(required > 0.0);
    }

    #[test]
    fn past_target_date_checks_initial_amount_only() {
        let mut input = target_input();
        input.target_date = Some("2000-01-01".to_string());

        let result = project_as_of(&input, 64, today()).expect("valid input");
        assert_eq!(result.months_to_target, Some(0));
        assert_eq!(result.probability_to_target, Some(0.0));

        input.initial_amount = input.target_amount;
        let result = project_as_of(&input, 64, today()).expect("valid input");
        assert_eq!(result.probability_to_target, Some(1.0));
        assert_eq!(result.required_monthly_contribution, Some(0.0));
    }

    #[test]
    fn zero_volatility_probability_is_all_or_nothing() {
        let mut input = target_input();
        input.annual_volatility = 0.0;
        let result = project_as_of(&input, 30, today()).expect("valid input");
        let reached = deterministic_value_after(&input, input.monthly_contribution_average, 96);
        let expected = if reached >= input.target_amount { 1.0 } else { 0.0 };
        assert_eq!(result.probability_to_target, Some(expected));
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(48))]

        #[test]
        fn prop_required_contribution_reaches_target_deterministically(
            initial in 0u32..100_000,
            target_delta in 1_000u32..2_000_000,
            return_bp in -2_000i32..2_500,
            months in 1usize..361
        ) {
            let input = ProjectionInput {
                initial_amount: initial as f64,
                monthly_contribution_average: 0.0,
                monthly_contribution_goal: 0.0,
                annual_return: return_bp as f64 / 10_000.0,
                annual_volatility: 0.0,
                contribution_annual_growth: 0.0,
                horizon_years: 30,
                target_amount: initial as f64 + target_delta as f64,
                target_date: None,
            };
            let rate = monthly_rate(input.annual_return);
            let required = required_monthly_contribution(
                input.initial_amount,
                input.target_amount,
                rate,
                months,
            );
            let reached = deterministic_value_after(&input, required, months);
            if required > 0.0 {
                let tol = 1e-6 * input.target_amount;
                prop_assert!((reached - input.target_amount).abs() <= tol);
            } else {
                prop_assert!(reached + 1e-6 >= input.target_amount);
            }
        }
    }

    #[test]
    fn confidence_solver_matches_closed_form_without_volatility() {
        let mut input = target_input();
        input.annual_volatility = 0.0;
        let config = ConfidenceSolveConfig::for_input(&input, 0.9, 20);

        let result =
            solve_contribution_for_confidence(&input, today(), config).expect("must solve");
        assert!(result.feasible);
        assert_eq!(result.months_to_target, 96);

        let closed_form = required_monthly_contribution(
            input.initial_amount,
            input.target_amount,
            monthly_rate(input.annual_return),
            96,
        );
        assert_close(
            result.solved_contribution.expect("value expected"),
            closed_form,
            config.tolerance + 1e-6,
        );
        assert_eq!(result.achieved_probability, Some(1.0));
    }

    #[test]
    fn confidence_solver_needs_more_for_higher_confidence() {
        let input = target_input();
        let low = solve_contribution_for_confidence(
            &input,
            today(),
            ConfidenceSolveConfig::for_input(&input, 0.5, 200),
        )
        .expect("must solve");
        let high = solve_contribution_for_confidence(
            &input,
            today(),
            ConfidenceSolveConfig::for_input(&input, 0.9, 200),
        )
        .expect("must solve");
        let low_value = low.solved_contribution.expect("value expected");
        let high_value = high.solved_contribution.expect("value expected");
        assert!(high_value + 1.0 >= low_value);
        assert!(high.achieved_probability.expect("probability expected") >= 0.9);
    }

    #[test]
    fn confidence_solver_reports_infeasible_when_no_time_left() {
        let mut input = target_input();
        input.target_date = Some("2000-01-01".to_string());
        let config = ConfidenceSolveConfig::for_input(&input, 0.9, 20);
        let result =
            solve_contribution_for_confidence(&input, today(), config).expect("must return");
        assert!(!result.feasible);
        assert!(result.solved_contribution.is_none());
        assert!(result.achieved_probability.is_none());
    }

    #[test]
    fn confidence_solver_rejects_bad_config_and_missing_target() {
        let input = target_input();
        let mut config = ConfidenceSolveConfig::for_input(&input, 0.9, 20);
        config.target_probability = 1.5;
        assert!(matches!(
            solve_contribution_for_confidence(&input, today(), config),
            Err(ProjectionError::InvalidSolveConfig(_))
        ));

        let mut config = ConfidenceSolveConfig::for_input(&input, 0.9, 20);
        config.search_max = -1.0;
        assert!(solve_contribution_for_confidence(&input, today(), config).is_err());

        let mut no_date = target_input();
        no_date.target_date = None;
        let config = ConfidenceSolveConfig::for_input(&no_date, 0.9, 20);
        assert!(matches!(
            solve_contribution_for_confidence(&no_date, today(), config),
            Err(ProjectionError::InvalidSolveConfig(_))
        ));
    }
}
