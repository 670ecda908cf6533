mod engine;
mod error;
mod rng;
mod solver;
mod types;

pub use engine::{
    DEFAULT_PATH_COUNT, DeterministicProjection, MAX_HORIZON_YEARS, MAX_PATH_COUNT, PathEnsemble,
    aggregate_bands, deterministic_value_after, monthly_rate, nearest_rank, project,
    project_as_of, project_deterministic, simulate_paths, validate_input,
};
pub use error::{ProjectionError, Result};
pub use rng::{Rng, canonical_key, derive_seed};
pub use solver::{
    ConfidenceSolveConfig, ConfidenceSolveIteration, ConfidenceSolveResult, GoalOutcome,
    months_between, months_to_target, parse_target_date, probability_to_target,
    required_monthly_contribution, solve_contribution_for_confidence, solve_goal,
};
pub use types::{
    Composition, DeterministicPoint, PercentileBand, ProjectionInput, ProjectionResult,
};
