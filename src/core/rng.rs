use std::f64::consts::PI;
use std::fmt::Write;

use super::types::ProjectionInput;

const FNV_OFFSET_BASIS: u32 = 2_166_136_261;
const FNV_PRIME: u32 = 16_777_619;
const MULBERRY_INCREMENT: u32 = 0x6D2B_79F5;
const U32_RANGE: f64 = 4_294_967_296.0;
const BOX_MULLER_EPSILON: f64 = 1e-12;

/// Renders every input field in a fixed order with fixed precision. Any change
/// here reseeds every stored scenario.
pub fn canonical_key(input: &ProjectionInput) -> String {
    let mut key = String::with_capacity(128);
    let _ = write!(
        key,
        "{:.6}|{:.6}|{:.6}|{:.8}|{:.8}|{:.8}|{}|{:.6}|{}",
        input.initial_amount,
        input.monthly_contribution_average,
        input.monthly_contribution_goal,
        input.annual_return,
        input.annual_volatility,
        input.contribution_annual_growth,
        input.horizon_years,
        input.target_amount,
        input.target_date.as_deref().unwrap_or(""),
    );
    key
}

pub fn derive_seed(input: &ProjectionInput) -> u32 {
    fnv1a_32(canonical_key(input).as_bytes())
}

fn fnv1a_32(bytes: &[u8]) -> u32 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, &byte| {
        (hash ^ byte as u32).wrapping_mul(FNV_PRIME)
    })
}

/// mulberry32: 32 bits of state, uniform output in [0, 1).
#[derive(Debug, Clone)]
pub struct Rng {
    state: u32,
}

impl Rng {
    pub fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    pub fn next_u32(&mut self) -> u32 {
        self.state = self.state.wrapping_add(MULBERRY_INCREMENT);
        let mut t = self.state;
        t = (t ^ (t >> 15)).wrapping_mul(t | 1);
        t ^= t.wrapping_add((t ^ (t >> 7)).wrapping_mul(t | 61));
        t ^ (t >> 14)
    }

    pub fn next_f64(&mut self) -> f64 {
        self.next_u32() as f64 / U32_RANGE
    }

    /// Box-Muller, cosine branch only. Always consumes exactly two uniforms;
    /// the sine companion is dropped so draw order never depends on call
    /// parity.
    pub fn standard_normal(&mut self) -> f64 {
        let u1 = self.next_f64().max(BOX_MULLER_EPSILON);
        let u2 = self.next_f64();
        (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
    }
}
