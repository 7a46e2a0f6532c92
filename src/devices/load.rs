//! Passive load CER.

use crate::devices::types::CerContext;

/// A passive load drawing its scheduled demand at a fixed power factor.
///
/// Demand is always non-negative; reactive demand follows from the power
/// factor as `q = p * tan(acos(pf))`.
#[derive(Debug, Clone)]
pub struct Load {
    demand_kw: f64,
    power_factor: f64,
    volt_pu: f64,
    p_in: f64,
    q_in: f64,
}

impl Load {
    /// Creates a load with no demand scheduled yet.
    pub fn new() -> Self {
        Self {
            demand_kw: 0.0,
            power_factor: 0.95,
            volt_pu: 1.0,
            p_in: 0.0,
            q_in: 0.0,
        }
    }

    /// Loads exogenous inputs; no circuit side-effects.
    pub fn update(&mut self, ctx: &CerContext) {
        self.demand_kw = ctx.demand_kw.max(0.0);
        self.power_factor = ctx.power_factor;
        self.volt_pu = ctx.volt_pu;
    }

    /// Evaluates demand for the stored inputs, returning `(p_in, q_in)`.
    pub fn step(&mut self) -> (f64, f64) {
        self.p_in = self.demand_kw;
        self.q_in = self.demand_kw * self.power_factor.acos().tan();
        (self.p_in, self.q_in)
    }

    /// Active power drawn (kW, >= 0).
    pub fn p_in(&self) -> f64 {
        self.p_in
    }

    /// Reactive power drawn (kVAr).
    pub fn q_in(&self) -> f64 {
        self.q_in
    }

    /// Last terminal voltage seen (pu).
    pub fn volt_pu(&self) -> f64 {
        self.volt_pu
    }
}

impl Default for Load {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reactive_follows_power_factor() {
        let mut load = Load::new();
        load.update(&CerContext::for_load(0, 1.0, 0.95, 1.0));
        let (p, q) = load.step();
        assert_eq!(p, 1.0);
        // tan(acos(0.95)) = 0.3287
        assert!((q - 0.328_684).abs() < 1e-4);
    }

    #[test]
    fn unity_power_factor_draws_no_vars() {
        let mut load = Load::new();
        load.update(&CerContext::for_load(0, 2.0, 1.0, 1.0));
        let (_, q) = load.step();
        assert!(q.abs() < 1e-9);
    }

    #[test]
    fn negative_demand_clamped_to_zero() {
        let mut load = Load::new();
        load.update(&CerContext::for_load(0, -1.0, 0.95, 1.0));
        let (p, q) = load.step();
        assert_eq!(p, 0.0);
        assert_eq!(q, 0.0);
    }

    #[test]
    fn repeated_step_is_idempotent() {
        let mut load = Load::new();
        load.update(&CerContext::for_load(0, 1.5, 0.9, 1.0));
        let first = load.step();
        let second = load.step();
        assert_eq!(first, second);
    }
}
