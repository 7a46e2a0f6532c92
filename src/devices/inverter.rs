//! Grid-following inverter model: autonomous voltage-dependent controls,
//! apparent-power arbitration, and efficiency-map inversion.

use crate::curves::ControlCurve;
use crate::error::SimError;

/// Output priority used by the arbitration when no mandatory control mode
/// pins P or Q.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputPriority {
    /// Active power wins the remaining capacity (default).
    #[default]
    Watt,
    /// Reactive power wins the remaining capacity.
    Var,
    /// Both outputs pinned to the rated point at the configured power factor.
    PowerFactor,
}

/// Enabled control functions of an inverter.
///
/// Zero or more modes may be enabled simultaneously. Volt-Watt and the
/// static export limit are mandatory active-power modes; Volt-VAr and
/// constant power factor are mandatory reactive-power modes. Night mode
/// permits reactive output while the DC side is below cut-in.
#[derive(Debug, Clone, Default)]
pub struct InverterSettings {
    volt_watt: Option<ControlCurve>,
    volt_var: Option<ControlCurve>,
    export_limit: Option<f64>,
    power_factor: Option<f64>,
    /// Arbitration priority when no mandatory mode applies.
    pub output_priority: OutputPriority,
    night_mode: bool,
}

impl InverterSettings {
    /// Settings with every control mode disabled and night mode enabled.
    pub fn new() -> Self {
        Self {
            night_mode: true,
            ..Self::default()
        }
    }

    /// Enables the Volt-Watt active power limit.
    pub fn enable_volt_watt(&mut self, curve: ControlCurve) {
        self.volt_watt = Some(curve);
    }

    /// Enables the Volt-VAr reactive set-point.
    pub fn enable_volt_var(&mut self, curve: ControlCurve) {
        self.volt_var = Some(curve);
    }

    /// Enables the static export limit.
    ///
    /// `fraction` is a fraction of rated kVA in `(0, 1]`; the active export
    /// ceiling is `fraction * rated_kva`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the fraction is outside `(0, 1]`.
    pub fn enable_export_limit(&mut self, fraction: f64) -> Result<(), SimError> {
        if fraction <= 0.0 || fraction > 1.0 {
            return Err(SimError::configuration(
                "inverter.export_limit",
                "must be a fraction of rated kVA in (0, 1]",
            ));
        }
        self.export_limit = Some(fraction);
        Ok(())
    }

    /// Enables constant power factor operation.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `pf` is outside `(0, 1]`.
    pub fn enable_power_factor(&mut self, pf: f64) -> Result<(), SimError> {
        if pf <= 0.0 || pf > 1.0 {
            return Err(SimError::configuration(
                "inverter.power_factor",
                "must be in (0, 1]",
            ));
        }
        self.power_factor = Some(pf);
        Ok(())
    }

    /// Disables reactive output while the DC side is below cut-in.
    pub fn disable_night_mode(&mut self) {
        self.night_mode = false;
    }

    pub fn vw_enabled(&self) -> bool {
        self.volt_watt.is_some()
    }

    pub fn vv_enabled(&self) -> bool {
        self.volt_var.is_some()
    }

    pub fn el_enabled(&self) -> bool {
        self.export_limit.is_some()
    }

    pub fn pf_enabled(&self) -> bool {
        self.power_factor.is_some()
    }

    pub fn night_mode(&self) -> bool {
        self.night_mode
    }

    fn volt_watt_pu(&self, volt: f64) -> Option<f64> {
        self.volt_watt.as_ref().map(|c| c.evaluate(volt))
    }

    fn volt_var_pu(&self, volt: f64) -> Option<f64> {
        self.volt_var.as_ref().map(|c| c.evaluate(volt))
    }
}

/// Monotone bracketed bisection: returns `x` in `[lo, hi]` with
/// `f(x) ~= target` for non-decreasing `f`. Targets outside `[f(lo), f(hi)]`
/// return the nearest boundary instead of failing.
fn bisect_monotone(f: impl Fn(f64) -> f64, lo: f64, hi: f64, target: f64) -> f64 {
    const ITERATIONS: usize = 60;
    if target <= f(lo) {
        return lo;
    }
    if target >= f(hi) {
        return hi;
    }
    let (mut lo, mut hi) = (lo, hi);
    for _ in 0..ITERATIONS {
        let mid = 0.5 * (lo + hi);
        if f(mid) < target {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    0.5 * (lo + hi)
}

/// A PV-style grid inverter.
///
/// Converts a signed DC input to AC output at the grid port, applying the
/// efficiency map, the enabled control functions, and the apparent-power
/// rating. Operating status latches between the cut-in and cut-out
/// thresholds (percent of rated kVA).
#[derive(Debug, Clone)]
pub struct Inverter {
    /// Rated apparent power in kVA.
    pub rated_kva: f64,
    eff_curve: ControlCurve,
    cut_in_pct: f64,
    cut_out_pct: f64,
    settings: InverterSettings,
    on: bool,
    p_out: f64,
    q_out: f64,
}

impl Inverter {
    /// Creates an inverter.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a non-positive rating, a cut-in
    /// below the cut-out threshold, or an efficiency map that is not
    /// monotone non-decreasing with values in `(0, 1]`.
    pub fn new(
        rated_kva: f64,
        eff_curve: ControlCurve,
        cut_in_pct: f64,
        cut_out_pct: f64,
        settings: InverterSettings,
    ) -> Result<Self, SimError> {
        if rated_kva <= 0.0 {
            return Err(SimError::configuration("inverter.rated_kva", "must be > 0"));
        }
        if cut_in_pct < cut_out_pct {
            return Err(SimError::configuration(
                "inverter.cut_in",
                "must be >= cut_out",
            ));
        }
        if !eff_curve.is_monotone_non_decreasing() {
            return Err(SimError::configuration(
                "inverter.efficiency",
                "efficiency curve must be monotone non-decreasing",
            ));
        }
        let (eff_min, eff_max) = eff_curve.y_range();
        if eff_min <= 0.0 || eff_max > 1.0 {
            return Err(SimError::configuration(
                "inverter.efficiency",
                "efficiency values must be in (0, 1]",
            ));
        }
        Ok(Self {
            rated_kva,
            eff_curve,
            cut_in_pct,
            cut_out_pct,
            settings,
            on: false,
            p_out: 0.0,
            q_out: 0.0,
        })
    }

    /// Inverter with the default efficiency map and thresholds.
    pub fn with_defaults(rated_kva: f64, settings: InverterSettings) -> Result<Self, SimError> {
        Self::new(rated_kva, ControlCurve::efficiency_default(), 0.1, 0.1, settings)
    }

    /// Enabled control functions.
    pub fn settings(&self) -> &InverterSettings {
        &self.settings
    }

    /// Last recorded active power at the grid port (kW).
    pub fn p_out(&self) -> f64 {
        self.p_out
    }

    /// Last recorded reactive power at the grid port (kVAr).
    pub fn q_out(&self) -> f64 {
        self.q_out
    }

    pub(crate) fn set_output(&mut self, p: f64, q: f64) {
        self.p_out = p;
        self.q_out = q;
    }

    /// Conversion efficiency at the given DC input; the map is consulted at
    /// `min(p_dc / rated, 1)`.
    pub fn efficiency(&self, p_dc_kw: f64) -> f64 {
        self.eff_curve.evaluate((p_dc_kw / self.rated_kva).min(1.0))
    }

    /// Operating status for the given DC input, honouring the latch: once
    /// on, the inverter stays on until the input falls below cut-out.
    pub fn status(&self, p_dc_kw: f64) -> bool {
        let threshold = if self.on {
            self.cut_out_pct
        } else {
            self.cut_in_pct
        };
        p_dc_kw >= threshold * self.rated_kva / 100.0
    }

    fn refresh_status(&mut self, p_dc_kw: f64) {
        self.on = self.status(p_dc_kw);
    }

    /// Active power ceiling under the enabled mandatory modes (kW): the
    /// minimum over Volt-Watt, export limit and constant power factor, or
    /// the full rating when none is enabled.
    pub fn p_lim_kw(&self, volt: f64) -> f64 {
        let mut lim = self.rated_kva;
        if let Some(vw) = self.settings.volt_watt_pu(volt) {
            lim = lim.min(self.rated_kva * vw);
        }
        if let Some(el) = self.settings.export_limit {
            lim = lim.min(self.rated_kva * el);
        }
        if let Some(pf) = self.settings.power_factor {
            lim = lim.min(self.rated_kva * pf);
        }
        lim
    }

    /// Desired active power before apparent-power arbitration (kW).
    fn p_ac_desired(&self, p_dc_kw: f64, volt: f64) -> f64 {
        if !self.status(p_dc_kw) {
            return 0.0;
        }
        let p_ac = (p_dc_kw * self.efficiency(p_dc_kw)).min(self.rated_kva);
        p_ac.clamp(0.0, self.p_lim_kw(volt))
    }

    /// Desired reactive power before apparent-power arbitration (kVAr).
    fn q_ac_desired(&self, p_dc_kw: f64, volt: f64) -> f64 {
        if !self.status(p_dc_kw) && !self.settings.night_mode {
            return 0.0;
        }
        if let Some(pf) = self.settings.power_factor {
            return self.rated_kva * pf.acos().sin();
        }
        if let Some(vv) = self.settings.volt_var_pu(volt) {
            return self.rated_kva * vv;
        }
        0.0
    }

    /// Apparent-power arbitration of a desired operating point.
    fn arbitrate(&self, p_desired: f64, q_desired: f64) -> (f64, f64) {
        let s_desired = p_desired.hypot(q_desired);
        if s_desired <= self.rated_kva {
            return (p_desired, q_desired);
        }

        let mandatory_p = self.settings.vw_enabled() || self.settings.el_enabled();
        let mandatory_q = self.settings.vv_enabled() || self.settings.pf_enabled();

        if mandatory_p && mandatory_q {
            let scale = self.rated_kva / s_desired;
            (p_desired * scale, q_desired * scale)
        } else if mandatory_p {
            let q_max = (self.rated_kva.powi(2) - p_desired.powi(2)).max(0.0).sqrt();
            (p_desired, q_desired.clamp(-q_max, q_max))
        } else if mandatory_q {
            let p_max = (self.rated_kva.powi(2) - q_desired.powi(2)).max(0.0).sqrt();
            (p_desired.clamp(-p_max, p_max), q_desired)
        } else {
            match self.settings.output_priority {
                OutputPriority::Watt => {
                    let p = p_desired.clamp(-self.rated_kva, self.rated_kva);
                    let q_max = (self.rated_kva.powi(2) - p.powi(2)).max(0.0).sqrt();
                    (p, q_desired.clamp(-q_max, q_max))
                }
                OutputPriority::Var => {
                    let q = q_desired.clamp(-self.rated_kva, self.rated_kva);
                    let p_max = (self.rated_kva.powi(2) - q.powi(2)).max(0.0).sqrt();
                    (p_desired.clamp(-p_max, p_max), q)
                }
                OutputPriority::PowerFactor => {
                    // Pin to the rated point at the configured power factor
                    let pf = self.settings.power_factor.unwrap_or(1.0);
                    (self.rated_kva * pf, self.rated_kva * pf.acos().sin())
                }
            }
        }
    }

    /// Desired grid-port output for a DC input and terminal voltage, without
    /// recording it. Pure: used by the potential-output and battery dispatch
    /// helpers.
    pub fn desired_output(&self, p_dc_kw: f64, volt: f64) -> (f64, f64) {
        self.arbitrate(self.p_ac_desired(p_dc_kw, volt), self.q_ac_desired(p_dc_kw, volt))
    }

    /// Computes, records and returns the grid-port output `(p, q)` for a DC
    /// input and terminal voltage.
    pub fn output_power(&mut self, p_dc_kw: f64, volt: f64) -> (f64, f64) {
        self.refresh_status(p_dc_kw);
        let (p, q) = self.desired_output(p_dc_kw, volt);
        self.set_output(p, q);
        (p, q)
    }

    /// The DC input that produces the requested AC output, inverting
    /// `p_ac = p_dc * eff(p_dc)` by bisection.
    ///
    /// The bracket extends to `rated / eff(rated)` so that full rated output
    /// is reachable; requests beyond it clamp to the bracket boundary.
    pub fn dc_input_for_ac(&self, p_ac_kw: f64) -> f64 {
        let hi = self.rated_kva / self.eff_curve.last_y();
        bisect_monotone(|p_dc| p_dc * self.efficiency(p_dc), 0.0, hi, p_ac_kw)
    }

    /// The AC draw that delivers the requested DC power when charging from
    /// the grid, inverting `p_dc = p_ac * eff(p_ac)` by bisection on
    /// `[0, rated]`. Requests beyond the rating clamp to the boundary.
    pub fn ac_input_for_dc(&self, p_dc_kw: f64) -> f64 {
        bisect_monotone(|p_ac| p_ac * self.efficiency(p_ac), 0.0, self.rated_kva, p_dc_kw)
    }

    /// Largest DC input the inverter can convert without clipping (kW).
    pub fn max_dc_input_kw(&self) -> f64 {
        self.dc_input_for_ac(self.rated_kva)
    }

    /// Potential AC generation for a DC input, ignoring voltage-dependent
    /// limits: `min(p_dc * eff, rated)` while on, zero while off.
    pub fn potential_generation_kw(&self, p_dc_kw: f64) -> f64 {
        if !self.status(p_dc_kw) {
            return 0.0;
        }
        (p_dc_kw * self.efficiency(p_dc_kw)).min(self.rated_kva)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(rated_kva: f64) -> Inverter {
        Inverter::with_defaults(rated_kva, InverterSettings::new()).expect("valid inverter")
    }

    #[test]
    fn off_below_cut_in_with_night_mode_off() {
        let mut settings = InverterSettings::new();
        settings.disable_night_mode();
        let mut inv = Inverter::with_defaults(6.0, settings).expect("valid inverter");
        let (p, q) = inv.output_power(0.0, 1.0);
        assert_eq!((p, q), (0.0, 0.0));
    }

    #[test]
    fn night_mode_keeps_volt_var_alive() {
        let mut settings = InverterSettings::new();
        settings.enable_volt_var(ControlCurve::volt_var_default());
        let mut inv = Inverter::with_defaults(6.0, settings).expect("valid inverter");
        // DC side dark, voltage high: still absorbing VArs
        let (p, q) = inv.output_power(0.0, 1.1);
        assert_eq!(p, 0.0);
        assert!((q - 6.0 * -0.6).abs() < 1e-9);
    }

    #[test]
    fn status_latch_holds_between_thresholds() {
        let mut settings = InverterSettings::new();
        settings.disable_night_mode();
        let mut inv =
            Inverter::new(6.0, ControlCurve::efficiency_default(), 2.0, 1.0, settings)
                .expect("valid inverter");
        // cut-in 2% of 6 kVA = 0.12 kW, cut-out 1% = 0.06 kW
        assert!(!inv.status(0.1));
        inv.output_power(0.2, 1.0);
        assert!(inv.status(0.1)); // latched on, above cut-out
        inv.output_power(0.05, 1.0);
        assert!(!inv.status(0.1)); // dropped below cut-out, latch released
    }

    #[test]
    fn rejects_cut_in_below_cut_out() {
        let err = Inverter::new(
            6.0,
            ControlCurve::efficiency_default(),
            0.1,
            0.5,
            InverterSettings::new(),
        );
        assert!(err.is_err());
    }

    #[test]
    fn rejects_non_monotone_efficiency() {
        let curve = ControlCurve::new(vec![0.1, 0.5, 1.0], vec![0.9, 0.95, 0.8]).expect("curve");
        assert!(Inverter::new(6.0, curve, 0.1, 0.1, InverterSettings::new()).is_err());
    }

    #[test]
    fn clips_to_rating_without_controls() {
        // 7.2 kW DC at eff(1.0) = 0.97 wants 6.984 kW through a 5 kVA unit
        let mut inv = plain(5.0);
        let (p, q) = inv.output_power(7.2, 1.0);
        assert_eq!(p, 5.0);
        assert_eq!(q, 0.0);
    }

    #[test]
    fn volt_watt_limits_active_power() {
        let mut settings = InverterSettings::new();
        settings.enable_volt_watt(ControlCurve::volt_watt_default());
        let mut inv = Inverter::with_defaults(5.0, settings).expect("valid inverter");
        // VoltWatt(1.085) = 0.6, ceiling 3.0 kW
        let (p, _) = inv.output_power(7.2, 1.085);
        assert!((p - 3.0).abs() < 1e-9);
    }

    #[test]
    fn export_limit_is_fraction_of_rating() {
        let mut settings = InverterSettings::new();
        settings.enable_export_limit(0.5).expect("valid fraction");
        let mut inv = Inverter::with_defaults(6.0, settings).expect("valid inverter");
        let (p, _) = inv.output_power(7.2, 1.0);
        assert!((p - 3.0).abs() < 1e-9);
    }

    #[test]
    fn export_limit_rejects_values_above_one() {
        let mut settings = InverterSettings::new();
        assert!(settings.enable_export_limit(1.5).is_err());
    }

    #[test]
    fn constant_pf_sets_reactive() {
        let mut settings = InverterSettings::new();
        settings.enable_power_factor(0.9).expect("valid pf");
        let mut inv = Inverter::with_defaults(6.0, settings).expect("valid inverter");
        let (p, q) = inv.output_power(3.0, 1.0);
        assert!((q - 6.0 * 0.9_f64.acos().sin()).abs() < 1e-9);
        assert!(p <= 6.0 * 0.9 + 1e-9);
    }

    #[test]
    fn arbitration_accepts_exact_rating() {
        let inv = plain(5.0);
        let (p, q) = inv.arbitrate(3.0, 4.0);
        assert_eq!((p, q), (3.0, 4.0));
    }

    #[test]
    fn arbitration_scales_when_both_mandatory() {
        let mut settings = InverterSettings::new();
        settings.enable_volt_watt(ControlCurve::volt_watt_default());
        settings.enable_volt_var(ControlCurve::volt_var_default());
        let inv = Inverter::with_defaults(5.0, settings).expect("valid inverter");
        let (p, q) = inv.arbitrate(4.0, 4.0);
        let s = p.hypot(q);
        assert!((s - 5.0).abs() < 1e-9);
        // Proportional scaling preserves the P/Q ratio
        assert!((p - q).abs() < 1e-9);
    }

    #[test]
    fn arbitration_keeps_mandatory_p_and_trims_q() {
        let mut settings = InverterSettings::new();
        settings.enable_volt_watt(ControlCurve::volt_watt_default());
        let inv = Inverter::with_defaults(5.0, settings).expect("valid inverter");
        let (p, q) = inv.arbitrate(4.0, 4.0);
        assert_eq!(p, 4.0);
        assert!((q - 3.0).abs() < 1e-9);
    }

    #[test]
    fn arbitration_keeps_mandatory_q_and_trims_p() {
        let mut settings = InverterSettings::new();
        settings.enable_volt_var(ControlCurve::volt_var_default());
        let inv = Inverter::with_defaults(5.0, settings).expect("valid inverter");
        let (p, q) = inv.arbitrate(4.0, 4.0);
        assert_eq!(q, 4.0);
        assert!((p - 3.0).abs() < 1e-9);
    }

    #[test]
    fn arbitration_watt_priority_without_mandatory_modes() {
        let inv = plain(5.0);
        let (p, q) = inv.arbitrate(4.5, 4.0);
        assert_eq!(p, 4.5);
        assert!(p.hypot(q) <= 5.0 + 1e-9);
    }

    #[test]
    fn dc_inversion_reaches_rated_output() {
        let inv = plain(5.0);
        let p_dc = inv.dc_input_for_ac(5.0);
        // Rated AC needs 5 / 0.97 = 5.155 kW DC
        assert!((p_dc - 5.0 / 0.97).abs() < 1e-6);
        assert!((p_dc * inv.efficiency(p_dc) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn dc_inversion_clamps_beyond_bracket() {
        let inv = plain(5.0);
        let p_dc = inv.dc_input_for_ac(20.0);
        assert!((p_dc - 5.0 / 0.97).abs() < 1e-9);
    }

    #[test]
    fn ac_inversion_round_trips() {
        let inv = plain(6.0);
        let p_ac = inv.ac_input_for_dc(4.0);
        assert!((p_ac * inv.efficiency(p_ac) - 4.0).abs() < 1e-6);
    }

    #[test]
    fn potential_generation_caps_at_rating() {
        let inv = plain(5.0);
        assert_eq!(inv.potential_generation_kw(7.2), 5.0);
        assert!((inv.potential_generation_kw(2.0) - 2.0 * inv.efficiency(2.0)).abs() < 1e-9);
    }
}
