use glam::Vec3;
use serde::Deserialize;

/// Hazards a vehicle can run into. Every hazard maps onto exactly one status effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HazardKind {
    Bolt,
    Banana,
    Flatten,
    Dart,
    Booster,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEffectKind {
    SpinOut,
    Launch,
    Flatten,
    Boost,
    Shrink,
}

impl From<HazardKind> for StatusEffectKind {
    fn from(hazard: HazardKind) -> Self {
        match hazard {
            HazardKind::Bolt => StatusEffectKind::Shrink,
            HazardKind::Banana => StatusEffectKind::SpinOut,
            HazardKind::Flatten => StatusEffectKind::Flatten,
            HazardKind::Dart => StatusEffectKind::Launch,
            HazardKind::Booster => StatusEffectKind::Boost,
        }
    }
}

/// * `spin_speed` - (deg/s) Forced yaw rate while spun out
/// * `spin_duration` - (s) Duration of a spin-out
/// * `launch_speed` - (m/s) Forced upward displacement rate while launched
/// * `launch_duration` - (s) Duration of a launch
/// * `flatten_duration` - (s) Duration of a flatten, motion is disabled meanwhile
/// * `flatten_scale` - Body scale while flattened
/// * `flatten_avatar_scale` - Avatar scale while flattened
/// * `boost_amount` - Additive speed coefficient per active boost
/// * `boost_duration` - (s) Duration of a single boost
/// * `shrink_scale` - Body and avatar scale while shrunk
/// * `shrink_speed_factor` - Multiplier on the throttle force while shrunk
/// * `shrink_duration` - (s) Duration of a shrink
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EffectPars {
    pub spin_speed: f32,
    pub spin_duration: f64,
    pub launch_speed: f32,
    pub launch_duration: f64,
    pub flatten_duration: f64,
    pub flatten_scale: [f32; 3],
    pub flatten_avatar_scale: f32,
    pub boost_amount: f32,
    pub boost_duration: f64,
    pub shrink_scale: f32,
    pub shrink_speed_factor: f32,
    pub shrink_duration: f64,
}

impl Default for EffectPars {
    fn default() -> Self {
        EffectPars {
            spin_speed: 5.0,
            spin_duration: 5.0,
            launch_speed: 5.0,
            launch_duration: 5.0,
            flatten_duration: 5.0,
            flatten_scale: [1.0, 0.05, 1.0],
            flatten_avatar_scale: 0.05,
            boost_amount: 10.0,
            boost_duration: 5.0,
            shrink_scale: 0.1,
            shrink_speed_factor: 0.1,
            shrink_duration: 10.0,
        }
    }
}

impl EffectPars {
    /// duration_and_magnitude returns how long an effect of the given kind lasts and the value it
    /// carries (rate, speed factor or boost amount).
    pub fn duration_and_magnitude(&self, kind: StatusEffectKind) -> (f64, f32) {
        match kind {
            StatusEffectKind::SpinOut => (self.spin_duration, self.spin_speed),
            StatusEffectKind::Launch => (self.launch_duration, self.launch_speed),
            StatusEffectKind::Flatten => (self.flatten_duration, 0.0),
            StatusEffectKind::Boost => (self.boost_duration, self.boost_amount),
            StatusEffectKind::Shrink => (self.shrink_duration, self.shrink_speed_factor),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusEffect {
    pub kind: StatusEffectKind,
    pub expires_at: f64,
    pub magnitude: f32,
}

/// ActiveEffects is the set of timed status effects of one vehicle. Boosts stack, every other
/// kind exists at most once and re-applying it extends its expiry.
#[derive(Debug, Clone, Default)]
pub struct ActiveEffects {
    effects: Vec<StatusEffect>,
}

impl ActiveEffects {
    pub fn apply(&mut self, kind: StatusEffectKind, now: f64, duration: f64, magnitude: f32) {
        let expires_at = now + duration;

        if kind != StatusEffectKind::Boost {
            if let Some(effect) = self.effects.iter_mut().find(|e| e.kind == kind) {
                effect.expires_at = effect.expires_at.max(expires_at);
                effect.magnitude = magnitude;
                return;
            }
        }

        self.effects.push(StatusEffect {
            kind,
            expires_at,
            magnitude,
        });
    }

    pub fn apply_hazard(
        &mut self,
        hazard: HazardKind,
        now: f64,
        pars: &EffectPars,
    ) -> StatusEffectKind {
        let kind = StatusEffectKind::from(hazard);
        let (duration, magnitude) = pars.duration_and_magnitude(kind);
        self.apply(kind, now, duration, magnitude);
        kind
    }

    /// sweep removes all effects that expired at `now` and returns their kinds. A kind is only
    /// reported once it has no remaining instance.
    pub fn sweep(&mut self, now: f64) -> Vec<StatusEffectKind> {
        let mut expired: Vec<StatusEffectKind> = vec![];
        self.effects.retain(|e| {
            if now >= e.expires_at {
                if !expired.contains(&e.kind) {
                    expired.push(e.kind);
                }
                false
            } else {
                true
            }
        });
        expired.retain(|kind| !self.is_active(*kind));
        expired
    }

    pub fn is_active(&self, kind: StatusEffectKind) -> bool {
        self.effects.iter().any(|e| e.kind == kind)
    }

    pub fn magnitude(&self, kind: StatusEffectKind) -> Option<f32> {
        self.effects
            .iter()
            .find(|e| e.kind == kind)
            .map(|e| e.magnitude)
    }

    pub fn boost_total(&self) -> f32 {
        self.effects
            .iter()
            .filter(|e| e.kind == StatusEffectKind::Boost)
            .map(|e| e.magnitude)
            .sum()
    }

    pub fn speed_factor(&self) -> f32 {
        self.magnitude(StatusEffectKind::Shrink).unwrap_or(1.0)
    }

    pub fn body_scale(&self, pars: &EffectPars) -> Vec3 {
        let mut scale = Vec3::ONE;
        if self.is_active(StatusEffectKind::Flatten) {
            scale *= Vec3::from(pars.flatten_scale);
        }
        if self.is_active(StatusEffectKind::Shrink) {
            scale *= pars.shrink_scale;
        }
        scale
    }

    pub fn avatar_scale(&self, pars: &EffectPars) -> f32 {
        let mut scale = 1.0;
        if self.is_active(StatusEffectKind::Flatten) {
            scale *= pars.flatten_avatar_scale;
        }
        if self.is_active(StatusEffectKind::Shrink) {
            scale *= pars.shrink_scale;
        }
        scale
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    pub fn clear(&mut self) {
        self.effects.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    #[test]
    fn boosts_stack_and_expire_separately() {
        let pars = EffectPars::default();
        let mut effects = ActiveEffects::default();
        effects.apply_hazard(HazardKind::Booster, 0.0, &pars);
        effects.apply_hazard(HazardKind::Booster, 2.0, &pars);
        assert_relative_eq!(effects.boost_total(), 20.0);

        assert!(effects.sweep(5.0).is_empty());
        assert_relative_eq!(effects.boost_total(), 10.0);

        assert_eq!(effects.sweep(7.0), vec![StatusEffectKind::Boost]);
        assert_relative_eq!(effects.boost_total(), 0.0);
    }

    #[test]
    fn reapplying_extends_expiry() {
        let pars = EffectPars::default();
        let mut effects = ActiveEffects::default();
        effects.apply_hazard(HazardKind::Banana, 0.0, &pars);
        effects.apply_hazard(HazardKind::Banana, 3.0, &pars);
        assert_eq!(effects.effects.len(), 1);
        assert!(effects.sweep(5.0).is_empty());
        assert!(effects.is_active(StatusEffectKind::SpinOut));
        assert_eq!(effects.sweep(8.0), vec![StatusEffectKind::SpinOut]);
    }

    #[test]
    fn shrink_and_flatten_scales() {
        let pars = EffectPars::default();
        let mut effects = ActiveEffects::default();
        assert_relative_eq!(effects.speed_factor(), 1.0);

        effects.apply_hazard(HazardKind::Bolt, 0.0, &pars);
        assert_relative_eq!(effects.speed_factor(), 0.1);
        assert_relative_eq!(effects.avatar_scale(&pars), 0.1);

        effects.apply_hazard(HazardKind::Flatten, 0.0, &pars);
        let scale = effects.body_scale(&pars);
        assert_abs_diff_eq!(scale.y, 0.005, epsilon = 1e-6);
        assert_abs_diff_eq!(scale.x, 0.1, epsilon = 1e-6);

        effects.clear();
        assert_eq!(effects.body_scale(&pars), Vec3::ONE);
    }
}
