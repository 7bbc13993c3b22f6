//! Priority-key policies
//!
//! A policy is a pure function from [`SchedAttrs`] to a [`PriorityKey`];
//! lower keys run first. The ready set never knows which policy produced
//! its keys, so adding a policy means adding one [`KeyPolicy`] impl.
//!
//! The active policy is chosen once, at engine construction, and resolved
//! to a plain function pointer ([`KeyFn`]). The dispatch path calls through
//! that pointer and never matches on [`PolicyKind`].

use crate::attributes::SchedAttrs;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Totally ordered priority key
///
/// Stored as an exact fraction `num / den` so that weighted keys compare
/// without rounding: `1000/300` and `2000/600` are equal, and fall through
/// to the ready-order tie-break instead of being split by float error.
/// The numerator is signed (laxity can be negative). Any numerator is
/// accepted; comparison never overflows.
#[derive(Clone, Copy)]
pub struct PriorityKey {
    num: i128,
    den: u32,
}

impl PriorityKey {
    /// An integral key
    pub const fn from_int(value: i128) -> Self {
        Self { num: value, den: 1 }
    }

    /// `num / den`; a zero denominator is treated as 1
    pub const fn ratio(num: i128, den: u32) -> Self {
        Self {
            num,
            den: if den == 0 { 1 } else { den },
        }
    }

    /// Numerator as stored
    pub const fn numerator(&self) -> i128 {
        self.num
    }

    /// Denominator as stored (never zero)
    pub const fn denominator(&self) -> u32 {
        self.den
    }

    /// Approximate scalar value, for logging and reports
    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

impl PartialEq for PriorityKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PriorityKey {}

impl PartialOrd for PriorityKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PriorityKey {
    fn cmp(&self, other: &Self) -> Ordering {
        let (lden, rden) = (self.den as i128, other.den as i128);
        // Whole parts first, then the fractional remainders, which are
        // below 2^32 so their cross products fit.
        let (lq, lr) = (self.num.div_euclid(lden), self.num.rem_euclid(lden));
        let (rq, rr) = (other.num.div_euclid(rden), other.num.rem_euclid(rden));
        lq.cmp(&rq).then_with(|| (lr * rden).cmp(&(rr * lden)))
    }
}

impl fmt::Debug for PriorityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "PriorityKey({})", self.num)
        } else {
            write!(f, "PriorityKey({}/{})", self.num, self.den)
        }
    }
}

impl fmt::Display for PriorityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.as_f64())
    }
}

/// Key function resolved from the active policy
pub type KeyFn = fn(&SchedAttrs) -> PriorityKey;

/// A ranking policy
pub trait KeyPolicy {
    /// Name used in logs and configuration
    const NAME: &'static str;

    /// Computes the key of a thread; lower runs first
    fn key(attrs: &SchedAttrs) -> PriorityKey;
}

/// Plain earliest deadline first: key = deadline
#[derive(Debug, Clone, Copy, Default)]
pub struct Edf;

impl KeyPolicy for Edf {
    const NAME: &'static str = "EDF";

    fn key(attrs: &SchedAttrs) -> PriorityKey {
        PriorityKey::from_int(attrs.deadline as i128)
    }
}

/// Weighted EDF: key = deadline / weight
#[derive(Debug, Clone, Copy, Default)]
pub struct WeightedEdf;

impl KeyPolicy for WeightedEdf {
    const NAME: &'static str = "Weighted EDF";

    fn key(attrs: &SchedAttrs) -> PriorityKey {
        PriorityKey::ratio(attrs.deadline as i128, attrs.weight.get())
    }
}

/// Weighted shortest remaining time: key = time_left / weight
#[derive(Debug, Clone, Copy, Default)]
pub struct Wsrt;

impl KeyPolicy for Wsrt {
    const NAME: &'static str = "WSRT";

    fn key(attrs: &SchedAttrs) -> PriorityKey {
        PriorityKey::ratio(attrs.time_left as i128, attrs.weight.get())
    }
}

/// Rate-monotonic proxy: key = expected execution time
///
/// Ranks by execution time, not by period; periods are not tracked by the
/// attribute store.
#[derive(Debug, Clone, Copy, Default)]
pub struct Rms;

impl KeyPolicy for Rms {
    const NAME: &'static str = "RMS";

    fn key(attrs: &SchedAttrs) -> PriorityKey {
        PriorityKey::from_int(attrs.exec_time as i128)
    }
}

/// Least laxity first: key = deadline - time_left
///
/// True laxity also subtracts `now`, which is the same for every ready
/// thread; dropping it keeps cached keys comparable across ticks. Use
/// [`SchedAttrs::laxity`] for the actual slack.
#[derive(Debug, Clone, Copy, Default)]
pub struct Llf;

impl KeyPolicy for Llf {
    const NAME: &'static str = "LLF";

    fn key(attrs: &SchedAttrs) -> PriorityKey {
        PriorityKey::from_int(attrs.deadline as i128 - attrs.time_left as i128)
    }
}

/// Proportional fair: key = runtime / weight (virtual runtime)
#[derive(Debug, Clone, Copy, Default)]
pub struct Pfs;

impl KeyPolicy for Pfs {
    const NAME: &'static str = "PFS";

    fn key(attrs: &SchedAttrs) -> PriorityKey {
        PriorityKey::ratio(attrs.runtime as i128, attrs.weight.get())
    }
}

/// Selectable policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    Edf,
    #[default]
    WeightedEdf,
    Wsrt,
    Rms,
    Llf,
    Pfs,
}

impl PolicyKind {
    /// Every policy, in declaration order
    pub const ALL: [PolicyKind; 6] = [
        PolicyKind::Edf,
        PolicyKind::WeightedEdf,
        PolicyKind::Wsrt,
        PolicyKind::Rms,
        PolicyKind::Llf,
        PolicyKind::Pfs,
    ];

    /// Resolves the policy to its key function
    pub fn key_fn(self) -> KeyFn {
        match self {
            PolicyKind::Edf => Edf::key,
            PolicyKind::WeightedEdf => WeightedEdf::key,
            PolicyKind::Wsrt => Wsrt::key,
            PolicyKind::Rms => Rms::key,
            PolicyKind::Llf => Llf::key,
            PolicyKind::Pfs => Pfs::key,
        }
    }

    /// Human-readable policy name
    pub const fn name(self) -> &'static str {
        match self {
            PolicyKind::Edf => Edf::NAME,
            PolicyKind::WeightedEdf => WeightedEdf::NAME,
            PolicyKind::Wsrt => Wsrt::NAME,
            PolicyKind::Rms => Rms::NAME,
            PolicyKind::Llf => Llf::NAME,
            PolicyKind::Pfs => Pfs::NAME,
        }
    }

    /// Computes a key under this policy
    pub fn key(self, attrs: &SchedAttrs) -> PriorityKey {
        (self.key_fn())(attrs)
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(deadline: u64, weight: u32, exec: u64) -> SchedAttrs {
        SchedAttrs::new(deadline, weight, exec)
    }

    #[test]
    fn test_key_ratio_exact_equality() {
        assert_eq!(PriorityKey::ratio(1000, 300), PriorityKey::ratio(2000, 600));
        assert!(PriorityKey::ratio(1000, 300) < PriorityKey::ratio(1000, 200));
    }

    #[test]
    fn test_key_negative_ordering() {
        assert!(PriorityKey::from_int(-5) < PriorityKey::from_int(0));
        assert!(PriorityKey::ratio(-10, 3) < PriorityKey::ratio(-1, 1));
    }

    #[test]
    fn test_key_extreme_numerators_compare_without_overflow() {
        let huge = PriorityKey::from_int(i128::MAX / 2);
        assert!(huge > PriorityKey::ratio(1, 3));
        assert!(PriorityKey::from_int(i128::MIN) < PriorityKey::ratio(-1, u32::MAX));
        assert!(PriorityKey::ratio(i128::MAX, u32::MAX) < PriorityKey::from_int(i128::MAX));
        assert_eq!(
            PriorityKey::ratio(i128::MAX - 1, 2),
            PriorityKey::ratio((i128::MAX - 1) / 2, 1)
        );
        assert!(PriorityKey::ratio(-7, 2) < PriorityKey::ratio(-10, 3));
    }

    #[test]
    fn test_key_zero_denominator_treated_as_one() {
        let key = PriorityKey::ratio(42, 0);
        assert_eq!(key.denominator(), 1);
        assert_eq!(key, PriorityKey::from_int(42));
    }

    #[test]
    fn test_weighted_edf_keys() {
        let keys: Vec<f64> = [300, 200, 100]
            .iter()
            .map(|&w| WeightedEdf::key(&attrs(1000, w, 10)).as_f64())
            .collect();
        assert!((keys[0] - 3.333).abs() < 0.01);
        assert_eq!(keys[1], 5.0);
        assert_eq!(keys[2], 10.0);
    }

    #[test]
    fn test_equal_weights_degrade_to_edf() {
        let a = attrs(100, 4, 10);
        let b = attrs(200, 4, 10);
        assert_eq!(
            WeightedEdf::key(&a).cmp(&WeightedEdf::key(&b)),
            Edf::key(&a).cmp(&Edf::key(&b))
        );
    }

    #[test]
    fn test_wsrt_key_uses_time_left() {
        let a = attrs(0, 300, 500).with_time_left(100);
        assert_eq!(Wsrt::key(&a), PriorityKey::ratio(1, 3));
    }

    #[test]
    fn test_rms_ranks_by_exec_time() {
        assert!(Rms::key(&attrs(9999, 1, 10)) < Rms::key(&attrs(1, 1, 20)));
    }

    #[test]
    fn test_llf_key() {
        let urgent = attrs(100, 1, 95);
        let normal = attrs(200, 1, 150);
        let slack = attrs(300, 1, 200);
        assert_eq!(Llf::key(&urgent), PriorityKey::from_int(5));
        assert!(Llf::key(&urgent) < Llf::key(&normal));
        assert!(Llf::key(&normal) < Llf::key(&slack));
    }

    #[test]
    fn test_llf_key_negative_without_wrap() {
        let late = attrs(10, 1, 50);
        assert_eq!(Llf::key(&late), PriorityKey::from_int(-40));
    }

    #[test]
    fn test_pfs_key_is_virtual_runtime() {
        let heavy = attrs(0, 4, 10).with_runtime(400);
        let light = attrs(0, 1, 10).with_runtime(150);
        assert_eq!(Pfs::key(&heavy), PriorityKey::from_int(100));
        assert!(Pfs::key(&heavy) < Pfs::key(&light));
    }

    #[test]
    fn test_policy_kind_resolves_key_fn() {
        let a = attrs(1000, 200, 10);
        for kind in PolicyKind::ALL {
            assert_eq!(kind.key(&a), (kind.key_fn())(&a));
        }
        assert_eq!(PolicyKind::WeightedEdf.key(&a), PriorityKey::from_int(5));
    }

    #[test]
    fn test_policy_kind_serde_names() {
        let kind: PolicyKind = serde_json::from_str("\"weighted_edf\"").unwrap();
        assert_eq!(kind, PolicyKind::WeightedEdf);
        assert_eq!(serde_json::to_string(&PolicyKind::Llf).unwrap(), "\"llf\"");
    }
}
