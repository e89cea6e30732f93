//! Desired manager count
//!
//! The analyzer assumes the target is odd and within `[1, 9]`. Normalization
//! happens once, before any cycle runs:
//!
//! | requested | target | adjustment        |
//! |-----------|--------|-------------------|
//! | `<= 0`    | 3      | `Defaulted`       |
//! | even      | n + 1  | `RoundedUpToOdd`  |
//! | `> 9`     | 9      | `Clamped`         |
//! | 1         | 1      | `SingleManager`   |

use std::fmt;

use tracing::warn;

/// Default manager count when none (or a non-positive one) is requested
pub const DEFAULT_MANAGERS: u8 = 3;
/// Largest supported manager count
pub const MAX_MANAGERS: u8 = 9;

/// Why a requested manager count was changed or flagged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetAdjustment {
    /// Non-positive request replaced by the default
    Defaulted { requested: i64 },
    /// Even request bumped to the next odd value
    RoundedUpToOdd { requested: i64 },
    /// Request above the maximum
    Clamped { requested: i64 },
    /// A single manager is accepted but tolerates no failure
    SingleManager,
}

impl fmt::Display for TargetAdjustment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetAdjustment::Defaulted { requested } => {
                write!(f, "manager count {requested} is not positive, using {DEFAULT_MANAGERS}")
            }
            TargetAdjustment::RoundedUpToOdd { requested } => write!(
                f,
                "manager count {requested} is even, using {} to keep quorum odd",
                requested + 1
            ),
            TargetAdjustment::Clamped { requested } => {
                write!(f, "manager count {requested} exceeds {MAX_MANAGERS}, clamping")
            }
            TargetAdjustment::SingleManager => {
                write!(f, "a single manager provides no fault tolerance")
            }
        }
    }
}

/// Normalized desired number of managers: odd, within `[1, 9]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ManagerTarget(u8);

impl ManagerTarget {
    /// Normalize a requested count, logging any adjustment
    pub fn new(requested: i64) -> Self {
        let (target, adjustment) = Self::normalize(requested);
        if let Some(adjustment) = adjustment {
            warn!(requested, target = target.get(), "{adjustment}");
        }
        target
    }

    /// Normalize a requested count without side effects
    pub fn normalize(requested: i64) -> (Self, Option<TargetAdjustment>) {
        if requested <= 0 {
            return (
                Self(DEFAULT_MANAGERS),
                Some(TargetAdjustment::Defaulted { requested }),
            );
        }
        if requested > i64::from(MAX_MANAGERS) {
            return (Self(MAX_MANAGERS), Some(TargetAdjustment::Clamped { requested }));
        }
        // 1..=9 fits in u8
        let value = requested as u8;
        if value % 2 == 0 {
            return (
                Self(value + 1),
                Some(TargetAdjustment::RoundedUpToOdd { requested }),
            );
        }
        if value == 1 {
            return (Self(1), Some(TargetAdjustment::SingleManager));
        }
        (Self(value), None)
    }

    /// Target as a count
    pub fn get(&self) -> usize {
        usize::from(self.0)
    }
}

impl Default for ManagerTarget {
    fn default() -> Self {
        Self(DEFAULT_MANAGERS)
    }
}

impl fmt::Display for ManagerTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
