//! Cost tracking and budget enforcement.
//!
//! The ledger is a monotonic accumulator: records are append-only and the
//! total is never rolled back, even by the call that crosses the ceiling.
//! The crossing itself is reported exactly once; later additions keep
//! accumulating silently and the round driver refuses to start another
//! round while [`CostLedger::is_exhausted`] holds.
//!
//! Per-call amounts come from a [`CostPolicy`]. The stock [`FlatRate`]
//! policy is a placeholder constant; callers wire a real (e.g. token-based)
//! policy when the generator reports usage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default flat-rate charge per generator call, in dollars.
pub const DEFAULT_FLAT_RATE: f64 = 0.001;

/// The ledger total crossed the configured ceiling.
#[derive(Debug, Clone, Error)]
#[error("budget exceeded: ${total:.2} >= ${ceiling:.2}")]
pub struct BudgetExceeded {
    /// Ledger total after the crossing addition.
    pub total: f64,
    /// Configured ceiling.
    pub ceiling: f64,
}

/// Record of a single cost transaction, append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostRecord {
    /// When the cost was incurred.
    pub timestamp: DateTime<Utc>,

    /// Role that incurred the cost (empty for setup-level charges).
    pub role: String,

    /// Action tag that incurred the cost.
    pub action: String,

    /// Amount in dollars.
    pub amount: f64,

    /// Freeform description.
    pub description: String,
}

/// Cost-estimation policy for generator calls.
pub trait CostPolicy: Send + Sync {
    /// Estimate the dollar cost of one call from its prompt and response.
    fn estimate(&self, prompt: &str, response: &str) -> f64;
}

/// Flat-rate policy: every call costs the same fixed amount.
///
/// This is the stock placeholder; the amount carries no meaning beyond
/// making budget enforcement observable.
#[derive(Debug, Clone, Copy)]
pub struct FlatRate(pub f64);

impl Default for FlatRate {
    fn default() -> Self {
        Self(DEFAULT_FLAT_RATE)
    }
}

impl CostPolicy for FlatRate {
    fn estimate(&self, _prompt: &str, _response: &str) -> f64 {
        self.0
    }
}

/// Monotonic cost accumulator with a hard ceiling.
///
/// A ceiling of `0.0` means unlimited.
#[derive(Debug, Default)]
pub struct CostLedger {
    total: f64,
    ceiling: f64,
    records: Vec<CostRecord>,
    crossing_reported: bool,
}

impl CostLedger {
    /// Create a ledger with the given ceiling (`0.0` = unlimited).
    pub fn new(ceiling: f64) -> Self {
        Self {
            ceiling,
            ..Self::default()
        }
    }

    /// Running total of all recorded amounts.
    pub fn total(&self) -> f64 {
        self.total
    }

    /// Configured ceiling (`0.0` = unlimited).
    pub fn ceiling(&self) -> f64 {
        self.ceiling
    }

    /// Replace the ceiling. Used by `Team::invest` and recovery.
    pub fn set_ceiling(&mut self, ceiling: f64) {
        self.ceiling = ceiling;
    }

    /// Remaining budget, or `f64::INFINITY` when unlimited.
    pub fn remaining(&self) -> f64 {
        if self.ceiling <= 0.0 {
            f64::INFINITY
        } else {
            (self.ceiling - self.total).max(0.0)
        }
    }

    /// Whether the total has reached the ceiling.
    pub fn is_exhausted(&self) -> bool {
        self.ceiling > 0.0 && self.total >= self.ceiling
    }

    /// All recorded transactions, in order.
    pub fn records(&self) -> &[CostRecord] {
        &self.records
    }

    /// Restore a running total from a recovered snapshot. The individual
    /// records behind the total are not persisted and stay empty.
    pub fn restore_total(&mut self, total: f64) {
        self.total = total;
        self.crossing_reported = self.is_exhausted();
    }

    /// Append a cost and check the ceiling.
    ///
    /// The amount is recorded unconditionally (no rollback). If this
    /// addition is the one that crosses the ceiling, returns
    /// [`BudgetExceeded`]; every later addition returns `Ok` and callers
    /// rely on [`Self::is_exhausted`] instead.
    pub fn add_cost(
        &mut self,
        amount: f64,
        role: impl Into<String>,
        action: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<(), BudgetExceeded> {
        self.total += amount;
        self.records.push(CostRecord {
            timestamp: Utc::now(),
            role: role.into(),
            action: action.into(),
            amount,
            description: description.into(),
        });

        if self.is_exhausted() && !self.crossing_reported {
            self.crossing_reported = true;
            return Err(BudgetExceeded {
                total: self.total,
                ceiling: self.ceiling,
            });
        }
        Ok(())
    }
}
