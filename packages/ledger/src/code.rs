//! Six-digit redemption codes
//!
//! Codes are drawn from `000000..=999999` and only have to be unambiguous
//! among currently active redemptions. The storage backend enforces that with
//! a unique index; the check here is a pre-filter that keeps constraint
//! violations rare.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::Serialize;

use crate::error::LedgerError;
use crate::store::StoreError;

pub const CODE_LEN: usize = 6;
const CODE_SPACE: u32 = 1_000_000;
const SEPARATORS: [char; 5] = ['-', ' ', '.', '_', '/'];

/// Process-local counters. Telemetry only, nothing reads them for decisions.
#[derive(Debug, Default)]
pub struct CodeStats {
    attempts: AtomicU64,
    collisions: AtomicU64,
    exhausted: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CodeStatsSnapshot {
    pub attempts: u64,
    pub collisions: u64,
    pub exhausted: u64,
}

impl CodeStatsSnapshot {
    pub fn collision_rate(&self) -> f64 {
        if self.attempts == 0 {
            return 0.0;
        }
        self.collisions as f64 / self.attempts as f64
    }
}

impl CodeStats {
    pub fn snapshot(&self) -> CodeStatsSnapshot {
        CodeStatsSnapshot {
            attempts: self.attempts.load(Ordering::Relaxed),
            collisions: self.collisions.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.attempts.store(0, Ordering::Relaxed);
        self.collisions.store(0, Ordering::Relaxed);
        self.exhausted.store(0, Ordering::Relaxed);
    }

    fn record_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("redemption_code_attempts_total").increment(1);
    }

    fn record_collision(&self) {
        self.collisions.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("redemption_code_collisions_total").increment(1);
    }

    fn record_exhausted(&self) {
        self.exhausted.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("redemption_code_exhausted_total").increment(1);
    }
}

#[derive(Debug)]
pub struct CodeGenerator {
    rng: Mutex<StdRng>,
    max_attempts: u32,
    stats: CodeStats,
}

impl CodeGenerator {
    pub fn new(max_attempts: u32) -> Self {
        Self::from_rng(StdRng::from_os_rng(), max_attempts)
    }

    /// Deterministic draw sequence, for tests and replay.
    pub fn with_seed(max_attempts: u32, seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed), max_attempts)
    }

    fn from_rng(rng: StdRng, max_attempts: u32) -> Self {
        Self {
            rng: Mutex::new(rng),
            max_attempts: max_attempts.max(1),
            stats: CodeStats::default(),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn stats(&self) -> &CodeStats {
        &self.stats
    }

    /// Pure draw, no collision check.
    pub fn generate(&self) -> String {
        let n = self.rng.lock().random_range(0..CODE_SPACE);
        format!("{n:06}")
    }

    /// Fresh budget of `max_attempts` draws for one activation.
    pub fn budget(&self) -> AttemptBudget {
        AttemptBudget {
            used: 0,
            max: self.max_attempts,
        }
    }

    /// Draws until `is_active` reports a code free, at most `max_attempts` times.
    pub async fn generate_unique<F, Fut>(&self, is_active: F) -> Result<String, LedgerError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<bool, StoreError>>,
    {
        let mut budget = self.budget();
        self.generate_within(&mut budget, is_active).await
    }

    /// Like [`generate_unique`](Self::generate_unique), but spends from a
    /// budget the caller keeps across insert retries.
    pub async fn generate_within<F, Fut>(
        &self,
        budget: &mut AttemptBudget,
        mut is_active: F,
    ) -> Result<String, LedgerError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<bool, StoreError>>,
    {
        while budget.used < budget.max {
            budget.used += 1;
            let code = self.generate();
            self.stats.record_attempt();

            if !is_active(code.clone()).await? {
                return Ok(code);
            }

            self.stats.record_collision();
            tracing::debug!(attempt = budget.used, "Redemption code collided with an active code");
        }

        self.stats.record_exhausted();
        tracing::error!(attempts = budget.max, "Redemption code generation exhausted");
        Err(LedgerError::CollisionExhausted {
            attempts: budget.max,
        })
    }

    /// The store rejected an insert because the code went active in the meantime.
    /// The draw already counted against the budget.
    pub fn note_insert_conflict(&self) {
        self.stats.record_collision();
    }
}

/// Draws spent by one activation. Probe collisions and insert conflicts
/// both consume it.
#[derive(Debug, Clone, Copy)]
pub struct AttemptBudget {
    used: u32,
    max: u32,
}

impl AttemptBudget {
    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn remaining(&self) -> u32 {
        self.max - self.used
    }
}

/// Strips display separators and checks the remainder is six digits.
pub fn normalize(presented: &str) -> Result<String, LedgerError> {
    let code: String = presented
        .trim()
        .chars()
        .filter(|c| !SEPARATORS.contains(c))
        .collect();

    if code.len() != CODE_LEN || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(LedgerError::InvalidFormat(presented.to_string()));
    }

    Ok(code)
}

/// `394750` -> `394-750`
pub fn display(code: &str) -> String {
    if code.len() != CODE_LEN || !code.is_ascii() {
        return code.to_string();
    }
    format!("{}-{}", &code[..3], &code[3..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_is_six_digits() {
        let generator = CodeGenerator::new(10);
        for _ in 0..500 {
            let code = generator.generate();
            assert_eq!(code.len(), CODE_LEN);
            assert!(code.bytes().all(|b| b.is_ascii_digit()));
        }
    }

    #[test]
    fn test_seeded_generators_agree() {
        let a = CodeGenerator::with_seed(10, 42);
        let b = CodeGenerator::with_seed(10, 42);
        for _ in 0..20 {
            assert_eq!(a.generate(), b.generate());
        }
    }

    #[test]
    fn test_normalize_strips_separators() {
        assert_eq!(normalize("394-750").unwrap(), "394750");
        assert_eq!(normalize(" 394 750 ").unwrap(), "394750");
        assert_eq!(normalize("39.47.50").unwrap(), "394750");
        assert_eq!(normalize("000001").unwrap(), "000001");
    }

    #[test]
    fn test_normalize_rejects_malformed() {
        for bad in ["", "12345", "1234567", "12a456", "A12345", "394–750", "３９４７５０"] {
            assert!(
                matches!(normalize(bad), Err(LedgerError::InvalidFormat(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(display("394750"), "394-750");
        assert_eq!(display("12"), "12");
    }

    #[tokio::test]
    async fn test_generate_unique_skips_active_codes() {
        let twin = CodeGenerator::with_seed(10, 7);
        let taken = twin.generate();

        let generator = CodeGenerator::with_seed(10, 7);
        let code = generator
            .generate_unique(|candidate| {
                let hit = candidate == taken;
                async move { Ok(hit) }
            })
            .await
            .unwrap();

        assert_ne!(code, taken);
        let stats = generator.stats().snapshot();
        assert_eq!(stats.attempts, 2);
        assert_eq!(stats.collisions, 1);
        assert_eq!(stats.exhausted, 0);
    }

    #[tokio::test]
    async fn test_generate_unique_exhausts() {
        let generator = CodeGenerator::with_seed(4, 1);
        let err = generator
            .generate_unique(|_| async { Ok(true) })
            .await
            .unwrap_err();

        assert!(matches!(err, LedgerError::CollisionExhausted { attempts: 4 }));
        assert!(err.is_retryable());
        let stats = generator.stats().snapshot();
        assert_eq!(stats.attempts, 4);
        assert_eq!(stats.collisions, 4);
        assert_eq!(stats.exhausted, 1);

        generator.stats().reset();
        assert_eq!(generator.stats().snapshot(), CodeStatsSnapshot::default());
    }

    #[tokio::test]
    async fn test_generate_unique_propagates_store_errors() {
        let generator = CodeGenerator::with_seed(3, 1);
        let err = generator
            .generate_unique(|_| async { Err(StoreError::Connection("refused".into())) })
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Storage(_)));
    }

    #[tokio::test]
    async fn test_budget_carries_across_calls() {
        let generator = CodeGenerator::with_seed(3, 9);
        let mut budget = generator.budget();

        generator
            .generate_within(&mut budget, |_| async { Ok(false) })
            .await
            .unwrap();
        generator.note_insert_conflict();
        assert_eq!(budget.remaining(), 2);

        let err = generator
            .generate_within(&mut budget, |_| async { Ok(true) })
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::CollisionExhausted { attempts: 3 }));
        assert_eq!(budget.used(), 3);

        let stats = generator.stats().snapshot();
        assert_eq!(stats.attempts, 3);
        assert_eq!(stats.collisions, 3);
        assert_eq!(stats.exhausted, 1);
    }
}
