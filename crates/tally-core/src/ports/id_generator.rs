//! IdGenerator port: ULID generation behind a trait.
//!
//! Generation goes through a [`Clock`] so tests with a pinned clock get
//! deterministic timestamp halves; the random half still differs per call.

use ulid::Ulid;

use crate::domain::{CorrelationKey, ReportId};
use crate::ports::Clock;

pub trait IdGenerator: Send + Sync {
    fn report_id(&self) -> ReportId;

    fn correlation_key(&self) -> CorrelationKey;
}

/// ULID-based generator driven by a clock.
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn report_id(&self) -> ReportId {
        ReportId::from_ulid(self.next())
    }

    fn correlation_key(&self) -> CorrelationKey {
        CorrelationKey::from_ulid(self.next())
    }
}
