//! Enrollment: upload a short series of captures for one identity.

use crate::client::RecognitionClient;
use std::fmt::Display;
use std::time::Duration;

/// How many captures to take and how far apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnrollmentPlan {
    pub total: usize,
    pub interval: Duration,
}

impl Default for EnrollmentPlan {
    fn default() -> Self {
        Self {
            total: 5,
            interval: Duration::from_millis(1500),
        }
    }
}

/// Per-capture results of an enrollment run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct EnrollmentTally {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl EnrollmentTally {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    pub fn record(&mut self, ok: bool) {
        if ok {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }

    /// Successes needed for the run to count: half the captures, rounded up.
    pub fn required(&self) -> usize {
        self.total.div_ceil(2)
    }

    pub fn is_accepted(&self) -> bool {
        self.total > 0 && self.succeeded >= self.required()
    }

    /// Fraction of captures attempted so far, 0.0..=1.0.
    pub fn progress(&self) -> f32 {
        if self.total == 0 {
            return 1.0;
        }
        (self.succeeded + self.failed) as f32 / self.total as f32
    }
}

/// Capture and upload `plan.total` images for `identity_id`.
///
/// `capture` is called with the capture index and returns JPEG bytes. A
/// failed capture or upload counts against the run but does not stop it.
/// `on_progress` sees the tally after every attempt.
pub async fn run_enrollment<F, E, P>(
    client: &RecognitionClient,
    identity_id: &str,
    plan: EnrollmentPlan,
    mut capture: F,
    mut on_progress: P,
) -> EnrollmentTally
where
    F: FnMut(usize) -> Result<Vec<u8>, E>,
    E: Display,
    P: FnMut(&EnrollmentTally),
{
    let mut tally = EnrollmentTally::new(plan.total);

    for index in 0..plan.total {
        tokio::time::sleep(plan.interval).await;

        let jpeg = match capture(index) {
            Ok(jpeg) => jpeg,
            Err(e) => {
                tracing::warn!(index, error = %e, "enrollment capture failed");
                tally.record(false);
                on_progress(&tally);
                continue;
            }
        };

        let file_name = format!("{identity_id}_{index}.jpg");
        match client.enroll(identity_id, jpeg, &file_name).await {
            Ok(_) => {
                tracing::info!(index, total = plan.total, "enrollment image registered");
                tally.record(true);
            }
            Err(e) => {
                tracing::warn!(index, error = %e, "enrollment upload failed");
                tally.record(false);
            }
        }
        on_progress(&tally);
    }

    tracing::info!(
        succeeded = tally.succeeded,
        failed = tally.failed,
        accepted = tally.is_accepted(),
        "enrollment finished"
    );
    tally
}
