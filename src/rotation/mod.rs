//! Automated secret rotation.
//!
//! The [`RotationScheduler`] registers recurring rotation jobs per secret
//! path (coarse daily/weekly/monthly/quarterly buckets) and runs on-demand
//! rotations, delegating the actual material changes to the
//! [`RotationExecutor`]. Three strategies are supported, all of which leave
//! the secret retrievable at every point in time:
//!
//! - **Immediate**: generate and overwrite in one step
//! - **Blue-green**: provision alongside the old value, verify, switch,
//!   delete the staging copy after a grace period
//! - **Gradual**: keep the previous value inside the record for a grace
//!   window, then purge it
//!
//! Rotations on the same path are mutually exclusive; different paths run
//! fully in parallel. A job that is `running` never aborts mid-flight: a
//! stuck-job sweep flags (but does not kill) jobs past the threshold.

pub mod executor;
pub mod job;
pub mod scheduler;

pub use executor::{RotationExecutor, RotationOutcome};
pub use job::{JobStatus, RotationInterval, RotationJob, RotationPolicy, RotationStrategy, SecretType};
pub use scheduler::RotationScheduler;
