//! Job management

mod artifacts;
mod publisher;
mod registry;

pub use artifacts::{ASK_FILE, ArtifactStore, LOGS_FILE, PLAN_FILE, RUN_FILE};
pub use publisher::{StatusSnapshot, Subscription};
pub use registry::{JobEntry, JobRegistry, RegistryConfig, SweepHandle};
