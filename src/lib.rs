//! Shikigami - a local runner for a coding agent CLI
//!
//! A remote client drives the agent through four calls:
//!
//! 1. **ask** - read-only question about the project
//! 2. **plan** - generate an implementation plan
//! 3. **approve** - accept the current plan
//! 4. **execute** - run the approved plan; progress streams back as events
//!
//! The [`orchestrator::Orchestrator`] owns the job state machine and the
//! registry of jobs; the [`agent`] module runs the agent subprocess under a
//! hard timeout; the [`server`] module exposes everything over HTTP.

pub mod agent;
pub mod config;
pub mod domain;
pub mod job;
pub mod orchestrator;
pub mod server;

pub use domain::*;
