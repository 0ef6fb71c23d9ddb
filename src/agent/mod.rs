//! Agent invocation.
//!
//! This module is the layer between the orchestrator and the external coding
//! agent:
//!
//! - **[`AgentBackend`]** - the abstract invoke / invoke-streaming capability.
//! - **[`CursorAdapter`]** - the backend driving the Cursor `agent` CLI.
//! - **[`ProcessRunner`]** - one subprocess per invocation, incremental output,
//!   wall-clock timeout with process-group kill.
//! - **[`InvocationBridge`]** - hard deadlines, error mapping and the lazy
//!   [`ProgressStream`] used by execute.
//! - **[`prompt`]** - default framing of ask, plan and execute prompts.
//!
//! # Example
//!
//! ```rust,ignore
//! use shikigami::agent::{BridgeTimeouts, CursorAdapter, InvocationBridge, InvocationMode};
//!
//! let bridge = InvocationBridge::new(Arc::new(CursorAdapter::new()), BridgeTimeouts::default());
//! let result = bridge.invoke(prompt, project_dir, InvocationMode::Ask, None).await?;
//! ```

mod backend;
mod bridge;
mod cursor;
mod process;
pub mod prompt;

pub use backend::{
    AgentBackend, AgentChunk, AgentResult, InvocationError, InvocationMode, InvocationRequest,
};
pub use bridge::{BridgeTimeouts, EXECUTE_DONE_TEXT, InvocationBridge, ProgressStream};
pub use cursor::{CursorAdapter, NO_RESPONSE_TEXT};
pub use process::{
    CommandSpec, OutputLine, OutputSource, ProcessRunner, RunOutcome, RunStatus, find_executable,
};
