//! Cursor agent CLI backend
//!
//! Drives the `agent` command line tool: JSON output for ask and plan,
//! stream-json output for execute.

mod adapter;
mod output;

pub use adapter::CursorAdapter;
pub use output::NO_RESPONSE_TEXT;
