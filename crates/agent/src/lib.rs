//! The DeskPilot agent: a ReAct loop over a streamed, text-protocol model.
//!
//! Each run alternates model steps and tool observations:
//!
//! 1. **Stream** a step from the model gateway
//! 2. **Guard** against repeated steps and model-written observations
//! 3. **Parse** the step for `Action:` / `Action Input:`
//! 4. **Dispatch** the tool call and feed the observation back
//! 5. **Finish** when a step carries no action, then clean up the answer
//!
//! See [`controller::ReactController`] for the loop itself, and
//! [`branches`] for saving and rewinding conversation state.

pub mod branches;
pub mod controller;
pub mod mailbox;
pub mod parser;
pub mod postprocess;
pub mod prompt;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use branches::{Branch, BranchError, BranchStore, BranchSummary};
pub use controller::{ReactController, RunOutcome, StopReason};
pub use mailbox::Mailbox;
pub use parser::{extract_json_object, parse_tool_call};
