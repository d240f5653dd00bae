//! Agent runtime - streaming completion orchestration over CRM data
//!
//! This crate provides the conversational core of parley:
//! - Opens one streaming completion per user turn (`completion`)
//! - Declares the function-call contract the model may invoke (`registry`)
//! - Dispatches declared calls against the CRM gateway (`handlers`)
//! - Advances the conversation transcript and the UI projection in lockstep
//!   (`session`)
//!
//! # Architecture
//!
//! A turn is a constrained loop:
//! 1. The user message is appended to the transcript and a placeholder
//!    fragment is opened.
//! 2. One streaming request goes out with the full history and the declared
//!    function specs at temperature 0.
//! 3. The event stream resolves through exactly one of two channels: text
//!    deltas that render live and freeze into an assistant turn, or a single
//!    function call that is validated, executed against the gateway, and
//!    frozen into a function turn.
//!
//! # Safety Principle
//!
//! The model only ever selects from the declared function set. Unknown names
//! and malformed arguments are rejected before any gateway call is made.

pub mod completion;
pub mod handlers;
pub mod prompt;
pub mod registry;
pub mod session;
