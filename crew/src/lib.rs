//! Self-correcting multi-stage code generation workflow.
//!
//! A requirement flows through a fixed pipeline of reasoning stages
//! (requirement analysis, architecture design, code generation, review, test
//! generation), then a bounded loop improves artifacts that fail the quality
//! gate until they pass or the iteration budget runs out.
//!
//! - **[`core`]**: Pure, deterministic logic (parsing, scoring, gating,
//!   transitions, reports). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting collaborators (config, reasoning service,
//!   artifact storage, test sandbox, snapshots). Traits at these seams let
//!   tests substitute scripted implementations.
//! - **[`stages`]**: One handler per pipeline stage, each limited to a fixed
//!   operation table.
//!
//! [`engine`] coordinates the stages; [`interactive`] backs the CLI session.

pub mod core;
pub mod engine;
pub mod exit_codes;
pub mod interactive;
pub mod io;
pub mod logging;
pub mod stages;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
