//! Deterministic, pure logic shared by the workflow engine.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod gate;
pub mod naming;
pub mod parse;
pub mod report;
pub mod scoring;
pub mod transitions;
pub mod types;
