//! Side-effecting collaborators: config, processes, reasoning, storage, tests.

pub mod config;
pub mod process;
pub mod prompt;
pub mod reasoning;
pub mod sandbox;
pub mod snapshot;
pub mod storage;
