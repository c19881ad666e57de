//! Integration test suite for orc.
//!
//! These tests drive tasks through workflows end to end with a scripted
//! phase runner, and verify that the scheduler, planner, gate broker,
//! event broadcaster and stores work together correctly.
//!
//! # Test Categories
//!
//! - `scheduler_e2e`: Full runs from first phase to completion
//! - `resume`: Picking a task back up after a pause or failure
//! - `concurrency`: One run per task, many tasks at once
//! - `cancellation`: Interrupting runs and gate waits
//! - `gates`: Human, auto and skip gates
//! - `retry`: Same-phase and cross-phase retries
//! - `projects`: Multi-project store cache and the JSON file store
//! - `recovery`: Store write failures and orphaned runs
//!
//! # CI Compatibility
//!
//! No agent is ever invoked; every phase goes through the scripted runner.

mod fixtures;

mod cancellation;
mod concurrency;
mod resume;
mod retry;
mod scheduler_e2e;
