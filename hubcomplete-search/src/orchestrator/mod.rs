//! Search orchestrator: quota gate, cache lookup, remote fan-out, merge.
//!
//! This module turns a committed query into a ranked result list, combining
//! repository and user hits and degrading to the fallback catalog when the
//! live search cannot be used.

pub mod merge;
pub mod search;

pub use search::SearchOrchestrator;
