//! Host-facing command channel and stdio bridge for native UI shells.

pub mod channel;
pub mod contract;
pub mod handler;
pub mod stdio;
