//! The sweep commands.

pub mod export;
pub mod inventory;
pub mod loadgen;
pub mod slots;
