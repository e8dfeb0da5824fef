//! Background workers.

pub mod token_sweeper;

pub use token_sweeper::{SweeperHandle, TokenSweeper};
