//! CLI command implementations.

pub mod batch;
pub mod replay;

pub use batch::BatchCommand;
pub use replay::ReplayCommand;
