//! Review extraction engine: selector ladders, extraction, navigation and the per-product pipeline.

pub mod diagnostics;
pub mod extractor;
pub mod ladder;
pub mod models;
pub mod navigator;
pub mod pipeline;
pub mod selectors;

pub use diagnostics::DiagnosticsSink;
pub use extractor::ReviewExtractor;
pub use ladder::SelectorLadder;
pub use models::{ParseResult, ReviewRecord};
pub use navigator::{NavigationState, Navigator, Operator, StdinOperator};
pub use pipeline::ReviewPipeline;
