//! Services for aggregation, rendering and the report pipeline

pub mod aggregator;
pub mod pipeline;
pub mod renderer;

pub use aggregator::Aggregator;
pub use pipeline::{ReportOutcome, ReportPipeline};
pub use renderer::Renderer;
