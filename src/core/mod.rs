pub mod aircraft;
pub mod dedupe;
pub mod normalize;
pub mod orchestrator;
pub mod persist;
