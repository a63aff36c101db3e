// Observability: logging and run metrics

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
