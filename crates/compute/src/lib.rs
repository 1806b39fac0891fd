pub mod aggregate;
pub mod archive;
pub mod engine;
pub mod error;
pub mod materialize;
pub mod scheduler;
pub mod source;
pub mod stats;

pub use aggregate::AggregateReport;
pub use engine::{CommandEngine, Engine};
pub use error::{
    AggregationError, ConfigError, InputError, InvocationError, ItemError, ParseError,
    SampleLogError, SamplingError,
};
pub use materialize::DerivedConfig;
pub use scheduler::{IncompleteRow, ResultsTable, RunMetrics, RunReport, Sampler, WorkQueue};
pub use source::JobSource;
