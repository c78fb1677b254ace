mod boundary_logger;
mod trace_context;

pub use boundary_logger::{BoundaryLogger, Timer};
pub use trace_context::{TraceContext, TRACE_HEADER};
