/*!
 * Monitoring Module
 * Structured tracing setup and request spans
 */

pub mod tracer;

pub use tracer::{init_tracing, record_outcome, span_request, RequestSpan};
