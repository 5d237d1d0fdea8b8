//! Request-scoped middleware: the dashboard session-cookie gate and the
//! observability sidecar's request timer.

pub mod metrics;
pub mod session_cookie;

pub use metrics::record_request_metrics;
pub use session_cookie::require_session;
