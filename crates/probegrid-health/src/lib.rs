//! probegrid-health — one bounded health probe and its response parser.
//!
//! # Architecture
//!
//! ```text
//! probe(port, options)
//!   ├── http_get() → ProbeResponse (status + raw body)
//!   └── ProbeResponse::into_outcome()
//!       ├── parser::parse() → HealthSnapshot
//!       └── Classification
//! ```
//!
//! The probe only talks to `127.0.0.1:<port>`; reaching the instance is
//! the tunnel's job. The raw body is kept on every path so a caller can
//! fall back to it when parsing fails.

pub mod parser;
pub mod probe;

pub use parser::{ParseError, parse};
pub use probe::{ProbeError, ProbeOptions, ProbeOutcome, ProbeResponse, http_get, probe};
