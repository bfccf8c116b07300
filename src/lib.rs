//! # dnsdiff
//!
//! A library for resolving one domain name against a set of independent DNS
//! servers concurrently and comparing the per-server outcomes. Divergent
//! answers across resolvers are the usual symptom of hijacking, cache
//! poisoning, or split routing; `dnsdiff` collects the raw evidence — one
//! resolved address, latency, or classified failure per server — and leaves
//! the judgement to the caller.
//!
//! ## What it does
//!
//! - Builds raw RFC 1035 A-record queries with random transaction ids and
//!   parses the responses itself — no system resolver involved, so every
//!   server in the list is measured on equal terms.
//! - Queries all servers at the same time over UDP, with a 2 second
//!   per-server read deadline and a 5 second batch deadline.
//! - Returns one result per server, in input order, always: a failing or
//!   silent server yields a classified error in its slot, never a missing
//!   entry or a failed batch.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dnsdiff::{QueryResult, resolve};
//!
//! #[tokio::main]
//! async fn main() {
//!     let servers = vec![
//!         "8.8.8.8".to_string(),
//!         "1.1.1.1".to_string(),
//!         "9.9.9.9".to_string(),
//!     ];
//!     let results: Vec<QueryResult> = resolve("example.org", &servers).await;
//!     for r in &results {
//!         match &r.outcome {
//!             Ok(ip) => println!("{:<20} {} ({:?})", r.server, ip, r.elapsed),
//!             Err(e) => println!("{:<20} error: {}", r.server, e),
//!         }
//!     }
//! }
//! ```
//!
//! ## Scope
//!
//! Only A records over plain UDP, and only the first answer of a response.
//! No CNAME chasing, no AAAA/MX/TXT, no EDNS, no retries, no TCP fallback,
//! no DNSSEC. Responses whose first answer is not the common
//! pointer-to-question shape are rejected as unsupported rather than
//! guessed at.
//!
//! Diagnostics are emitted through [`tracing`]; the library installs no
//! subscriber and owns no global state, so embedding applications keep full
//! control of their logging.

pub mod dns;

pub use dns::message::{DecodeError, DnsQuery, decode_answer};
pub use dns::resolver::{
    BATCH_TIMEOUT, QueryError, QueryResult, READ_TIMEOUT, normalize_server, resolve,
};
