//! # dnsdiff DNS Core
//!
//! The two building blocks of the comparison tool:
//!
//! - [`message`] — wire-format codec: encodes raw A-record queries and
//!   decodes the single-answer responses this client understands. Pure
//!   byte manipulation, no I/O.
//! - [`resolver`] — concurrent orchestration: fans one query per server out
//!   over UDP, bounds each read and the whole batch with deadlines, and
//!   returns per-server results aligned with the input order.
//!
//! The resolver depends on the codec; nothing here reads configuration,
//! renders output, or computes consensus across servers. Those concerns
//! belong to the caller (see the `dnsdiff-cli` workspace member).

pub mod message;
pub mod resolver;
