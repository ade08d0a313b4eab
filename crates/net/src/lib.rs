//! Per-connection message framing over tokio byte streams.
//!
//! A [Connection] owns a stream and runs two tasks: one reads the stream and splits it into `(header, body)` messages
//! which go to a [Delegate], the other drains a bounded queue of outbound buffers filled by [Connection::send].  The
//! [Acceptor] listens on TCP, filters and configures incoming connections, then starts them.
//!
//! This crate doesn't know what headers mean.  The delegate computes body lengths from headers, so the same machinery
//! works for any protocol whose messages start with a fixed-size header.
mod acceptor;
mod config;
mod connection;
mod deadline;
mod delegate;
mod error;
mod reading;
mod writing;

pub use acceptor::*;
pub use config::*;
pub use connection::*;
pub use delegate::*;
pub use error::*;
