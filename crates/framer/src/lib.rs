//! This crate reassembles fixed-header messages out of an arbitrarily chunked byte stream.
//!
//! Every message on the wire is a header of a fixed, per-stream length followed by a body whose length is derived
//! from the header.  The crate doesn't know what the header means: a [FrameSink] computes body lengths and receives
//! completed messages, and [Parser] does the bookkeeping of splitting reads into messages.
//!
//! This is sans-io.  Feed it bytes as they come off the network in whatever size pieces the network hands out.
//! [TypeLengthHeader] is one ready-made header layout, a kind byte plus a big-endian body length, for callers that
//! don't need anything fancier.
mod header;
mod parser;

pub use header::*;
pub use parser::*;
