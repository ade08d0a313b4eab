use std::time::Duration;

/// Configuration for a single connection.
///
/// Build with [ConnectionConfigBuilder]; only `header_len` is required.
#[derive(Clone, Debug, derive_builder::Builder)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct ConnectionConfig {
    /// Length of every message header on this connection.  Fixed for the connection's lifetime and at least 1.
    header_len: usize,

    /// How many outbound buffers may wait to be written before [crate::Connection::send] starts failing.
    #[builder(default = "16")]
    send_queue_capacity: usize,

    /// Size of the scratch buffer reads land in.  Messages may be larger; this only bounds a single read.
    #[builder(default = "1024")]
    read_buffer_size: usize,

    /// After a close, pending reads and writes get this long before they are cut off.
    #[builder(default = "Duration::from_secs(1)")]
    close_grace: Duration,

    /// Largest body the delegate may ask for.  A header asking for more closes the connection.
    #[builder(default, setter(strip_option))]
    max_body_len: Option<usize>,
}

impl ConnectionConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.header_len == Some(0) {
            return Err("header_len must be at least 1".into());
        }

        if self.send_queue_capacity == Some(0) {
            return Err("send_queue_capacity must be at least 1".into());
        }

        if self.read_buffer_size == Some(0) {
            return Err("read_buffer_size must be at least 1".into());
        }

        Ok(())
    }
}

impl ConnectionConfig {
    /// A config with the given header length and defaults for everything else.
    pub fn with_header_len(header_len: usize) -> Result<ConnectionConfig, ConnectionConfigBuilderError> {
        ConnectionConfigBuilder::default().header_len(header_len).build()
    }

    pub fn header_len(&self) -> usize {
        self.header_len
    }

    pub fn send_queue_capacity(&self) -> usize {
        self.send_queue_capacity
    }

    pub fn read_buffer_size(&self) -> usize {
        self.read_buffer_size
    }

    pub fn close_grace(&self) -> Duration {
        self.close_grace
    }

    pub fn max_body_len(&self) -> Option<usize> {
        self.max_body_len
    }
}
