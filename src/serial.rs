/// The serial device as seen by the server loop.
pub mod channel;

/// Codecs for decoding byte streams.
pub mod codecs {
    /// Splitting a byte stream into lines.
    pub mod lines;
}

/// The largest chunk read from the serial device in one go.
pub const DEVICE_CHUNK_SIZE: usize = 1024;
