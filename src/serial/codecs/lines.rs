use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::error::Error;

/// Splits a byte stream into pieces of lines, as soon as the bytes arrive.
///
/// A piece never continues past a delimiter, and the delimiter stays at the end of the piece
/// it ends. So a piece ending in the delimiter finishes a line, and the next piece starts one.
/// Nothing is held back waiting for a line to complete.
///
/// Carriage returns are dropped wherever they appear.
#[derive(Debug, Clone)]
pub struct LinePiecesCodec {
    /// How to delimit incoming byte streams.
    /// This delimiter is included in the yielded frames.
    delimiter: u8,

    /// Bytes which never make it into a frame.
    strip: Option<u8>,
}

impl LinePiecesCodec {
    /// Create a new codec.
    pub fn new(delimiter: u8, strip: Option<u8>) -> Self {
        Self { delimiter, strip }
    }

    /// Whether this piece finishes a line.
    pub fn ends_line(&self, piece: &[u8]) -> bool {
        piece.last() == Some(&self.delimiter)
    }

    fn frame(&self, bytes: &[u8]) -> Vec<u8> {
        match self.strip {
            Some(strip) => bytes.iter().copied().filter(|&b| b != strip).collect(),
            None => bytes.to_vec(),
        }
    }
}

impl Default for LinePiecesCodec {
    fn default() -> Self {
        Self::new(b'\n', Some(b'\r'))
    }
}

impl Decoder for LinePiecesCodec {
    type Item = Vec<u8>;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Stripping may leave nothing of what was there, in that case try what follows.
        while !src.is_empty() {
            let end = match src.iter().position(|&byte| byte == self.delimiter) {
                Some(position) => position + 1,
                None => src.len(),
            };

            let piece = self.frame(&src.split_to(end));
            if !piece.is_empty() {
                return Ok(Some(piece));
            }
        }

        Ok(None)
    }
}
