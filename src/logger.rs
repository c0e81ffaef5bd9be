//! The line logger.
//!
//! Connects to the server like any other client and writes everything it sees.
//! Every line is tagged with the wall clock time its first byte arrived, the time since the
//! first line started and the time since the previous line started:
//!
//! ```text
//! [2024-03-01 13:37:00 12.345 0.020] some line from the device
//! ```

use std::{
    fmt::Display,
    path::Path,
    time::{Duration, Instant},
};

use chrono::{DateTime, Local};
use futures::{Stream, StreamExt};
use tokio::{
    fs::File,
    io::{AsyncRead, AsyncWriteExt},
    net::TcpStream,
};
use tokio_util::codec::FramedRead;
use tracing::info;

use crate::{error::Error, serial::codecs::lines::LinePiecesCodec};

/// The tag put in front of a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stamp {
    /// When the line was seen.
    pub wall: DateTime<Local>,

    /// Time since the first line.
    pub elapsed: Duration,

    /// Time since the previous line.
    pub delta: Duration,
}

impl Display for Stamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{} {:.3} {:.3}] ",
            self.wall.format("%Y-%m-%d %H:%M:%S"),
            self.elapsed.as_secs_f64(),
            self.delta.as_secs_f64()
        )
    }
}

/// Hands out [`Stamp`]s for consecutive lines.
#[derive(Debug, Default)]
pub struct LineStamper {
    base: Option<Instant>,
    previous: Duration,
}

impl LineStamper {
    /// No lines seen yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp a line seen at `now`.
    ///
    /// The first line defines time zero.
    pub fn stamp(&mut self, now: Instant, wall: DateTime<Local>) -> Stamp {
        let base = *self.base.get_or_insert(now);
        let elapsed = now.saturating_duration_since(base);
        let delta = elapsed.saturating_sub(self.previous);
        self.previous = elapsed;

        Stamp {
            wall,
            elapsed,
            delta,
        }
    }
}

/// Turn a byte stream into tagged output, ready to be written out.
///
/// Bytes are passed on as soon as they arrive, so a line is seen even before it ends
/// (a prompt, say). The tag goes in front of the first byte of every line and carries
/// the time that byte arrived.
///
/// Carriage returns are dropped.
pub fn tagged_output<R>(source: R) -> impl Stream<Item = Result<Vec<u8>, Error>>
where
    R: AsyncRead + Unpin,
{
    let codec = LinePiecesCodec::default();
    let mut stamper = LineStamper::new();
    let mut line_start = true;

    FramedRead::new(source, codec.clone()).map(move |piece| {
        let piece = piece?;

        let mut output = if line_start {
            stamper
                .stamp(Instant::now(), Local::now())
                .to_string()
                .into_bytes()
        } else {
            Vec::with_capacity(piece.len())
        };
        line_start = codec.ends_line(&piece);
        output.extend_from_slice(&piece);

        Ok(output)
    })
}

/// Connect to the server and log everything it sends to `path` and stdout,
/// until the server closes the connection.
///
/// Both are flushed whenever something arrived, so a crash loses nothing already received.
pub async fn run(host: &str, port: u16, path: &Path) -> Result<(), Error> {
    let mut file = File::create(path).await?;
    info!(?path, "Logging output");

    let stream = TcpStream::connect((host, port)).await?;
    info!(%host, %port, "Connected");
    info!("format: [date time elapsed delta] line");

    let mut stdout = tokio::io::stdout();
    let mut output = tagged_output(stream);
    let mut bytes = 0usize;

    while let Some(chunk) = output.next().await {
        let chunk = chunk?;

        stdout.write_all(&chunk).await?;
        stdout.flush().await?;

        file.write_all(&chunk).await?;
        file.flush().await?;

        bytes += chunk.len();
    }

    info!(bytes, "Server closed the connection");

    Ok(())
}
