//! Line-oriented consumption of subprocess output.
//!
//! Each stream gets its own background task that reads lines until the
//! stream closes and then hands its consumer back through the join handle.

use std::borrow::Cow;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tracing::{info, warn, Instrument};

/// Something that accepts one line of output at a time
pub trait OutputConsumer: Send + 'static {
    fn consume(&mut self, line: &str);
}

/// Forwards each line to the log at `info`, prefixed
#[derive(Debug, Clone)]
pub struct LoggingConsumer {
    prefix: &'static str,
}

impl LoggingConsumer {
    pub fn new(prefix: &'static str) -> Self {
        Self { prefix }
    }

    pub fn stdout() -> Self {
        Self::new("<out> ")
    }

    pub fn stderr() -> Self {
        Self::new("<err> ")
    }
}

impl OutputConsumer for LoggingConsumer {
    fn consume(&mut self, line: &str) {
        info!("{}{}", self.prefix, line);
    }
}

/// Collects every line into an in-memory buffer
#[derive(Debug, Clone, Default)]
pub struct CapturingConsumer {
    buffer: String,
}

impl CapturingConsumer {
    pub fn output(&self) -> &str {
        &self.buffer
    }

    pub fn into_output(self) -> String {
        self.buffer
    }
}

impl OutputConsumer for CapturingConsumer {
    fn consume(&mut self, line: &str) {
        self.buffer.push_str(line);
        self.buffer.push('\n');
    }
}

/// Line without its terminator; invalid UTF-8 is replaced, not rejected
fn decode_line(raw: &[u8]) -> Cow<'_, str> {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw)
}

/// Spawn a task feeding `reader` into `consumer` line by line.
///
/// The task ends when the stream closes and yields the consumer.
pub fn drain<R, C>(reader: R, mut consumer: C) -> JoinHandle<C>
where
    R: AsyncRead + Unpin + Send + 'static,
    C: OutputConsumer,
{
    tokio::spawn(
        async move {
            let mut reader = BufReader::new(reader);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf).await {
                    Ok(0) => break,
                    Ok(_) => consumer.consume(&decode_line(&buf)),
                    Err(e) => {
                        warn!("Stopped reading process output: {}", e);
                        break;
                    }
                }
            }
            consumer
        }
        .in_current_span(),
    )
}
