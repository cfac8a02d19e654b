//! Demultiplexing of a sandbox's combined output channel.
//!
//! With TTY disabled, the engine interleaves standard output and standard
//! error on one byte channel. Each frame is an 8-byte header followed by
//! the payload:
//!
//! ```text
//! [stream: u8][0u8; 3][length: u32 big-endian][payload; length]
//! ```
//!
//! Stream 1 is standard output, 2 is standard error. Stream 0 (stdin echo)
//! is routed to standard output, and stream 3 carries an engine-side error.

use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::EngineError;

/// Length of a frame header in bytes.
pub const HEADER_LEN: usize = 8;

/// Logical stream a frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl StreamKind {
    fn selector(self) -> u8 {
        match self {
            StreamKind::Stdout => 1,
            StreamKind::Stderr => 2,
        }
    }
}

/// One payload from the multiplexed channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub stream: StreamKind,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn stdout(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            stream: StreamKind::Stdout,
            payload: payload.into(),
        }
    }

    pub fn stderr(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            stream: StreamKind::Stderr,
            payload: payload.into(),
        }
    }

    /// Encodes the frame in the wire format described in the module docs.
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_LEN + self.payload.len());
        bytes.push(self.stream.selector());
        bytes.extend_from_slice(&[0, 0, 0]);
        bytes.extend_from_slice(&(self.payload.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&self.payload);
        bytes
    }
}

/// Decodes frames from a raw multiplexed byte channel.
///
/// The stream ends when the reader reaches end-of-file. A channel that
/// closes inside a header ends the stream; one that closes inside a payload
/// yields the bytes that did arrive and then ends. Neither is an error.
pub fn frames<R>(reader: R) -> BoxStream<'static, Result<Frame, EngineError>>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    Box::pin(async_stream::stream! {
        let mut reader = reader;
        loop {
            let mut header = [0u8; HEADER_LEN];
            match read_full(&mut reader, &mut header).await {
                Ok(n) if n < HEADER_LEN => break,
                Ok(_) => {}
                Err(e) => {
                    yield Err(EngineError::Io(e));
                    break;
                }
            }

            let len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as u64;
            let mut payload = Vec::new();
            if let Err(e) = (&mut reader).take(len).read_to_end(&mut payload).await {
                yield Err(EngineError::Io(e));
                break;
            }
            let complete = payload.len() as u64 == len;

            match header[0] {
                0 | 1 => yield Ok(Frame::stdout(payload)),
                2 => yield Ok(Frame::stderr(payload)),
                3 => {
                    yield Err(EngineError::Stream(String::from_utf8_lossy(&payload).into_owned()));
                    break;
                }
                other => {
                    yield Err(EngineError::Stream(format!("unknown stream selector {other}")));
                    break;
                }
            }

            if !complete {
                break;
            }
        }
    })
}

/// Reads until `buf` is full or the reader is exhausted.
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Accumulated standard output and standard error of one job.
///
/// Bytes are kept raw and decoded once, so a multi-byte character split
/// across two frames survives intact.
#[derive(Debug, Clone)]
pub struct CapturedOutput {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    limit: usize,
    truncated: bool,
}

impl Default for CapturedOutput {
    fn default() -> Self {
        Self::with_limit(usize::MAX)
    }
}

impl CapturedOutput {
    /// Buffers that stop growing after `limit` bytes per stream.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            stdout: Vec::new(),
            stderr: Vec::new(),
            limit,
            truncated: false,
        }
    }

    /// Appends a frame's payload to its stream's buffer.
    pub fn push(&mut self, frame: Frame) {
        let buffer = match frame.stream {
            StreamKind::Stdout => &mut self.stdout,
            StreamKind::Stderr => &mut self.stderr,
        };
        let room = self.limit.saturating_sub(buffer.len());
        if frame.payload.len() > room {
            buffer.extend_from_slice(&frame.payload[..room]);
            self.truncated = true;
        } else {
            buffer.extend_from_slice(&frame.payload);
        }
    }

    pub fn stdout(&self) -> &[u8] {
        &self.stdout
    }

    pub fn stderr(&self) -> &[u8] {
        &self.stderr
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Whether any payload was dropped because of the size limit.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }
}

/// Consumes `frames` until the channel closes, splitting payloads by stream.
///
/// A channel error is logged and ends the drain; the job still goes on to
/// wait for the sandbox to exit.
pub async fn drain<S>(mut frames: S, limit: usize) -> CapturedOutput
where
    S: Stream<Item = Result<Frame, EngineError>> + Unpin,
{
    let mut captured = CapturedOutput::with_limit(limit);
    while let Some(item) = frames.next().await {
        match item {
            Ok(frame) => captured.push(frame),
            Err(e) => {
                tracing::warn!(error = %e, "Output channel error, stopping drain");
                break;
            }
        }
    }
    captured
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire(frames: &[Frame]) -> Vec<u8> {
        frames.iter().flat_map(Frame::encode).collect()
    }

    async fn demux_bytes(bytes: Vec<u8>) -> CapturedOutput {
        drain(frames(std::io::Cursor::new(bytes)), usize::MAX).await
    }

    /// Deterministic pseudo-random interleaving of the two streams.
    fn interleave(stdout: &[&str], stderr: &[&str], seed: u64) -> Vec<Frame> {
        let mut out = stdout.iter().map(|s| Frame::stdout(s.as_bytes())).rev().collect::<Vec<_>>();
        let mut err = stderr.iter().map(|s| Frame::stderr(s.as_bytes())).rev().collect::<Vec<_>>();
        let mut state = seed;
        let mut merged = Vec::new();
        while !out.is_empty() || !err.is_empty() {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let take_out = if out.is_empty() {
                false
            } else if err.is_empty() {
                true
            } else {
                (state >> 33) % 2 == 0
            };
            let next = if take_out { out.pop() } else { err.pop() };
            merged.extend(next);
        }
        merged
    }

    #[test]
    fn test_frame_encoding_header() {
        let bytes = Frame::stderr("hi").encode();
        assert_eq!(bytes, vec![2, 0, 0, 0, 0, 0, 0, 2, b'h', b'i']);
    }

    #[tokio::test]
    async fn test_interleaved_streams_reassemble_in_order() {
        let stdout = ["line 1\n", "line 2\n", "", "line 3\n"];
        let stderr = ["warn a\n", "warn b\n", "warn c\n"];

        for seed in 0..16 {
            let captured = demux_bytes(wire(&interleave(&stdout, &stderr, seed))).await;
            assert_eq!(captured.stdout_text(), stdout.concat(), "seed {seed}");
            assert_eq!(captured.stderr_text(), stderr.concat(), "seed {seed}");
        }
    }

    #[tokio::test]
    async fn test_channel_closed_mid_payload_keeps_received_bytes() {
        let mut bytes = wire(&[Frame::stdout("complete\n"), Frame::stderr("oops\n")]);
        bytes.extend_from_slice(&Frame::stdout("partial-payload").encode()[..HEADER_LEN + 7]);

        let captured = demux_bytes(bytes).await;
        assert_eq!(captured.stdout_text(), "complete\npartial");
        assert_eq!(captured.stderr_text(), "oops\n");
    }

    #[tokio::test]
    async fn test_channel_closed_mid_header() {
        let mut bytes = wire(&[Frame::stdout("done")]);
        bytes.extend_from_slice(&[2, 0, 0]);

        let captured = demux_bytes(bytes).await;
        assert_eq!(captured.stdout_text(), "done");
        assert!(captured.stderr().is_empty());
    }

    #[tokio::test]
    async fn test_empty_channel() {
        let captured = demux_bytes(Vec::new()).await;
        assert!(captured.stdout().is_empty());
        assert!(captured.stderr().is_empty());
    }

    #[tokio::test]
    async fn test_multibyte_character_split_across_frames() {
        let snowman = "☃".as_bytes();
        let bytes = wire(&[
            Frame::stdout(&snowman[..1]),
            Frame::stderr("x"),
            Frame::stdout(&snowman[1..]),
        ]);

        let captured = demux_bytes(bytes).await;
        assert_eq!(captured.stdout_text(), "☃");
        assert_eq!(captured.stderr_text(), "x");
    }

    #[tokio::test]
    async fn test_stdin_selector_routes_to_stdout() {
        let mut bytes = vec![0, 0, 0, 0, 0, 0, 0, 3];
        bytes.extend_from_slice(b"abc");

        let captured = demux_bytes(bytes).await;
        assert_eq!(captured.stdout_text(), "abc");
    }

    #[tokio::test]
    async fn test_unknown_selector_stops_drain() {
        let mut bytes = wire(&[Frame::stdout("before")]);
        bytes.extend_from_slice(&[9, 0, 0, 0, 0, 0, 0, 1, b'?']);
        bytes.extend(Frame::stdout("after").encode());

        let mut stream = frames(std::io::Cursor::new(bytes));
        assert!(matches!(stream.next().await, Some(Ok(_))));
        assert!(matches!(stream.next().await, Some(Err(EngineError::Stream(_)))));
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn test_limit_truncates_each_stream() {
        let mut captured = CapturedOutput::with_limit(4);
        captured.push(Frame::stdout("abc"));
        captured.push(Frame::stdout("defg"));
        captured.push(Frame::stderr("xy"));

        assert_eq!(captured.stdout_text(), "abcd");
        assert_eq!(captured.stderr_text(), "xy");
        assert!(captured.is_truncated());
    }
}
