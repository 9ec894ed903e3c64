//! Content-Length framing.
//!
//! Every message travels as an ASCII header block followed by the payload:
//! ```text
//! Content-Length: <length>\r\n
//! \r\n
//! <payload>
//! ```
//! The next frame's header starts immediately after the payload. Boundaries
//! are found from the declared length only, never from payload content.

use std::io::{BufRead, Read, Write};

use lspwire_config::DEFAULT_MAX_FRAME_BYTES;
use tracing::warn;

use crate::errors::{FramingError, TransportError};

/// Log target for codec diagnostics.
const CODEC_TARGET: &str = "lspwire::codec";

/// Longest header line accepted, terminator included.
pub const MAX_HEADER_LINE_BYTES: usize = 8 * 1024;
const HEADER_LINE_LIMIT: u64 = MAX_HEADER_LINE_BYTES as u64;

/// Name of the only header the codec interprets.
pub const CONTENT_LENGTH: &str = "Content-Length";

/// How header lines without a `:` separator are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HeaderPolicy {
    /// Reject the frame with [`FramingError::MalformedHeader`].
    #[default]
    Strict,
    /// Log and skip the line.
    Lenient,
}

/// Encoder and decoder for Content-Length frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCodec {
    policy: HeaderPolicy,
    max_content_length: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self {
            policy: HeaderPolicy::Strict,
            max_content_length: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

impl FrameCodec {
    /// Creates a codec with the given header policy and length ceiling.
    #[must_use]
    pub const fn new(policy: HeaderPolicy, max_content_length: usize) -> Self {
        Self {
            policy,
            max_content_length,
        }
    }

    /// Header policy in force.
    #[must_use]
    pub const fn policy(&self) -> HeaderPolicy {
        self.policy
    }

    /// Wraps `payload` in a frame.
    #[must_use]
    pub fn encode(payload: &[u8]) -> Vec<u8> {
        let header = format!("{CONTENT_LENGTH}: {}\r\n\r\n", payload.len());
        let mut frame = Vec::with_capacity(header.len() + payload.len());
        frame.extend_from_slice(header.as_bytes());
        frame.extend_from_slice(payload);
        frame
    }

    /// Writes one frame and flushes the writer.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Io` if writing fails.
    pub fn write_frame<W: Write + ?Sized>(
        writer: &mut W,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        write!(writer, "{CONTENT_LENGTH}: {}\r\n\r\n", payload.len())?;
        writer.write_all(payload)?;
        writer.flush()?;
        Ok(())
    }

    /// Reads the next frame's payload.
    ///
    /// Returns `Ok(None)` when the stream ends cleanly before a new frame
    /// begins.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Framing` for malformed headers,
    /// `TransportError::StreamClosed` when the stream ends inside a frame, and
    /// `TransportError::Io` for read failures.
    pub fn read_frame<R: BufRead + ?Sized>(
        &self,
        reader: &mut R,
    ) -> Result<Option<Vec<u8>>, TransportError> {
        let Some(content_length) = self.read_headers(reader)? else {
            return Ok(None);
        };

        let mut payload = Vec::with_capacity(content_length);
        let wanted = u64::try_from(content_length).unwrap_or(u64::MAX);
        Read::take(&mut *reader, wanted).read_to_end(&mut payload)?;
        if payload.len() < content_length {
            return Err(TransportError::closed_in_payload(
                content_length,
                payload.len(),
            ));
        }
        Ok(Some(payload))
    }

    /// Reads the header block and returns the declared payload length.
    fn read_headers<R: BufRead + ?Sized>(
        &self,
        reader: &mut R,
    ) -> Result<Option<usize>, TransportError> {
        let mut content_length: Option<usize> = None;
        let mut seen_any = false;
        let mut raw = Vec::new();

        loop {
            raw.clear();
            let bytes_read =
                Read::take(&mut *reader, HEADER_LINE_LIMIT).read_until(b'\n', &mut raw)?;
            if bytes_read == 0 {
                if seen_any {
                    return Err(TransportError::closed_in_headers());
                }
                return Ok(None);
            }
            seen_any = true;
            if raw.last() != Some(&b'\n') {
                if raw.len() >= MAX_HEADER_LINE_BYTES {
                    return Err(FramingError::HeaderLineTooLong {
                        limit: MAX_HEADER_LINE_BYTES,
                    }
                    .into());
                }
                return Err(TransportError::closed_in_headers());
            }

            let text = String::from_utf8_lossy(&raw);
            let line = text.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                break;
            }

            if let Some(length) = self.parse_header_line(line)? {
                content_length = Some(length);
            }
        }

        let length = content_length.ok_or(FramingError::MissingContentLength)?;
        if length > self.max_content_length {
            return Err(FramingError::FrameTooLarge {
                length,
                limit: self.max_content_length,
            }
            .into());
        }
        Ok(Some(length))
    }

    /// Parses one `Key: Value` line, returning the length for Content-Length.
    fn parse_header_line(&self, line: &str) -> Result<Option<usize>, FramingError> {
        let Some((name, value)) = line.split_once(':') else {
            return match self.policy {
                HeaderPolicy::Strict => Err(FramingError::MalformedHeader {
                    line: line.to_owned(),
                }),
                HeaderPolicy::Lenient => {
                    warn!(target: CODEC_TARGET, line, "skipping header line without a colon");
                    Ok(None)
                }
            };
        };

        if !name.trim().eq_ignore_ascii_case(CONTENT_LENGTH) {
            return Ok(None);
        }

        let trimmed = value.trim();
        trimmed
            .parse::<usize>()
            .map(Some)
            .map_err(|_| FramingError::InvalidContentLength {
                value: trimmed.to_owned(),
            })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use rstest::rstest;

    use super::*;

    fn decode_all(codec: &FrameCodec, input: &[u8]) -> Vec<Result<Vec<u8>, String>> {
        let mut reader = Cursor::new(input.to_vec());
        let mut frames = Vec::new();
        loop {
            match codec.read_frame(&mut reader) {
                Ok(Some(payload)) => frames.push(Ok(payload)),
                Ok(None) => break,
                Err(error) => {
                    frames.push(Err(error.to_string()));
                    break;
                }
            }
        }
        frames
    }

    fn read_one(input: &[u8]) -> Result<Option<Vec<u8>>, TransportError> {
        FrameCodec::default().read_frame(&mut Cursor::new(input.to_vec()))
    }

    #[rstest]
    fn encodes_lsp_framed_message() {
        let frame = FrameCodec::encode(b"test payload");

        assert_eq!(frame, b"Content-Length: 12\r\n\r\ntest payload");
    }

    #[rstest]
    fn encodes_empty_message() {
        assert_eq!(FrameCodec::encode(b""), b"Content-Length: 0\r\n\r\n");
    }

    #[rstest]
    fn write_frame_matches_encode() {
        let mut written = Vec::new();

        FrameCodec::write_frame(&mut written, b"{}").expect("write failed");

        assert_eq!(written, FrameCodec::encode(b"{}"));
    }

    #[rstest]
    #[case::ascii_json(br#"{"jsonrpc":"2.0","id":1,"method":"test"}"#.as_slice())]
    #[case::multibyte_utf8("{\"text\":\"héllo wörld ✓ 🚀\"}".as_bytes())]
    #[case::embedded_header_text(b"Content-Length: 99\r\n\r\nnot a header".as_slice())]
    #[case::empty(b"".as_slice())]
    fn round_trips_payload(#[case] payload: &[u8]) {
        let frame = FrameCodec::encode(payload);

        let decoded = read_one(&frame).expect("decode failed");

        assert_eq!(decoded.as_deref(), Some(payload));
    }

    #[rstest]
    fn decodes_back_to_back_frames() {
        let mut stream = FrameCodec::encode(b"first");
        stream.extend(FrameCodec::encode(b"second"));

        let frames = decode_all(&FrameCodec::default(), &stream);

        assert_eq!(
            frames,
            vec![Ok(b"first".to_vec()), Ok(b"second".to_vec())]
        );
    }

    #[rstest]
    fn ignores_additional_headers() {
        let input = b"Content-Type: application/vscode-jsonrpc; charset=utf-8\r\nContent-Length: 4\r\n\r\ntest";

        assert_eq!(read_one(input).expect("receive failed"), Some(b"test".to_vec()));
    }

    #[rstest]
    #[case("content-length: 5\r\n\r\nhello")]
    #[case("CONTENT-LENGTH:5\r\n\r\nhello")]
    #[case("Content-Length:   5  \n\nhello")]
    fn header_name_is_case_insensitive(#[case] input: &str) {
        assert_eq!(
            read_one(input.as_bytes()).expect("receive failed"),
            Some(b"hello".to_vec())
        );
    }

    #[rstest]
    fn misspelt_header_is_missing_content_length() {
        let result = read_one(b"Content-Lenght: 10\r\n\r\n0123456789");

        assert!(matches!(
            result,
            Err(TransportError::Framing(FramingError::MissingContentLength))
        ));
    }

    #[rstest]
    #[case("Content-Length: invalid\r\n\r\ntest")]
    #[case("Content-Length: -4\r\n\r\ntest")]
    #[case("Content-Length: \r\n\r\ntest")]
    fn rejects_invalid_content_length(#[case] input: &str) {
        let result = read_one(input.as_bytes());

        assert!(matches!(
            result,
            Err(TransportError::Framing(FramingError::InvalidContentLength { .. }))
        ));
    }

    #[rstest]
    fn strict_policy_rejects_header_without_colon() {
        let result = read_one(b"garbage line\r\nContent-Length: 2\r\n\r\n{}");

        match result {
            Err(TransportError::Framing(FramingError::MalformedHeader { line })) => {
                assert_eq!(line, "garbage line");
            }
            other => panic!("expected malformed header, got {other:?}"),
        }
    }

    #[rstest]
    fn lenient_policy_skips_header_without_colon() {
        let codec = FrameCodec::new(HeaderPolicy::Lenient, DEFAULT_MAX_FRAME_BYTES);
        let input = b"garbage line\r\nContent-Length: 2\r\n\r\n{}";

        let frames = decode_all(&codec, input);

        assert_eq!(frames, vec![Ok(b"{}".to_vec())]);
    }

    #[rstest]
    fn rejects_frames_over_the_limit() {
        let codec = FrameCodec::new(HeaderPolicy::Strict, 8);

        let result = codec.read_frame(&mut Cursor::new(b"Content-Length: 9\r\n\r\n".to_vec()));

        assert!(matches!(
            result,
            Err(TransportError::Framing(FramingError::FrameTooLarge {
                length: 9,
                limit: 8
            }))
        ));
    }

    #[rstest]
    fn endless_header_line_is_rejected_without_buffering_the_stream() {
        let codec = FrameCodec::new(HeaderPolicy::Strict, 8);
        let mut endless = std::io::BufReader::new(std::io::repeat(b'A'));

        let result = codec.read_frame(&mut endless);

        assert!(matches!(
            result,
            Err(TransportError::Framing(FramingError::HeaderLineTooLong {
                limit: MAX_HEADER_LINE_BYTES
            }))
        ));
    }

    #[rstest]
    fn header_line_at_the_limit_is_accepted() {
        let padding = "x".repeat(MAX_HEADER_LINE_BYTES - "X-Pad: \r\n".len());
        let input = format!("X-Pad: {padding}\r\nContent-Length: 2\r\n\r\n{{}}");

        assert_eq!(read_one(input.as_bytes()).expect("decode failed"), Some(b"{}".to_vec()));
    }

    #[rstest]
    fn clean_eof_between_frames_is_end_of_stream() {
        assert!(matches!(read_one(b""), Ok(None)));
    }

    #[rstest]
    #[case(b"Content-Length: 10".as_slice())]
    #[case(b"Content-Length: 10\r\n".as_slice())]
    fn eof_inside_headers_is_stream_closed(#[case] input: &[u8]) {
        assert!(matches!(
            read_one(input),
            Err(TransportError::StreamClosed { .. })
        ));
    }

    #[rstest]
    fn short_payload_is_stream_closed_not_truncated() {
        let result = read_one(b"Content-Length: 10\r\n\r\nhello");

        match result {
            Err(TransportError::StreamClosed { context }) => {
                assert!(context.contains("5 of 10"), "unexpected context: {context}");
            }
            other => panic!("expected stream closed, got {other:?}"),
        }
    }
}
