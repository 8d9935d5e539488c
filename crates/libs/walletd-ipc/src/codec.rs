//! Newline-delimited JSON framing.
//!
//! Every request and response is one UTF-8 JSON object followed by `\n`.
//! There is no length prefix; standard JSON string escaping keeps raw
//! newlines out of the payload.

use std::io::{self, ErrorKind};

use serde::{de::DeserializeOwned, Serialize};
use tokio::net::UnixStream;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};

/// Upper bound on a single frame, delimiter excluded (1 MiB).
pub const DEFAULT_MAX_FRAME_LEN: usize = 1024 * 1024;

/// A Unix stream carrying newline-delimited frames.
pub type FramedStream = Framed<UnixStream, LinesCodec>;

pub fn framed(stream: UnixStream, max_frame_len: usize) -> FramedStream {
    Framed::new(stream, LinesCodec::new_with_max_length(max_frame_len))
}

/// Serializes `msg` as a single line without the trailing delimiter.
pub fn encode_line<T: Serialize>(msg: &T) -> io::Result<String> {
    serde_json::to_string(msg).map_err(|err| io::Error::new(ErrorKind::InvalidData, err))
}

/// Decodes one frame. Surrounding whitespace, including the delimiter and a
/// `\r` left by CRLF peers, is ignored.
pub fn decode_frame<T: DeserializeOwned>(bytes: &[u8]) -> io::Result<T> {
    let text = std::str::from_utf8(bytes)
        .map_err(|err| io::Error::new(ErrorKind::InvalidData, err))?
        .trim();
    if text.is_empty() {
        return Err(io::Error::new(ErrorKind::UnexpectedEof, "empty frame"));
    }
    serde_json::from_str(text).map_err(|err| io::Error::new(ErrorKind::InvalidData, err))
}

pub fn into_io_error(err: LinesCodecError) -> io::Error {
    match err {
        LinesCodecError::Io(err) => err,
        LinesCodecError::MaxLineLengthExceeded => {
            io::Error::new(ErrorKind::InvalidData, "frame exceeds maximum length")
        }
    }
}
