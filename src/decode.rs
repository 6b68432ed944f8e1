//! Response body decoding according to `Content-Encoding`.
//!
//! Only the encodings advertised in the request profile (`gzip, deflate`) are
//! understood. Anything else fails closed: the raw bytes are never handed back
//! as if they were plain content.
//!
//! # Example
//!
//! ```
//! use hardened_fetch::decode::decode_body;
//! use hardened_fetch::fetch::FetchResponse;
//!
//! let mut response = FetchResponse::default();
//! response.set_body(&b"<html></html>"[..]);
//! assert_eq!(&decode_body(&response).unwrap()[..], b"<html></html>");
//! ```

use std::io::{self, Read};

use bytes::Bytes;
use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::fetch::FetchResponse;

/// Default ceiling for decoded bodies (64 MiB), guarding against decompression bombs.
pub const DEFAULT_MAX_DECODED_SIZE: usize = 64 * 1024 * 1024;

/// Errors returned by [`decode_body`].
///
/// Decode failures never invalidate the response status or headers; callers
/// may still inspect them.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The server used a content encoding this client does not understand.
    #[error("response content encoding {encoding:?} not supported")]
    UnsupportedEncoding {
        /// The `Content-Encoding` header value.
        encoding: String,
    },

    /// The body did not decompress cleanly.
    #[error("corrupt {encoding} body: {source}")]
    Corrupt {
        /// The encoding that failed.
        encoding: &'static str,
        /// The decompressor error.
        #[source]
        source: io::Error,
    },

    /// The decoded body grew past the configured ceiling.
    #[error("decoded body exceeds {limit} bytes")]
    TooLarge {
        /// The ceiling in bytes.
        limit: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContentEncoding {
    Identity,
    Gzip,
    Deflate,
}

impl ContentEncoding {
    fn of(response: &FetchResponse) -> Result<Self, DecodeError> {
        let Some(value) = response.headers().get(reqwest::header::CONTENT_ENCODING) else {
            return Ok(Self::Identity);
        };
        let raw = String::from_utf8_lossy(value.as_bytes());
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "identity" => Ok(Self::Identity),
            "gzip" | "x-gzip" => Ok(Self::Gzip),
            "deflate" => Ok(Self::Deflate),
            _ => Err(DecodeError::UnsupportedEncoding {
                encoding: raw.into_owned(),
            }),
        }
    }
}

/// Returns the response body decoded per its `Content-Encoding`.
///
/// Uses [`DEFAULT_MAX_DECODED_SIZE`] as the output ceiling.
///
/// # Errors
///
/// See [`decode_body_with_limit`].
pub fn decode_body(response: &FetchResponse) -> Result<Bytes, DecodeError> {
    decode_body_with_limit(response, DEFAULT_MAX_DECODED_SIZE)
}

/// Returns the response body decoded per its `Content-Encoding`, refusing to
/// produce more than `limit` bytes.
///
/// # Errors
///
/// - [`DecodeError::UnsupportedEncoding`] for encodings other than gzip/deflate
/// - [`DecodeError::Corrupt`] if decompression fails
/// - [`DecodeError::TooLarge`] if the output exceeds `limit`
#[instrument(level = "debug", skip(response), fields(status = %response.status(), raw_len = response.body().len()))]
pub fn decode_body_with_limit(response: &FetchResponse, limit: usize) -> Result<Bytes, DecodeError> {
    let encoding = ContentEncoding::of(response)?;
    let body = response.body();
    if body.is_empty() {
        return Ok(Bytes::new());
    }

    let decoded = match encoding {
        ContentEncoding::Identity => return Ok(body.clone()),
        ContentEncoding::Gzip => read_limited(GzDecoder::new(&body[..]), limit)
            .map_err(|e| classify(e, "gzip", limit))?,
        ContentEncoding::Deflate => decode_deflate(body, limit)?,
    };
    debug!(decoded_len = decoded.len(), ?encoding, "body decoded");
    Ok(Bytes::from(decoded))
}

/// `deflate` is specified as zlib-wrapped, but some servers send a raw
/// deflate stream. The raw form is only tried after zlib fails.
fn decode_deflate(body: &[u8], limit: usize) -> Result<Vec<u8>, DecodeError> {
    match read_limited(ZlibDecoder::new(body), limit) {
        Ok(decoded) => Ok(decoded),
        Err(LimitedReadError::TooLarge) => Err(DecodeError::TooLarge { limit }),
        Err(LimitedReadError::Io(zlib_error)) => {
            debug!(error = %zlib_error, "zlib decode failed, trying raw deflate");
            read_limited(DeflateDecoder::new(body), limit).map_err(|e| match e {
                LimitedReadError::TooLarge => DecodeError::TooLarge { limit },
                LimitedReadError::Io(_) => DecodeError::Corrupt {
                    encoding: "deflate",
                    source: zlib_error,
                },
            })
        }
    }
}

enum LimitedReadError {
    TooLarge,
    Io(io::Error),
}

fn read_limited(reader: impl Read, limit: usize) -> Result<Vec<u8>, LimitedReadError> {
    let mut out = Vec::new();
    reader
        .take(limit as u64 + 1)
        .read_to_end(&mut out)
        .map_err(LimitedReadError::Io)?;
    if out.len() > limit {
        return Err(LimitedReadError::TooLarge);
    }
    Ok(out)
}

fn classify(error: LimitedReadError, encoding: &'static str, limit: usize) -> DecodeError {
    match error {
        LimitedReadError::TooLarge => DecodeError::TooLarge { limit },
        LimitedReadError::Io(source) => DecodeError::Corrupt { encoding, source },
    }
}
