//! HTTP semantics for serving build output.
//!
//! Pure functions over header maps: byte-range parsing, conditional request
//! negotiation (validators, freshness, preconditions) and the framing plan
//! for single and multipart range bodies.

pub mod conditional;
pub mod date;
pub mod multipart;
pub mod range;

pub use conditional::{
    is_conditional, is_fresh, is_precondition_failed, is_range_fresh, weak_etag,
};
pub use multipart::{BodyPlan, Range};
pub use range::{ByteRange, RangeOutcome, parse_range};

use crate::error::HttpError;
use std::borrow::Cow;

/// Percent-decode a request path.
///
/// Fails on invalid UTF-8 after decoding and on embedded NUL bytes.
pub fn decode_path(raw: &str) -> Result<Cow<'_, str>, HttpError> {
    let decoded =
        urlencoding::decode(raw).map_err(|_| HttpError::BadRequest("malformed URI encoding"))?;

    if decoded.contains('\0') {
        return Err(HttpError::BadRequest("path contains NUL byte"));
    }

    Ok(decoded)
}
