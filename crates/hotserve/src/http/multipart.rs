//! Body framing for full, single-range and `multipart/byteranges` responses.
//!
//! A [`BodyPlan`] is computed before any byte is read: the list of file
//! segments to emit (with framing bytes attached), the exact
//! `Content-Length`, and the headers the framing implies.

use super::range::ByteRange;
use axum::body::Bytes;

/// One file segment of a response body.
///
/// `prefix` and `suffix` carry multipart framing and are only present when
/// more than one range is served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Range {
    pub offset: u64,
    pub length: u64,
    pub prefix: Option<Bytes>,
    pub suffix: Option<Bytes>,
}

impl Range {
    /// A plain segment without framing.
    pub fn new(offset: u64, length: u64) -> Self {
        Self {
            offset,
            length,
            prefix: None,
            suffix: None,
        }
    }

    /// Bytes this segment contributes to the body, framing included.
    pub fn encoded_len(&self) -> u64 {
        let framing = |bytes: &Option<Bytes>| bytes.as_ref().map_or(0, |b| b.len() as u64);
        framing(&self.prefix) + self.length + framing(&self.suffix)
    }
}

/// Everything needed to emit a body for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyPlan {
    /// Segments to emit, in order
    pub ranges: Vec<Range>,
    /// Exact body length
    pub content_length: u64,
    /// `Content-Range` for a single partial range
    pub content_range: Option<String>,
    /// Replacement `Content-Type` for a multipart body
    pub content_type: Option<String>,
    /// Whether the response is `206 Partial Content`
    pub partial: bool,
}

impl BodyPlan {
    /// The whole resource as one segment.
    pub fn full(size: u64) -> Self {
        Self {
            ranges: vec![Range::new(0, size)],
            content_length: size,
            content_range: None,
            content_type: None,
            partial: false,
        }
    }

    /// Plan a partial response for already-normalized `ranges`.
    ///
    /// One range yields a raw body with `Content-Range`. Several ranges
    /// yield a `multipart/byteranges` body framed with `boundary`, each
    /// part labelled with `content_type`.
    pub fn partial(ranges: &[ByteRange], size: u64, content_type: &str, boundary: &str) -> Self {
        if let [range] = ranges {
            return Self {
                ranges: vec![Range::new(range.start, range.len())],
                content_length: range.len(),
                content_range: Some(format!("bytes {}-{}/{}", range.start, range.end, size)),
                content_type: None,
                partial: true,
            };
        }

        let mut segments = Vec::with_capacity(ranges.len());
        for (index, range) in ranges.iter().enumerate() {
            let head = if index > 0 { "\r\n" } else { "" };
            let prefix = format!(
                "{head}--{boundary}\r\nContent-Type: {content_type}\r\nContent-Range: bytes {}-{}/{size}\r\n\r\n",
                range.start, range.end
            );

            segments.push(Range {
                offset: range.start,
                length: range.len(),
                prefix: Some(Bytes::from(prefix)),
                suffix: None,
            });
        }

        if let Some(last) = segments.last_mut() {
            last.suffix = Some(Bytes::from(format!("\r\n--{boundary}--\r\n")));
        }

        let content_length = segments.iter().map(Range::encoded_len).sum();

        Self {
            ranges: segments,
            content_length,
            content_range: None,
            content_type: Some(format!("multipart/byteranges; boundary=\"{boundary}\"")),
            partial: true,
        }
    }
}

/// Fresh random multipart boundary (32 hex characters).
pub fn generate_boundary() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
