//! `Range` header parsing (RFC 7233).
//!
//! Produces a normalized list of byte ranges for a resource of known size:
//! clamped to the resource, sorted ascending, with overlapping and adjacent
//! ranges merged.

/// Inclusive byte range `start..=end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Number of bytes covered by this range.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// Result of parsing a `Range` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeOutcome {
    /// One or more satisfiable ranges, ascending and non-overlapping
    Ranges(Vec<ByteRange>),
    /// Nothing overlaps the resource, or the unit is not `bytes` (416)
    Unsatisfiable,
    /// The header is syntactically invalid (400)
    Malformed,
}

/// Parse a `Range` header value against a resource of `size` bytes.
///
/// Each range spec is `first-last`, `first-` or `-suffix_length`. Specs
/// that are well formed but fall outside the resource are dropped; if none
/// remain the outcome is [`RangeOutcome::Unsatisfiable`].
///
/// # Examples
///
/// ```
/// use hotserve::http::range::{parse_range, ByteRange, RangeOutcome};
///
/// assert_eq!(
///     parse_range(1000, "bytes=0-99,50-149"),
///     RangeOutcome::Ranges(vec![ByteRange { start: 0, end: 149 }])
/// );
/// assert_eq!(parse_range(1000, "bytes=1000-"), RangeOutcome::Unsatisfiable);
/// assert_eq!(parse_range(1000, "0-99"), RangeOutcome::Malformed);
/// ```
pub fn parse_range(size: u64, header: &str) -> RangeOutcome {
    let Some((unit, specs)) = header.split_once('=') else {
        return RangeOutcome::Malformed;
    };

    let mut ranges = Vec::new();
    for spec in specs.split(',') {
        let spec = spec.trim();
        // Empty list elements are allowed by the list syntax
        if spec.is_empty() {
            continue;
        }

        match parse_spec(spec, size) {
            Spec::Valid(range) => ranges.push(range),
            Spec::OutOfBounds => {}
            Spec::Invalid => return RangeOutcome::Malformed,
        }
    }

    if !unit.trim().eq_ignore_ascii_case("bytes") || ranges.is_empty() {
        // An empty spec list with a known unit is malformed, not unsatisfiable
        if specs.trim().trim_matches(',').trim().is_empty() {
            return RangeOutcome::Malformed;
        }
        return RangeOutcome::Unsatisfiable;
    }

    RangeOutcome::Ranges(combine(ranges))
}

enum Spec {
    Valid(ByteRange),
    OutOfBounds,
    Invalid,
}

fn parse_spec(spec: &str, size: u64) -> Spec {
    let Some((first, last)) = spec.split_once('-') else {
        return Spec::Invalid;
    };
    let (first, last) = (first.trim(), last.trim());

    let first = match parse_position(first) {
        Ok(value) => value,
        Err(()) => return Spec::Invalid,
    };
    let last = match parse_position(last) {
        Ok(value) => value,
        Err(()) => return Spec::Invalid,
    };

    let Some(max) = size.checked_sub(1) else {
        return match (first, last) {
            (None, None) => Spec::Invalid,
            _ => Spec::OutOfBounds,
        };
    };

    let (start, end) = match (first, last) {
        // bytes=-N: the final N bytes
        (None, Some(suffix)) => {
            if suffix == 0 {
                return Spec::OutOfBounds;
            }
            (size.saturating_sub(suffix), max)
        }
        // bytes=N-: from N to the end
        (Some(start), None) => (start, max),
        (Some(start), Some(end)) => {
            if start > end {
                return Spec::Invalid;
            }
            (start, end.min(max))
        }
        (None, None) => return Spec::Invalid,
    };

    if start > end {
        return Spec::OutOfBounds;
    }

    Spec::Valid(ByteRange { start, end })
}

fn parse_position(value: &str) -> Result<Option<u64>, ()> {
    if value.is_empty() {
        return Ok(None);
    }
    if !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(());
    }
    // Positions beyond u64 are clamped; they are out of bounds for any resource
    Ok(Some(value.parse::<u64>().unwrap_or(u64::MAX)))
}

/// Sort ranges and merge overlapping or adjacent ones.
fn combine(mut ranges: Vec<ByteRange>) -> Vec<ByteRange> {
    ranges.sort_by_key(|range| range.start);

    let mut combined: Vec<ByteRange> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match combined.last_mut() {
            Some(current) if range.start <= current.end.saturating_add(1) => {
                current.end = current.end.max(range.end);
            }
            _ => combined.push(range),
        }
    }

    combined
}
