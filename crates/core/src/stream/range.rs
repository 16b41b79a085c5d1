//! HTTP `Range` header interpretation.

/// What a request asks for, resolved against a known file length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeRequest {
    /// No usable range header: send the whole file with `200`.
    Full,
    /// Inclusive byte range, answered with `206`.
    Partial { start: u64, end: u64 },
    /// Range starts at or beyond the end of the file: `416`.
    Unsatisfiable,
}

impl RangeRequest {
    /// Inclusive `(start, end)` to send, or `None` for an empty body.
    pub fn bounds(&self, length: u64) -> Option<(u64, u64)> {
        match *self {
            RangeRequest::Partial { start, end } => Some((start, end)),
            RangeRequest::Full if length > 0 => Some((0, length - 1)),
            _ => None,
        }
    }
}

/// Parse a `Range` header value against a file of `length` bytes.
///
/// Accepts `bytes=a-b`, `bytes=a-` and the suffix form `bytes=-n`. Only the
/// first range of a multi-range header is honored. Malformed headers are
/// ignored rather than rejected.
pub fn parse_range(header: Option<&str>, length: u64) -> RangeRequest {
    let Some(header) = header else {
        return RangeRequest::Full;
    };
    let Some(spec) = header.trim().strip_prefix("bytes=") else {
        return RangeRequest::Full;
    };
    let first = spec.split(',').next().unwrap_or("").trim();
    let Some((start_str, end_str)) = first.split_once('-') else {
        return RangeRequest::Full;
    };
    let (start_str, end_str) = (start_str.trim(), end_str.trim());

    if start_str.is_empty() {
        // Suffix range: "-500" means the last 500 bytes
        let Ok(suffix) = end_str.parse::<u64>() else {
            return RangeRequest::Full;
        };
        if suffix == 0 || length == 0 {
            return RangeRequest::Unsatisfiable;
        }
        return RangeRequest::Partial {
            start: length.saturating_sub(suffix),
            end: length - 1,
        };
    }

    let Ok(start) = start_str.parse::<u64>() else {
        return RangeRequest::Full;
    };
    let end = if end_str.is_empty() {
        None
    } else {
        match end_str.parse::<u64>() {
            Ok(end) if end >= start => Some(end),
            _ => return RangeRequest::Full,
        }
    };

    if start >= length {
        return RangeRequest::Unsatisfiable;
    }

    RangeRequest::Partial {
        start,
        end: end.unwrap_or(u64::MAX).min(length - 1),
    }
}
