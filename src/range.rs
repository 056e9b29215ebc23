use axum::http::HeaderValue;
use axum_extra::headers::ContentRange;

use crate::config::MalformedRangePolicy;
use crate::RangeNotSatisfiable;

/// A `Range` request header, parsed against the single-range grammar
/// `bytes=<first>-[<last>]`.
///
/// Anything else, including the suffix form `bytes=-<length>` and multiple
/// comma separated ranges, is [`RangeHeader::Malformed`]; what happens then
/// is decided by [`MalformedRangePolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeHeader {
    /// No header, or an empty one.
    Absent,
    /// `bytes=start-end`, `end` inclusive and absent for "to end of file".
    Bytes { start: u64, end: Option<u64> },
    Malformed,
}

impl RangeHeader {
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            None => RangeHeader::Absent,
            Some(value) => Self::parse_value(value),
        }
    }

    /// Same as [`RangeHeader::parse`] for a raw header value. Values that are
    /// not visible ASCII are malformed.
    pub fn from_header(value: Option<&HeaderValue>) -> Self {
        match value.map(HeaderValue::to_str) {
            None => RangeHeader::Absent,
            Some(Ok(value)) => Self::parse_value(value),
            Some(Err(_)) => RangeHeader::Malformed,
        }
    }

    fn parse_value(value: &str) -> Self {
        let value = value.trim();
        if value.is_empty() {
            return RangeHeader::Absent;
        }

        let Some((unit, spec)) = value.split_once('=') else {
            return RangeHeader::Malformed;
        };
        if !unit.eq_ignore_ascii_case("bytes") {
            return RangeHeader::Malformed;
        }
        let Some((first, last)) = spec.split_once('-') else {
            return RangeHeader::Malformed;
        };

        let (Some(Some(start)), Some(end)) = (optional_position(first), optional_position(last)) else {
            return RangeHeader::Malformed;
        };

        match end {
            Some(end) if end < start => RangeHeader::Malformed,
            end => RangeHeader::Bytes { start, end },
        }
    }
}

/// `Some(None)` for an empty token, `Some(Some(n))` for `1*DIGIT` that fits
/// in a `u64`, `None` for anything else.
fn optional_position(token: &str) -> Option<Option<u64>> {
    if token.is_empty() {
        return Some(None);
    }
    if !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse().ok().map(Some)
}

/// The byte window served for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServingPlan {
    /// Offset of the first byte served.
    pub start: u64,
    /// Number of bytes served.
    pub length: u64,
    /// Size snapshot of the resource the plan was computed against.
    pub total_size: u64,
    /// Whether this answers a satisfiable range (206) rather than the full
    /// representation (200).
    pub is_partial: bool,
}

impl ServingPlan {
    pub fn full(total_size: u64) -> Self {
        ServingPlan { start: 0, length: total_size, total_size, is_partial: false }
    }

    fn partial(start: u64, end: u64, total_size: u64) -> Self {
        ServingPlan { start, length: end - start + 1, total_size, is_partial: true }
    }

    /// Offset of the last byte served, inclusive. Only meaningful when
    /// `length > 0`, which every partial plan guarantees.
    pub fn end(&self) -> u64 {
        (self.start + self.length).saturating_sub(1)
    }

    pub fn content_length(&self) -> u64 {
        self.length
    }

    /// `Content-Range` for a partial plan.
    pub fn content_range(&self) -> Option<ContentRange> {
        if !self.is_partial {
            return None;
        }
        ContentRange::bytes(self.start..=self.end(), self.total_size).ok()
    }

    /// Resolve `header` against a resource of `total_size` bytes.
    pub fn compute(
        header: RangeHeader,
        total_size: u64,
        policy: MalformedRangePolicy,
    ) -> Result<ServingPlan, RangeNotSatisfiable> {
        match header {
            RangeHeader::Absent => Ok(ServingPlan::full(total_size)),
            RangeHeader::Malformed => match policy {
                MalformedRangePolicy::Ignore => Ok(ServingPlan::full(total_size)),
                MalformedRangePolicy::Reject => Err(RangeNotSatisfiable::for_size(total_size)),
            },
            RangeHeader::Bytes { start, .. } if start >= total_size => {
                Err(RangeNotSatisfiable::for_size(total_size))
            }
            RangeHeader::Bytes { start, end } => {
                let last = total_size - 1;
                let end = end.map_or(last, |end| end.min(last));
                Ok(ServingPlan::partial(start, end, total_size))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use axum::http::HeaderValue;
    use axum_extra::headers::ContentRange;

    use super::*;

    const IGNORE: MalformedRangePolicy = MalformedRangePolicy::Ignore;

    fn plan(header: &str, total_size: u64) -> Result<ServingPlan, RangeNotSatisfiable> {
        ServingPlan::compute(RangeHeader::parse(Some(header)), total_size, IGNORE)
    }

    #[test]
    fn test_parse_range_header() {
        use RangeHeader::*;

        let tests = [
            ("bytes=0-99", Bytes { start: 0, end: Some(99) }),
            ("bytes=500-", Bytes { start: 500, end: None }),
            ("bytes=30-30", Bytes { start: 30, end: Some(30) }),
            ("  bytes=1-2  ", Bytes { start: 1, end: Some(2) }),
            ("BYTES=1-2", Bytes { start: 1, end: Some(2) }),
            ("bytes=-500", Malformed),
            ("", Absent),
            ("   ", Absent),
            ("bytes=", Malformed),
            ("bytes=-", Malformed),
            ("bytes=30-29", Malformed),
            ("bytes=0-99abc", Malformed),
            ("bytes=0-1,5-6", Malformed),
            ("bytes=+1-2", Malformed),
            ("bytes = 0-1", Malformed),
            ("items=0-1", Malformed),
            ("bytes 0-1", Malformed),
            ("bytes=18446744073709551616-", Malformed),
            ("none", Malformed),
        ];

        for (i, (header, expected)) in tests.iter().enumerate() {
            let parsed = RangeHeader::parse(Some(header));
            assert_eq!(*expected, parsed, "failed to parse range header #{i}: {header:?}");
        }

        assert_eq!(Absent, RangeHeader::parse(None));
    }

    #[test]
    fn test_from_header_value() {
        let value = HeaderValue::from_static("bytes=4-");
        assert_eq!(
            RangeHeader::Bytes { start: 4, end: None },
            RangeHeader::from_header(Some(&value))
        );
        assert_eq!(RangeHeader::Absent, RangeHeader::from_header(None));

        let opaque = HeaderValue::from_bytes(b"bytes=\xff-1").unwrap();
        assert_eq!(RangeHeader::Malformed, RangeHeader::from_header(Some(&opaque)));
    }

    #[test]
    fn test_first_hundred_bytes() {
        let plan = plan("bytes=0-99", 1000).unwrap();
        assert!(plan.is_partial);
        assert_eq!((0, 99, 100), (plan.start, plan.end(), plan.content_length()));
        assert_eq!(Some(ContentRange::bytes(0..100, 1000).unwrap()), plan.content_range());
    }

    #[test]
    fn test_open_ended_range() {
        let plan = plan("bytes=500-", 1000).unwrap();
        assert_eq!((500, 999, 500), (plan.start, plan.end(), plan.content_length()));
    }

    #[test]
    fn test_end_clamped_to_last_byte() {
        let plan = plan("bytes=999-2000", 1000).unwrap();
        assert_eq!((999, 999, 1), (plan.start, plan.end(), plan.content_length()));
    }

    #[test]
    fn test_start_at_total_size_is_unsatisfiable() {
        let err = plan("bytes=1000-1100", 1000).unwrap_err();
        assert_eq!(ContentRange::unsatisfied_bytes(1000), err.0);
    }

    #[test]
    fn test_clamped_length_is_remainder() {
        for start in [0, 1, 250, 998, 999] {
            for header in [format!("bytes={start}-"), format!("bytes={start}-5000")] {
                let plan = plan(&header, 1000).unwrap();
                assert_eq!(1000 - start, plan.content_length(), "{header}");
                assert_eq!(999, plan.end(), "{header}");
            }
        }
    }

    #[test]
    fn test_no_header_is_full() {
        let plan = ServingPlan::compute(RangeHeader::Absent, 1000, IGNORE).unwrap();
        assert_eq!(ServingPlan::full(1000), plan);
        assert!(!plan.is_partial);
        assert_eq!(None, plan.content_range());
    }

    #[test]
    fn test_malformed_policy() {
        let ignored = ServingPlan::compute(RangeHeader::Malformed, 1000, IGNORE).unwrap();
        assert_eq!(ServingPlan::full(1000), ignored);

        let rejected =
            ServingPlan::compute(RangeHeader::Malformed, 1000, MalformedRangePolicy::Reject);
        assert_matches!(rejected, Err(RangeNotSatisfiable(range)) if range == ContentRange::unsatisfied_bytes(1000));
    }

    #[test]
    fn test_suffix_form_is_malformed() {
        // no first byte position: outside the accepted grammar
        for header in ["bytes=-100", "bytes=-5000", "bytes=-0"] {
            assert_eq!(ServingPlan::full(1000), plan(header, 1000).unwrap(), "{header}");
        }

        let rejected = ServingPlan::compute(
            RangeHeader::parse(Some("bytes=-100")),
            1000,
            MalformedRangePolicy::Reject,
        );
        assert_matches!(rejected, Err(RangeNotSatisfiable(range)) if range == ContentRange::unsatisfied_bytes(1000));
    }

    #[test]
    fn test_empty_resource() {
        let plan_ = ServingPlan::compute(RangeHeader::Absent, 0, IGNORE).unwrap();
        assert_eq!(0, plan_.content_length());
        assert!(plan("bytes=0-", 0).is_err());
    }
}
