//! Parsing of Valgrind-style memory trace lines.
//!
//! A record is `<kind> <hex-address>[,<size>]` with kind one of `L`, `S`,
//! `M`. Leading whitespace is tolerated, as is the trailing size field that
//! existing trace files carry; the size plays no part in the simulation.

use cache::AccessKind;
use snafu::{Location, ResultExt as _, Snafu};

/// One memory access recorded in a trace file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceEvent {
    pub kind: AccessKind,
    pub addr: u64,
}

/// Error produced for a line that is not a trace record.
#[derive(Debug, Snafu)]
pub enum TraceError {
    #[snafu(display("expected an access kind in {{L, S, M}}: {line:?}"))]
    UnknownKind {
        line: String,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("expected a hexadecimal address: {line:?}"))]
    InvalidAddress {
        line: String,
        source: core::num::ParseIntError,
        #[snafu(implicit)]
        location: Location,
    },
}

/// Parses one trace line into a [`TraceEvent`].
///
/// # Errors
///
/// Fails on any line that is not a well-formed record; the error names the
/// offending line.
pub fn parse_line(line: &str) -> Result<TraceEvent, TraceError> {
    let rest = line.trim_start();
    let (kind, rest) = match rest.split_at_checked(1) {
        Some(("L", rest)) => (AccessKind::Load, rest),
        Some(("S", rest)) => (AccessKind::Store, rest),
        Some(("M", rest)) => (AccessKind::Modify, rest),
        _ => return UnknownKindSnafu { line }.fail(),
    };
    let hex = match rest.trim().split_once(',') {
        Some((hex, _size)) => hex,
        None => rest.trim(),
    };
    let addr = u64::from_str_radix(hex, 16).context(InvalidAddressSnafu { line })?;
    Ok(TraceEvent { kind, addr })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_record() {
        let event = parse_line("L 7fef8").unwrap();
        assert_eq!(
            event,
            TraceEvent {
                kind: AccessKind::Load,
                addr: 0x7fef8,
            }
        );
    }

    #[test]
    fn test_parse_tolerates_leading_whitespace_and_size() {
        let event = parse_line("  S ffff,4").unwrap();
        assert_eq!(
            event,
            TraceEvent {
                kind: AccessKind::Store,
                addr: 0xffff,
            }
        );

        let event = parse_line(" M 20,8").unwrap();
        assert_eq!(event.kind, AccessKind::Modify);
        assert_eq!(event.addr, 0x20);
    }

    #[test]
    fn test_parse_rejects_unknown_kind() {
        assert!(matches!(
            parse_line("X 10").unwrap_err(),
            TraceError::UnknownKind { .. }
        ));
        assert!(matches!(
            parse_line("").unwrap_err(),
            TraceError::UnknownKind { .. }
        ));
    }

    #[test]
    fn test_parse_rejects_bad_address() {
        assert!(matches!(
            parse_line("L nope").unwrap_err(),
            TraceError::InvalidAddress { .. }
        ));
        assert!(matches!(
            parse_line("L").unwrap_err(),
            TraceError::InvalidAddress { .. }
        ));
    }
}
