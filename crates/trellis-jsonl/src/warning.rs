//! Warning types for non-fatal errors during JSONL reads.
//!
//! [`read_jsonl_resilient`](crate::read_jsonl_resilient) keeps going past
//! lines it cannot use and reports each one as a [`Warning`].

use std::fmt;

/// A non-fatal problem found while reading a JSONL file.
///
/// Each variant carries the 1-based physical line number so the caller can
/// point a user at the offending record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// A non-empty line was not valid JSON for the requested record type.
    MalformedJson {
        /// The 1-based line number where the error occurred.
        line_number: usize,
        /// The parser message.
        error: String,
    },

    /// A line was skipped for a reason other than malformed JSON.
    SkippedLine {
        /// The 1-based line number that was skipped.
        line_number: usize,
        /// Why the line was skipped.
        reason: String,
    },
}

impl Warning {
    /// Returns the line number associated with this warning.
    #[must_use]
    pub fn line_number(&self) -> usize {
        match self {
            Self::MalformedJson { line_number, .. } | Self::SkippedLine { line_number, .. } => {
                *line_number
            }
        }
    }

    /// Returns a human-readable description of the warning.
    ///
    /// # Examples
    ///
    /// ```
    /// use trellis_jsonl::Warning;
    ///
    /// let warning = Warning::MalformedJson {
    ///     line_number: 5,
    ///     error: "unexpected end of input".to_string(),
    /// };
    /// assert_eq!(warning.description(), "line 5: malformed JSON: unexpected end of input");
    /// ```
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::MalformedJson { line_number, error } => {
                format!("line {line_number}: malformed JSON: {error}")
            }
            Self::SkippedLine {
                line_number,
                reason,
            } => format!("line {line_number}: skipped: {reason}"),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::malformed(Warning::MalformedJson { line_number: 3, error: "eof".into() }, 3)]
    #[case::skipped(Warning::SkippedLine { line_number: 9, reason: "utf8".into() }, 9)]
    fn line_number_is_reported(#[case] warning: Warning, #[case] expected: usize) {
        assert_eq!(warning.line_number(), expected);
    }

    #[test]
    fn display_matches_description() {
        let warning = Warning::SkippedLine {
            line_number: 2,
            reason: "invalid UTF-8".to_string(),
        };
        assert_eq!(warning.to_string(), "line 2: skipped: invalid UTF-8");
    }
}
