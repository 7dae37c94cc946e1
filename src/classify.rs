//! Tagging of raw log lines
//!
//! The extractor never looks at raw text. Every line is first turned into a
//! [`LogLine`] by a [`Classifier`] built from the variant's markers.

use crate::error::{CardlogError, Result};
use crate::variant::Markers;
use regex::Regex;

/// A classified log line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLine<'a> {
    /// Start of the presentation phase
    Presenting,
    /// Start of a disclosure round; `None` when the count is unreadable
    RoundStart { disclosed: Option<u32> },
    /// Proof specification header printed inside a round
    ProofSpecification,
    /// End of the presentation phase
    Completed,
    /// A command sent to the card, identified by its hex code
    Command { code: &'a str },
    /// Timing of the preceding command; `None` when the value is not an integer
    Duration { ms: Option<u64> },
    /// Anything else
    Other,
}

/// Turns text lines into [`LogLine`]s using substring markers
#[derive(Debug, Clone)]
pub struct Classifier {
    markers: Markers,
    disclosing: Regex,
    command: Regex,
    duration: Regex,
}

impl Classifier {
    /// Build a classifier for a marker set
    pub fn new(markers: &Markers) -> Result<Self> {
        let compile = |pattern: String| {
            Regex::new(&pattern).map_err(|e| CardlogError::InvalidConfig(e.to_string()))
        };

        Ok(Self {
            disclosing: compile(format!(r"{}\s*(\d+)", regex::escape(&markers.disclosing)))?,
            command: compile(format!(r"{}([0-9A-Fa-f]+)", regex::escape(&markers.command)))?,
            duration: compile(format!(r"{}\s*(\d+)", regex::escape(&markers.duration)))?,
            markers: markers.clone(),
        })
    }

    /// Classify one line
    ///
    /// Section markers take precedence over command and duration markers.
    pub fn classify<'a>(&self, line: &'a str) -> LogLine<'a> {
        let m = &self.markers;

        if line.contains(m.completed.as_str()) {
            return LogLine::Completed;
        }
        if line.contains(m.presenting.as_str()) {
            return LogLine::Presenting;
        }
        if line.contains(m.disclosing.as_str()) {
            let disclosed = self
                .disclosing
                .captures(line)
                .and_then(|c| c[1].parse().ok());
            return LogLine::RoundStart { disclosed };
        }
        if !m.proof_specification.is_empty() && line.contains(m.proof_specification.as_str()) {
            return LogLine::ProofSpecification;
        }
        if let Some(code) = self.command.captures(line).and_then(|c| c.get(1)) {
            return LogLine::Command {
                code: code.as_str(),
            };
        }
        if line.contains(m.duration.as_str()) {
            let ms = self
                .duration
                .captures(line)
                .and_then(|c| c[1].parse().ok());
            return LogLine::Duration { ms };
        }

        LogLine::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> Classifier {
        Classifier::new(&Markers::default()).unwrap()
    }

    #[test]
    fn test_section_markers() {
        let c = classifier();
        assert_eq!(c.classify("### Presenting credentials"), LogLine::Presenting);
        assert_eq!(
            c.classify("### Disclosing 3 attributes"),
            LogLine::RoundStart { disclosed: Some(3) }
        );
        assert_eq!(
            c.classify("Proof Specification: ..."),
            LogLine::ProofSpecification
        );
        assert_eq!(
            c.classify("Presentation completed successfully"),
            LogLine::Completed
        );
    }

    #[test]
    fn test_unreadable_disclosure_count() {
        let c = classifier();
        assert_eq!(
            c.classify("### Disclosing all attributes"),
            LogLine::RoundStart { disclosed: None }
        );
    }

    #[test]
    fn test_command_code() {
        let c = classifier();
        assert_eq!(
            c.classify("C: 802200000A0102"),
            LogLine::Command {
                code: "802200000A0102"
            }
        );
        assert_eq!(
            c.classify("  C: 801a0200 (commitment)"),
            LogLine::Command { code: "801a0200" }
        );
    }

    #[test]
    fn test_command_marker_without_hex_is_other() {
        let c = classifier();
        assert_eq!(c.classify("C: --"), LogLine::Other);
    }

    #[test]
    fn test_duration() {
        let c = classifier();
        assert_eq!(
            c.classify(" duration: 142 ms"),
            LogLine::Duration { ms: Some(142) }
        );
        assert_eq!(
            c.classify(" duration:7ms"),
            LogLine::Duration { ms: Some(7) }
        );
    }

    #[test]
    fn test_malformed_duration() {
        let c = classifier();
        assert_eq!(
            c.classify(" duration: n/a ms"),
            LogLine::Duration { ms: None }
        );
        assert_eq!(
            c.classify(" duration: 99999999999999999999999 ms"),
            LogLine::Duration { ms: None }
        );
    }

    #[test]
    fn test_other() {
        let c = classifier();
        assert_eq!(c.classify("R: 9000"), LogLine::Other);
        assert_eq!(c.classify(""), LogLine::Other);
    }

    #[test]
    fn test_custom_markers() {
        let markers = Markers {
            command: "APDU> ".to_string(),
            duration: "took".to_string(),
            ..Markers::default()
        };
        let c = Classifier::new(&markers).unwrap();
        assert_eq!(c.classify("APDU> 8022"), LogLine::Command { code: "8022" });
        assert_eq!(c.classify("took 12 ms"), LogLine::Duration { ms: Some(12) });
        assert_eq!(c.classify("C: 8022"), LogLine::Other);
    }
}
