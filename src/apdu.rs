//! APDU command headers and the per-instruction breakdown
//!
//! Command codes in the logs are hex dumps of the APDU sent to the card.
//! The first four bytes are the header (CLA INS P1 P2); grouping timings by
//! (CLA, INS) shows which card operation the time went to.

use crate::aggregate::SettingKey;
use crate::extract::Extraction;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Class byte of the credential applet's proprietary commands
pub const CLA_IRMACARD: u8 = 0x80;
/// Interindustry class byte
pub const CLA_ISO7816: u8 = 0x00;

/// Decoded APDU header
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ApduHeader {
    pub cla: u8,
    pub ins: u8,
    pub p1: u8,
    pub p2: u8,
}

impl ApduHeader {
    /// Decode the header from a hex command code
    ///
    /// Codes shorter than two bytes yield `None`; missing P1/P2 read as zero.
    pub fn parse(code: &str) -> Option<Self> {
        let hex_len = code.len().min(8) & !1;
        if hex_len < 4 {
            return None;
        }
        let bytes = hex::decode(code.get(..hex_len)?).ok()?;
        Some(Self {
            cla: bytes[0],
            ins: bytes[1],
            p1: bytes.get(2).copied().unwrap_or(0),
            p2: bytes.get(3).copied().unwrap_or(0),
        })
    }

    /// Key for grouping: class and instruction
    pub fn instruction(&self) -> Instruction {
        Instruction {
            cla: self.cla,
            ins: self.ins,
        }
    }
}

/// Class and instruction byte of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Instruction {
    pub cla: u8,
    pub ins: u8,
}

impl Instruction {
    /// Name of the instruction as the card applet knows it
    pub fn name(&self) -> Option<&'static str> {
        match (self.cla, self.ins) {
            (CLA_IRMACARD, 0x01) => Some("GENERATE_SECRET"),
            (CLA_IRMACARD, 0x02) => Some("AUTHENTICATION_SECRET"),
            (CLA_IRMACARD, 0x10) => Some("ISSUE_CREDENTIAL"),
            (CLA_IRMACARD, 0x11) => Some("ISSUE_PUBLIC_KEY"),
            (CLA_IRMACARD, 0x12) => Some("ISSUE_ATTRIBUTES"),
            (CLA_IRMACARD, 0x1A) => Some("ISSUE_COMMITMENT"),
            (CLA_IRMACARD, 0x1B) => Some("ISSUE_COMMITMENT_PROOF"),
            (CLA_IRMACARD, 0x1C) => Some("ISSUE_CHALLENGE"),
            (CLA_IRMACARD, 0x1D) => Some("ISSUE_SIGNATURE"),
            (CLA_IRMACARD, 0x1E) => Some("ISSUE_SIGNATURE_PROOF"),
            (CLA_IRMACARD, 0x20) => Some("PROVE_CREDENTIAL"),
            (CLA_IRMACARD, 0x2A) => Some("PROVE_COMMITMENT"),
            (CLA_IRMACARD, 0x2B) => Some("PROVE_SIGNATURE"),
            (CLA_IRMACARD, 0x2C) => Some("PROVE_ATTRIBUTE"),
            (CLA_IRMACARD, 0x30) => Some("ADMIN_CREDENTIAL"),
            (CLA_IRMACARD, 0x31) => Some("ADMIN_REMOVE"),
            (CLA_IRMACARD, 0x32) => Some("ADMIN_ATTRIBUTE"),
            (CLA_IRMACARD, 0x33) => Some("ADMIN_FLAGS"),
            (CLA_IRMACARD, 0x3A) => Some("ADMIN_CREDENTIALS"),
            (CLA_IRMACARD, 0x3B) => Some("ADMIN_LOG"),
            (CLA_ISO7816, 0x20) => Some("VERIFY"),
            (CLA_ISO7816, 0x24) => Some("CHANGE_REFERENCE_DATA"),
            (CLA_ISO7816, 0x82) => Some("EXTERNAL_AUTHENTICATE"),
            (CLA_ISO7816, 0x88) => Some("INTERNAL_AUTHENTICATE"),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}{:02X}", self.cla, self.ins)?;
        if let Some(name) = self.name() {
            write!(f, " {}", name)?;
        }
        Ok(())
    }
}

/// Count and summed time of one instruction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CommandStats {
    pub count: u64,
    pub total_ms: u64,
}

impl CommandStats {
    pub fn mean_ms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_ms as f64 / self.count as f64
        }
    }
}

/// Per-setting timing grouped by instruction
#[derive(Debug, Clone, Default)]
pub struct CommandBreakdown {
    settings: BTreeMap<SettingKey, BTreeMap<Instruction, CommandStats>>,
    undecodable: u64,
}

impl CommandBreakdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add every tagged record of a scanned log
    pub fn ingest(&mut self, setting: SettingKey, extraction: &Extraction) {
        let per_setting = self.settings.entry(setting).or_default();
        let commands = extraction
            .rounds
            .iter()
            .flat_map(|r| r.records.iter())
            .filter_map(|r| r.command.as_deref().map(|c| (c, r.duration_ms)));

        for (code, ms) in commands {
            match ApduHeader::parse(code) {
                Some(header) => {
                    let entry = per_setting.entry(header.instruction()).or_default();
                    entry.count = entry.count.saturating_add(1);
                    entry.total_ms = entry.total_ms.saturating_add(ms);
                }
                None => self.undecodable = self.undecodable.saturating_add(1),
            }
        }
    }

    pub fn settings(&self) -> &BTreeMap<SettingKey, BTreeMap<Instruction, CommandStats>> {
        &self.settings
    }

    /// Command codes too short to hold a header
    pub fn undecodable(&self) -> u64 {
        self.undecodable
    }

    /// Plain-text table, one block per setting
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (setting, commands) in &self.settings {
            out.push_str(&format!("\nSetting {}:\n", setting));
            out.push_str(&format!(
                "{:<32} {:>6} {:>10} {:>10}\n",
                "instruction", "calls", "total ms", "mean ms"
            ));
            for (ins, stats) in commands {
                out.push_str(&format!(
                    "{:<32} {:>6} {:>10} {:>10.1}\n",
                    ins.to_string(),
                    stats.count,
                    stats.total_ms,
                    stats.mean_ms()
                ));
            }
        }
        if self.undecodable > 0 {
            out.push_str(&format!("\nUndecodable commands: {}\n", self.undecodable));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::Bucket;
    use crate::extract::{ExtractStats, Round, ScanOutcome, TimingRecord};

    fn record(code: Option<&str>, ms: u64) -> TimingRecord {
        TimingRecord {
            command: code.map(str::to_string),
            duration_ms: ms,
            bucket: Bucket::Overhead,
        }
    }

    #[test]
    fn test_parse_header() {
        let h = ApduHeader::parse("802A0100FF").unwrap();
        assert_eq!(
            h,
            ApduHeader {
                cla: 0x80,
                ins: 0x2A,
                p1: 0x01,
                p2: 0x00
            }
        );
        assert_eq!(h.instruction().name(), Some("PROVE_COMMITMENT"));
    }

    #[test]
    fn test_parse_short_codes() {
        assert_eq!(
            ApduHeader::parse("8022"),
            Some(ApduHeader {
                cla: 0x80,
                ins: 0x22,
                p1: 0,
                p2: 0
            })
        );
        assert_eq!(ApduHeader::parse("80"), None);
        assert_eq!(ApduHeader::parse("80221"), ApduHeader::parse("8022"));
    }

    #[test]
    fn test_instruction_display() {
        let known = Instruction { cla: 0x00, ins: 0x20 };
        assert_eq!(known.to_string(), "0020 VERIFY");
        let unknown = Instruction { cla: 0x80, ins: 0x22 };
        assert_eq!(unknown.to_string(), "8022");
    }

    #[test]
    fn test_breakdown_groups_by_instruction() {
        let extraction = Extraction {
            rounds: vec![
                Round {
                    disclosed: 1,
                    records: vec![
                        record(Some("802A0000"), 100),
                        record(Some("802A0100"), 50),
                        record(Some("802B0000"), 7),
                    ],
                },
                Round {
                    disclosed: 2,
                    records: vec![record(None, 300), record(Some("80"), 1)],
                },
            ],
            outcome: ScanOutcome::Completed,
            stats: ExtractStats::default(),
        };

        let mut breakdown = CommandBreakdown::new();
        breakdown.ingest(3, &extraction);

        let commands = &breakdown.settings()[&3];
        let commit = commands[&Instruction { cla: 0x80, ins: 0x2A }];
        assert_eq!(commit.count, 2);
        assert_eq!(commit.total_ms, 150);
        assert_eq!(commit.mean_ms(), 75.0);
        assert_eq!(commands.len(), 2);
        assert_eq!(breakdown.undecodable(), 1);

        let text = breakdown.render();
        assert!(text.contains("Setting 3:"));
        assert!(text.contains("802A PROVE_COMMITMENT"));
        assert!(text.contains("Undecodable commands: 1"));
    }

    #[test]
    fn test_breakdown_saturates() {
        let extraction = Extraction {
            rounds: vec![Round {
                disclosed: 0,
                records: vec![record(Some("80220000"), u64::MAX), record(Some("80220000"), 1)],
            }],
            outcome: ScanOutcome::Completed,
            stats: ExtractStats::default(),
        };

        let mut breakdown = CommandBreakdown::new();
        breakdown.ingest(1, &extraction);
        let stats = breakdown.settings()[&1][&Instruction { cla: 0x80, ins: 0x22 }];
        assert_eq!(stats.count, 2);
        assert_eq!(stats.total_ms, u64::MAX);
        assert!(!breakdown.render().contains("Undecodable"));
    }
}
