use std::fmt;

use serde::{Deserialize, Serialize};

/// The industries the pipeline keeps. Everything else is dropped before any
/// statistics are computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Industry {
    #[serde(rename = "Banks - Diversified")]
    BanksDiversified,
    #[serde(rename = "Software - Application")]
    SoftwareApplication,
    #[serde(rename = "Consumer Electronics")]
    ConsumerElectronics,
}

impl Industry {
    pub const ALL: [Industry; 3] = [
        Industry::BanksDiversified,
        Industry::SoftwareApplication,
        Industry::ConsumerElectronics,
    ];

    /// Canonical label as reported by the remote API.
    pub fn as_str(&self) -> &'static str {
        match self {
            Industry::BanksDiversified => "Banks - Diversified",
            Industry::SoftwareApplication => "Software - Application",
            Industry::ConsumerElectronics => "Consumer Electronics",
        }
    }

    /// Match a free-form industry label against the allow-list.
    ///
    /// Case, whitespace and dash style are ignored, so "Banks–Diversified"
    /// and "banks - diversified" both resolve to `BanksDiversified`.
    pub fn parse(label: &str) -> Option<Industry> {
        let key = normalize(label);
        Industry::ALL
            .into_iter()
            .find(|industry| normalize(industry.as_str()) == key)
    }
}

impl fmt::Display for Industry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn normalize(label: &str) -> String {
    label
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| match c {
            '\u{2010}'..='\u{2015}' | '\u{2212}' => '-',
            other => other.to_ascii_lowercase(),
        })
        .collect()
}
