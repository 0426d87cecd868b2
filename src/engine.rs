use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Forum software detected on a target.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ForumEngine {
    XenForo,
    #[serde(rename = "MyBB")]
    MyBb,
    WordPress,
    Machina,
    #[serde(rename = "RansomEXX-Custom")]
    RansomExxCustom,
    Unknown,
}

impl ForumEngine {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::XenForo => "XenForo",
            Self::MyBb => "MyBB",
            Self::WordPress => "WordPress",
            Self::Machina => "Machina",
            Self::RansomExxCustom => "RansomEXX-Custom",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ForumEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ForumEngine {
    type Err = std::convert::Infallible;

    /// Names outside the table map to `Unknown`.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let engine = SIGNATURES
            .iter()
            .map(|(_, engine)| *engine)
            .find(|engine| engine.as_str() == raw)
            .unwrap_or(Self::Unknown);
        Ok(engine)
    }
}

/// Checked in this order; the first substring found decides.
pub const SIGNATURES: &[(&str, ForumEngine)] = &[
    (r#"id="XF""#, ForumEngine::XenForo),
    ("my_post_key", ForumEngine::MyBb),
    ("wp-content", ForumEngine::WordPress),
    ("machina", ForumEngine::Machina),
    ("milligram.css", ForumEngine::RansomExxCustom),
];

pub fn identify(html: &str) -> ForumEngine {
    SIGNATURES
        .iter()
        .find(|(signature, _)| html.contains(signature))
        .map(|(_, engine)| *engine)
        .unwrap_or(ForumEngine::Unknown)
}
