use std::path::Path;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::app::model::Severity;

const DEFAULT_POLICY_YAML: &str = include_str!("../config/severity.yaml");

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeywordTier {
    pub tier: Severity,
    pub keywords: Vec<String>,
}

/// Ordered keyword tiers. Evaluation walks `tiers` front to back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeverityPolicy {
    pub tiers: Vec<KeywordTier>,
}

impl Default for SeverityPolicy {
    fn default() -> Self {
        Self::from_yaml(DEFAULT_POLICY_YAML).expect("embedded severity policy is valid")
    }
}

impl SeverityPolicy {
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let policy: Self = serde_yaml::from_str(yaml).context("parse severity policy yaml")?;
        policy.validate()?;
        Ok(policy)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("read severity policy: {}", path.display()))?;
        Self::from_yaml(&yaml).with_context(|| format!("load severity policy: {}", path.display()))
    }

    fn validate(&self) -> anyhow::Result<()> {
        let mut previous: Option<Severity> = None;
        for tier in &self.tiers {
            if tier.tier == Severity::Unassigned {
                anyhow::bail!("`unassigned` is the fallback and cannot carry keywords");
            }
            if let Some(previous) = previous
                && tier.tier <= previous
            {
                anyhow::bail!(
                    "tier {} must come after {previous}: tiers are listed high, medium, low without repeats",
                    tier.tier
                );
            }
            previous = Some(tier.tier);

            for keyword in &tier.keywords {
                if keyword.is_empty() {
                    anyhow::bail!("tier {} contains an empty keyword", tier.tier);
                }
                if keyword.chars().any(char::is_uppercase) {
                    tracing::warn!(
                        tier = %tier.tier,
                        keyword = %keyword,
                        "keyword has upper-case letters and never matches lower-cased text"
                    );
                }
            }
        }
        Ok(())
    }

    pub fn classify(&self, text: &str) -> Severity {
        let normalized = text.to_lowercase();
        self.tiers
            .iter()
            .find(|tier| {
                tier.keywords
                    .iter()
                    .any(|keyword| normalized.contains(keyword.as_str()))
            })
            .map(|tier| tier.tier)
            .unwrap_or(Severity::Unassigned)
    }
}
