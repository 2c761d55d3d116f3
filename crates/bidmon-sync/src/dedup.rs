//! Title-signature deduplication.

use std::collections::HashSet;

use bidmon_core::Opportunity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DedupConfig {
    pub signature_chars: usize,
    /// Signatures at or below this length are too weak to dedupe on.
    pub min_signature_chars: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            signature_chars: 100,
            min_signature_chars: 10,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DedupEngine {
    config: DedupConfig,
}

impl DedupEngine {
    pub fn new(config: DedupConfig) -> Self {
        Self { config }
    }

    pub fn signature(&self, title: &str) -> String {
        title
            .chars()
            .take(self.config.signature_chars)
            .flat_map(char::to_lowercase)
            .filter(|c| !c.is_whitespace() && *c != '-')
            .collect()
    }

    /// Keeps the first record of every signature, in discovery order.
    pub fn apply(&self, items: Vec<Opportunity>) -> Vec<Opportunity> {
        let mut seen = HashSet::new();
        items
            .into_iter()
            .filter(|item| {
                let sig = self.signature(&item.title);
                if sig.chars().count() <= self.config.min_signature_chars {
                    return true;
                }
                seen.insert(sig)
            })
            .collect()
    }
}
