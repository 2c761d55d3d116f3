//! Best-effort bid / solicitation number extraction.

use once_cell::sync::Lazy;
use regex::Regex;

// Checked in order; the first rule with any match wins.
static BID_NUMBER_RULES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)#[\dA-Z-]+",
        r"(?i)RFP[\s-]?[\dA-Z-]+",
        r"(?i)RFQ[\s-]?[\dA-Z-]+",
        r"(?i)BID[\s-]?[\dA-Z-]+",
        r"(?i)IFB[\s-]?[\dA-Z-]+",
        r"(?i)ITB[\s-]?[\dA-Z-]+",
        r"(?i)RFI[\s-]?[\dA-Z-]+",
        r"\d{4,}[-/]\d+",
        r"[A-Z]{2,}\s?\d{2,}",
    ]
    .into_iter()
    .map(|pattern| Regex::new(pattern).expect("bid number patterns are valid"))
    .collect()
});

/// Returns the first pattern hit in `text`, unmodified, or an empty string.
pub fn extract_bid_number(text: &str) -> String {
    BID_NUMBER_RULES
        .iter()
        .find_map(|rule| rule.find(text))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}
