//! Core domain model for the public bid monitor.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

mod identifier;
mod keywords;

pub use identifier::extract_bid_number;
pub use keywords::{KeywordMatcher, SubstringMatcher, CORE_KEYWORDS, EXTENDED_KEYWORDS};

pub const CRATE_NAME: &str = "bidmon-core";

pub const MAX_TITLE_CHARS: usize = 250;
pub const MAX_DESCRIPTION_CHARS: usize = 300;

/// Level of government that issued a posting. Bound to the source, never inferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum JurisdictionType {
    Municipal,
    County,
    State,
}

impl JurisdictionType {
    pub const ALL: [JurisdictionType; 3] = [
        JurisdictionType::Municipal,
        JurisdictionType::County,
        JurisdictionType::State,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JurisdictionType::Municipal => "Municipal",
            JurisdictionType::County => "County",
            JurisdictionType::State => "State",
        }
    }
}

impl fmt::Display for JurisdictionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Opportunity {
    pub source: String,
    pub title: String,
    pub url: String,
    /// Date of the run that discovered the link, not the site's own posting date.
    pub posted_date: NaiveDate,
    pub location: String,
    #[serde(rename = "type")]
    pub jurisdiction_type: JurisdictionType,
    pub bid_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLabel {
    pub name: String,
    pub location: String,
    pub jurisdiction_type: JurisdictionType,
}

impl Opportunity {
    pub fn from_link(
        label: &SourceLabel,
        text: &str,
        url: String,
        context: Option<&str>,
        posted_date: NaiveDate,
    ) -> Self {
        let title = truncate_chars(text, MAX_TITLE_CHARS);
        let description = context
            .filter(|ctx| ctx.chars().count() > text.chars().count())
            .map(|ctx| truncate_chars(ctx, MAX_DESCRIPTION_CHARS));
        Self {
            source: label.name.clone(),
            title,
            url,
            posted_date,
            location: label.location.clone(),
            jurisdiction_type: label.jurisdiction_type,
            bid_number: extract_bid_number(text),
            description,
        }
    }
}

pub fn truncate_chars(input: &str, max: usize) -> String {
    match input.char_indices().nth(max) {
        Some((idx, _)) => input[..idx].to_string(),
        None => input.to_string(),
    }
}

pub fn normalize_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label() -> SourceLabel {
        SourceLabel {
            name: "City of Cleveland".into(),
            location: "Cleveland, OH".into(),
            jurisdiction_type: JurisdictionType::Municipal,
        }
    }

    fn run_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("short", 250), "short");
        assert_eq!(truncate_chars("", 5), "");
    }

    #[test]
    fn from_link_caps_title_and_sets_bid_number() {
        let long = format!("Bid #CLV-2026-0045 Storm Sewer Cleaning {}", "x".repeat(300));
        let opp = Opportunity::from_link(&label(), &long, "https://example.gov/b".into(), None, run_date());
        assert_eq!(opp.title.chars().count(), MAX_TITLE_CHARS);
        assert_eq!(opp.bid_number, "#CLV-2026-0045");
        assert_eq!(opp.jurisdiction_type, JurisdictionType::Municipal);
        assert_eq!(opp.location, "Cleveland, OH");
        assert!(opp.description.is_none());
    }

    #[test]
    fn description_only_kept_when_context_is_longer() {
        let text = "Catch Basin Cleaning Services";
        let short_ctx = Opportunity::from_link(&label(), text, "u".into(), Some(text), run_date());
        assert!(short_ctx.description.is_none());

        let ctx = format!("{text} - due November 3, pre-bid meeting at City Hall");
        let with_ctx = Opportunity::from_link(&label(), text, "u".into(), Some(&ctx), run_date());
        assert_eq!(with_ctx.description.as_deref(), Some(ctx.as_str()));

        let huge = "y".repeat(1000);
        let capped = Opportunity::from_link(&label(), text, "u".into(), Some(&huge), run_date());
        assert_eq!(capped.description.unwrap().chars().count(), MAX_DESCRIPTION_CHARS);
    }

    #[test]
    fn serializes_with_wire_field_names() {
        let opp = Opportunity::from_link(&label(), "Sanitary Sewer Jetting RFP-77", "u".into(), None, run_date());
        let value = serde_json::to_value(&opp).unwrap();
        assert_eq!(value["type"], "Municipal");
        assert_eq!(value["posted_date"], "2026-10-19");
        assert_eq!(value["bid_number"], "RFP-77");
        assert!(value.get("description").is_none());
    }
}
