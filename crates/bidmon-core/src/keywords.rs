//! Keyword relevance matching.

/// Original stormwater / sewer / vac-truck vocabulary.
pub const CORE_KEYWORDS: &[&str] = &[
    "stormwater",
    "storm water",
    "drainage",
    "sewer",
    "vac truck",
    "vacuum truck",
    "vactor",
    "hydro excavation",
    "cleaning",
    "street cleaning",
    "catch basin",
    "storm drain",
    "jetting",
    "pipe cleaning",
    "sanitary sewer",
    "sweeping",
    "npdes",
    "ms4",
    "erosion control",
];

pub const EXTENDED_KEYWORDS: &[&str] = &[
    // stormwater
    "stormwater",
    "storm water",
    "storm drain",
    "storm sewer",
    "drainage",
    "culvert",
    "catch basin",
    "inlet cleaning",
    "detention basin",
    "retention pond",
    "bioswale",
    "outfall",
    "npdes",
    "ms4",
    "erosion control",
    "sediment removal",
    "green infrastructure",
    // sewer
    "sewer",
    "sanitary sewer",
    "combined sewer",
    "sewer main",
    "force main",
    "manhole",
    "lift station",
    "pump station",
    "wet well",
    "grease trap",
    // equipment
    "vac truck",
    "vacuum truck",
    "vactor",
    "combination truck",
    "jet truck",
    "jet vac",
    "hydro excavation",
    "hydrovac",
    "daylighting",
    "street sweeper",
    // cleaning / maintenance
    "cleaning",
    "pipe cleaning",
    "street cleaning",
    "jetting",
    "hydro jetting",
    "sweeping",
    "flushing",
    "root cutting",
    "debris removal",
    "sludge removal",
    "vacuum services",
    // inspection
    "cctv",
    "televising",
    "video inspection",
    "pipe inspection",
    "sewer inspection",
    "smoke testing",
    "condition assessment",
    "pacp",
    // rehabilitation
    "cipp",
    "cured-in-place",
    "pipe lining",
    "pipe bursting",
    "manhole rehabilitation",
    "sewer rehabilitation",
    "pipe rehabilitation",
    "grouting",
    "slip lining",
    // water infrastructure / public works
    "water main",
    "wastewater",
    "infiltration",
    "inflow",
    "utility maintenance",
    "underground utilities",
    "public works",
];

pub trait KeywordMatcher: Send + Sync {
    fn matches(&self, text: &str) -> bool;
}

// Case-insensitive substring match, no word boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubstringMatcher {
    keywords: Vec<String>,
}

impl SubstringMatcher {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        Self { keywords }
    }

    pub fn core() -> Self {
        Self::new(CORE_KEYWORDS)
    }

    pub fn extended() -> Self {
        Self::new(EXTENDED_KEYWORDS)
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }
}

impl Default for SubstringMatcher {
    fn default() -> Self {
        Self::extended()
    }
}

impl KeywordMatcher for SubstringMatcher {
    fn matches(&self, text: &str) -> bool {
        if text.is_empty() {
            return false;
        }
        let lower = text.to_lowercase();
        self.keywords.iter().any(|k| lower.contains(k.as_str()))
    }
}
