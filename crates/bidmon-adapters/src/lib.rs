//! Source adapter contracts + link-extraction adapter implementations.

use std::sync::Arc;

use async_trait::async_trait;
use bidmon_core::{normalize_whitespace, KeywordMatcher, Opportunity, SourceLabel};
use bidmon_storage::{FetchError, PageFetcher};
use chrono::{DateTime, NaiveDate, Utc};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info_span, Instrument};
use url::Url;
use uuid::Uuid;

pub const CRATE_NAME: &str = "bidmon-adapters";

pub const MIN_LINK_TEXT_CHARS: usize = 15;
pub const MIN_LISTING_TEXT_CHARS: usize = 20;
pub const DEFAULT_SCAN_LIMIT: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterKind {
    /// Every `a[href]` on a server-rendered purchasing page.
    #[default]
    Links,
    /// Aggregator platforms listing many agencies as bid/solicitation rows.
    ListingScan,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterContext {
    pub run_id: Uuid,
    pub fetched_at: DateTime<Utc>,
}

impl AdapterContext {
    pub fn new(run_id: Uuid, fetched_at: DateTime<Utc>) -> Self {
        Self { run_id, fetched_at }
    }

    pub fn posted_date(&self) -> NaiveDate {
        self.fetched_at.date_naive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceTarget {
    pub url: String,
    pub label: SourceLabel,
}

// `final_url` is the address after redirects; relative links resolve against it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub final_url: String,
    pub html: String,
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("invalid page url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("{0}")]
    Message(String),
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn kind(&self) -> AdapterKind;

    async fn fetch_listing(
        &self,
        http: &dyn PageFetcher,
        target: &SourceTarget,
    ) -> Result<FetchedPage, AdapterError> {
        let resp = http.get(&target.url).await?;
        Ok(FetchedPage {
            html: resp.body_text(),
            final_url: resp.final_url,
        })
    }

    fn parse_listing(
        &self,
        page: &FetchedPage,
        label: &SourceLabel,
        ctx: &AdapterContext,
    ) -> Result<Vec<Opportunity>, AdapterError>;

    async fn collect(
        &self,
        http: &dyn PageFetcher,
        ctx: &AdapterContext,
        target: &SourceTarget,
    ) -> Result<Vec<Opportunity>, AdapterError> {
        let span = info_span!(
            "source_collect",
            run_id = %ctx.run_id,
            source = %target.label.name,
            kind = ?self.kind(),
        );
        async {
            let page = self.fetch_listing(http, target).await?;
            self.parse_listing(&page, &target.label, ctx)
        }
        .instrument(span)
        .await
    }
}

/// Matches every anchor on its own text plus its parent's text.
pub struct LinkAdapter {
    matcher: Arc<dyn KeywordMatcher>,
    min_text_chars: usize,
}

impl LinkAdapter {
    pub fn new(matcher: Arc<dyn KeywordMatcher>) -> Self {
        Self {
            matcher,
            min_text_chars: MIN_LINK_TEXT_CHARS,
        }
    }

    pub fn with_min_text_chars(mut self, min_text_chars: usize) -> Self {
        self.min_text_chars = min_text_chars;
        self
    }
}

pub struct ListingScanAdapter {
    matcher: Arc<dyn KeywordMatcher>,
    scan_limit: usize,
    min_text_chars: usize,
}

impl ListingScanAdapter {
    pub fn new(matcher: Arc<dyn KeywordMatcher>, scan_limit: usize) -> Self {
        Self {
            matcher,
            scan_limit,
            min_text_chars: MIN_LISTING_TEXT_CHARS,
        }
    }
}

fn selector(css: &str) -> Result<Selector, AdapterError> {
    Selector::parse(css).map_err(|e| AdapterError::Message(e.to_string()))
}

fn element_text(el: &ElementRef<'_>) -> String {
    normalize_whitespace(&el.text().collect::<Vec<_>>().join(" "))
}

// Anchors sitting directly in `body`/`html` get no context.
fn parent_context(link: &ElementRef<'_>) -> Option<String> {
    let parent = link.parent().and_then(ElementRef::wrap)?;
    if matches!(parent.value().name(), "body" | "html") {
        return None;
    }
    let text = element_text(&parent);
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn page_origin(page_url: &str) -> Result<Url, AdapterError> {
    Url::parse(page_url).map_err(|e| AdapterError::InvalidUrl {
        url: page_url.to_string(),
        reason: e.to_string(),
    })
}

/// Absolute hrefs pass through, root-relative ones join the page origin,
/// anything else falls back to the page URL.
pub fn resolve_href(href: &str, page_url: &Url) -> String {
    let href = href.trim();
    if href.starts_with("http") {
        return href.to_string();
    }
    if href.starts_with("//") {
        return format!("{}:{}", page_url.scheme(), href);
    }
    if href.starts_with('/') {
        return format!("{}{}", page_url.origin().ascii_serialization(), href);
    }
    page_url.to_string()
}

impl LinkAdapter {
    pub fn extract(
        &self,
        html: &str,
        page_url: &str,
        label: &SourceLabel,
        posted_date: NaiveDate,
    ) -> Result<Vec<Opportunity>, AdapterError> {
        let base = page_origin(page_url)?;
        let document = Html::parse_document(html);
        let links = selector("a[href]")?;

        let mut out = Vec::new();
        for link in document.select(&links) {
            let Some(href) = link.value().attr("href") else {
                continue;
            };
            let text = element_text(&link);
            if text.chars().count() <= self.min_text_chars {
                continue;
            }
            let context = parent_context(&link);
            let combined = match &context {
                Some(ctx) => format!("{text} {ctx}"),
                None => text.clone(),
            };
            if !self.matcher.matches(&combined) {
                continue;
            }
            out.push(Opportunity::from_link(
                label,
                &text,
                resolve_href(href, &base),
                context.as_deref(),
                posted_date,
            ));
        }
        debug!(source = %label.name, found = out.len(), "link adapter parsed page");
        Ok(out)
    }
}

#[async_trait]
impl SourceAdapter for LinkAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Links
    }

    fn parse_listing(
        &self,
        page: &FetchedPage,
        label: &SourceLabel,
        ctx: &AdapterContext,
    ) -> Result<Vec<Opportunity>, AdapterError> {
        self.extract(&page.html, &page.final_url, label, ctx.posted_date())
    }
}

fn is_listing_row(el: &ElementRef<'_>) -> bool {
    el.value().classes().any(|class| {
        let class = class.to_ascii_lowercase();
        class.contains("bid") || class.contains("solicitation")
    })
}

impl ListingScanAdapter {
    pub fn extract(
        &self,
        html: &str,
        page_url: &str,
        label: &SourceLabel,
        posted_date: NaiveDate,
    ) -> Result<Vec<Opportunity>, AdapterError> {
        let base = page_origin(page_url)?;
        let document = Html::parse_document(html);
        let rows = selector("div[class], tr[class]")?;
        let links = selector("a[href]")?;

        let mut out = Vec::new();
        for row in document
            .select(&rows)
            .filter(is_listing_row)
            .take(self.scan_limit)
        {
            let text = element_text(&row);
            if text.chars().count() <= self.min_text_chars || !self.matcher.matches(&text) {
                continue;
            }
            let Some(href) = row
                .select(&links)
                .next()
                .and_then(|a| a.value().attr("href"))
            else {
                continue;
            };
            out.push(Opportunity::from_link(
                label,
                &text,
                resolve_href(href, &base),
                None,
                posted_date,
            ));
        }
        debug!(source = %label.name, found = out.len(), scan_limit = self.scan_limit, "listing scan parsed page");
        Ok(out)
    }
}

#[async_trait]
impl SourceAdapter for ListingScanAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::ListingScan
    }

    fn parse_listing(
        &self,
        page: &FetchedPage,
        label: &SourceLabel,
        ctx: &AdapterContext,
    ) -> Result<Vec<Opportunity>, AdapterError> {
        self.extract(&page.html, &page.final_url, label, ctx.posted_date())
    }
}

pub fn adapter_for_kind(
    kind: AdapterKind,
    matcher: Arc<dyn KeywordMatcher>,
    scan_limit: Option<usize>,
) -> Box<dyn SourceAdapter> {
    match kind {
        AdapterKind::Links => Box::new(LinkAdapter::new(matcher)),
        AdapterKind::ListingScan => Box::new(ListingScanAdapter::new(
            matcher,
            scan_limit.unwrap_or(DEFAULT_SCAN_LIMIT),
        )),
    }
}
