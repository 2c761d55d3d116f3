//! Sync pipeline orchestration: registry, sequential aggregation, dedup,
//! snapshot publication and the fixed-interval scheduler.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bidmon_adapters::{adapter_for_kind, AdapterContext, AdapterKind, SourceTarget};
use bidmon_core::{
    JurisdictionType, KeywordMatcher, Opportunity, SourceLabel, SubstringMatcher, CORE_KEYWORDS,
    EXTENDED_KEYWORDS,
};
use bidmon_storage::{
    HttpClientConfig, HttpFetcher, PageFetcher, RequestPacer, Snapshot, SnapshotStore, DEFAULT_USER_AGENT,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};
use uuid::Uuid;

mod dedup;
mod export;

pub use dedup::{DedupConfig, DedupEngine};
pub use export::{write_exports, ExportManifest, ExportManifestFile};

pub const CRATE_NAME: &str = "bidmon-sync";

#[derive(Debug, Clone, Deserialize)]
pub struct SourceRegistry {
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub source_id: String,
    pub display_name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub adapter: AdapterKind,
    pub url: String,
    pub location: String,
    #[serde(rename = "type")]
    pub jurisdiction_type: JurisdictionType,
    #[serde(default)]
    pub scan_limit: Option<usize>,
}

fn default_enabled() -> bool {
    true
}

impl SourceConfig {
    pub fn target(&self) -> SourceTarget {
        SourceTarget {
            url: self.url.clone(),
            label: SourceLabel {
                name: self.display_name.clone(),
                location: self.location.clone(),
                jurisdiction_type: self.jurisdiction_type,
            },
        }
    }
}

impl SourceRegistry {
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("parsing source registry")
    }

    pub fn enabled(&self) -> impl Iterator<Item = &SourceConfig> {
        self.sources.iter().filter(|s| s.enabled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Vocabulary {
    Core,
    Extended,
}

#[derive(Debug, Clone, Deserialize)]
struct KeywordRulesFile {
    #[serde(default)]
    vocabulary: Option<Vocabulary>,
    #[serde(default)]
    keywords: Vec<String>,
}

// Extra keywords add to the named vocabulary; with none named they replace it.
pub fn load_keyword_matcher(workspace_root: &Path) -> Result<SubstringMatcher> {
    let path = workspace_root.join("rules").join("keywords.yaml");
    if !path.exists() {
        return Ok(SubstringMatcher::extended());
    }
    let text = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    let rules: KeywordRulesFile =
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;

    let base: &[&str] = match rules.vocabulary {
        Some(Vocabulary::Core) => CORE_KEYWORDS,
        Some(Vocabulary::Extended) => EXTENDED_KEYWORDS,
        None if rules.keywords.is_empty() => EXTENDED_KEYWORDS,
        None => &[],
    };
    let mut keywords = base.iter().map(|k| k.to_string()).collect::<Vec<_>>();
    for extra in rules.keywords {
        if !keywords.iter().any(|k| k.eq_ignore_ascii_case(&extra)) {
            keywords.push(extra);
        }
    }
    Ok(SubstringMatcher::new(keywords))
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub workspace_root: PathBuf,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub request_delay_ms: u64,
    pub scheduler_enabled: bool,
    pub sync_interval_secs: u64,
    pub web_port: u16,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            workspace_root: PathBuf::from("."),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            http_timeout_secs: 15,
            request_delay_ms: 2_000,
            scheduler_enabled: true,
            sync_interval_secs: 6 * 60 * 60,
            web_port: 8000,
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            workspace_root: std::env::var("BIDMON_WORKSPACE_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.workspace_root),
            user_agent: std::env::var("BIDMON_USER_AGENT").unwrap_or(defaults.user_agent),
            http_timeout_secs: env_parse("BIDMON_HTTP_TIMEOUT_SECS").unwrap_or(defaults.http_timeout_secs),
            request_delay_ms: env_parse("BIDMON_REQUEST_DELAY_MS").unwrap_or(defaults.request_delay_ms),
            scheduler_enabled: std::env::var("BIDMON_SCHEDULER_ENABLED")
                .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
                .unwrap_or(defaults.scheduler_enabled),
            sync_interval_secs: env_parse("BIDMON_SYNC_INTERVAL_SECS").unwrap_or(defaults.sync_interval_secs),
            web_port: env_parse("BIDMON_WEB_PORT").unwrap_or(defaults.web_port),
        }
    }

    pub fn registry_path(&self) -> PathBuf {
        self.workspace_root.join("sources.yaml")
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.workspace_root.join("reports")
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFailure {
    pub source_id: String,
    pub display_name: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sources_attempted: usize,
    pub sources_failed: Vec<SourceFailure>,
    pub candidates: usize,
    pub unique: usize,
    pub duplicates_removed: usize,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub summary: RunSummary,
    pub opportunities: Vec<Opportunity>,
}

impl RunOutcome {
    pub fn into_snapshot(self) -> Snapshot {
        Snapshot::new(self.opportunities, self.summary.finished_at, self.summary.run_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Statistics {
    pub total: usize,
    pub by_type: BTreeMap<JurisdictionType, usize>,
    pub by_source: BTreeMap<String, usize>,
}

impl Statistics {
    pub fn count(&self, kind: JurisdictionType) -> usize {
        self.by_type.get(&kind).copied().unwrap_or(0)
    }
}

pub fn statistics(opportunities: &[Opportunity]) -> Statistics {
    let mut by_type = JurisdictionType::ALL
        .into_iter()
        .map(|t| (t, 0usize))
        .collect::<BTreeMap<_, _>>();
    let mut by_source = BTreeMap::<String, usize>::new();
    for o in opportunities {
        *by_type.entry(o.jurisdiction_type).or_default() += 1;
        *by_source.entry(o.source.clone()).or_default() += 1;
    }
    Statistics {
        total: opportunities.len(),
        by_type,
        by_source,
    }
}

pub struct SyncPipeline {
    config: SyncConfig,
    http: Arc<dyn PageFetcher>,
    pacer: RequestPacer,
    matcher: Arc<dyn KeywordMatcher>,
    dedup: DedupEngine,
}

impl SyncPipeline {
    pub fn new(config: SyncConfig) -> Result<Self> {
        let http = HttpFetcher::new(HttpClientConfig {
            timeout: Duration::from_secs(config.http_timeout_secs),
            user_agent: Some(config.user_agent.clone()),
        })?;
        let matcher = load_keyword_matcher(&config.workspace_root)?;
        let pacer = RequestPacer::new(Duration::from_millis(config.request_delay_ms));
        Ok(Self {
            config,
            http: Arc::new(http),
            pacer,
            matcher: Arc::new(matcher),
            dedup: DedupEngine::default(),
        })
    }

    pub fn with_fetcher(mut self, http: Arc<dyn PageFetcher>) -> Self {
        self.http = http;
        self
    }

    pub fn with_matcher(mut self, matcher: Arc<dyn KeywordMatcher>) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn with_pacer(mut self, pacer: RequestPacer) -> Self {
        self.pacer = pacer;
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub async fn run_once(&self) -> Result<RunOutcome> {
        let registry = self.load_source_registry().await?;
        Ok(self.run_registry(&registry).await)
    }

    /// Runs sources in registry order, one at a time. A failing source is
    /// logged and skipped.
    pub async fn run_registry(&self, registry: &SourceRegistry) -> RunOutcome {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        let ctx = AdapterContext::new(run_id, started_at);
        info!(%run_id, sources = registry.enabled().count(), "starting bid monitor run");

        let mut collected = Vec::new();
        let mut sources_attempted = 0usize;
        let mut sources_failed = Vec::new();

        for source in registry.enabled() {
            sources_attempted += 1;
            let adapter = adapter_for_kind(source.adapter, self.matcher.clone(), source.scan_limit);
            let target = source.target();
            let collected_from_source = self
                .pacer
                .paced(adapter.collect(self.http.as_ref(), &ctx, &target))
                .await;

            match collected_from_source {
                Ok(found) => {
                    info!(source = %source.display_name, found = found.len(), "source checked");
                    collected.extend(found);
                }
                Err(err) => {
                    warn!(source = %source.display_name, error = %err, "source skipped");
                    sources_failed.push(SourceFailure {
                        source_id: source.source_id.clone(),
                        display_name: source.display_name.clone(),
                        error: err.to_string(),
                    });
                }
            }
        }

        let candidates = collected.len();
        let opportunities = self.dedup.apply(collected);
        let duplicates_removed = candidates - opportunities.len();
        if duplicates_removed > 0 {
            info!(removed = duplicates_removed, "removed duplicate opportunities");
        }

        let finished_at = Utc::now();
        info!(%run_id, unique = opportunities.len(), failed = sources_failed.len(), "run complete");
        RunOutcome {
            summary: RunSummary {
                run_id,
                started_at,
                finished_at,
                sources_attempted,
                sources_failed,
                candidates,
                unique: opportunities.len(),
                duplicates_removed,
            },
            opportunities,
        }
    }

    // On error the store is untouched.
    pub async fn refresh(&self, store: &SnapshotStore) -> Result<RunSummary> {
        let outcome = self.run_once().await?;
        let summary = outcome.summary.clone();
        store.publish(outcome.into_snapshot()).await;
        Ok(summary)
    }

    async fn load_source_registry(&self) -> Result<SourceRegistry> {
        let path = self.config.registry_path();
        let text = fs::read_to_string(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        SourceRegistry::from_yaml(&text).with_context(|| format!("loading {}", path.display()))
    }
}

async fn scheduled_refresh(pipeline: Arc<SyncPipeline>, store: Arc<SnapshotStore>) {
    match pipeline.refresh(&store).await {
        Ok(summary) => info!(run_id = %summary.run_id, unique = summary.unique, "scheduled refresh published"),
        Err(err) => error!(error = %err, "scheduled refresh failed; keeping previous snapshot"),
    }
}

/// Runs the pipeline once in the background, then every `sync_interval_secs`.
pub async fn start_scheduler(
    pipeline: Arc<SyncPipeline>,
    store: Arc<SnapshotStore>,
) -> Result<Option<JobScheduler>> {
    if !pipeline.config().scheduler_enabled {
        return Ok(None);
    }
    let every = Duration::from_secs(pipeline.config().sync_interval_secs.max(1));

    tokio::spawn(scheduled_refresh(pipeline.clone(), store.clone()));

    let sched = JobScheduler::new().await.context("creating scheduler")?;
    let job = Job::new_repeated_async(every, move |_uuid, _l| {
        let pipeline = pipeline.clone();
        let store = store.clone();
        Box::pin(scheduled_refresh(pipeline, store))
    })
    .context("creating repeated sync job")?;
    sched.add(job).await.context("adding scheduler job")?;
    sched.start().await.context("starting scheduler")?;
    info!(interval_secs = every.as_secs(), "scheduler started");
    Ok(Some(sched))
}

pub async fn run_sync_once_from_env() -> Result<(RunSummary, PathBuf)> {
    let config = SyncConfig::from_env();
    let reports_dir = config.reports_dir();
    let pipeline = SyncPipeline::new(config)?;
    let outcome = pipeline.run_once().await?;
    let run_dir = write_exports(&reports_dir, &outcome.summary, &outcome.opportunities)?;
    Ok((outcome.summary, run_dir))
}
