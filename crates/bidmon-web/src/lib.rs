//! Axum JSON API + Askama status page for the bid monitor.

use std::collections::BTreeMap;
use std::sync::Arc;

use askama::Template;
use axum::{
    extract::State,
    http::{Method, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use bidmon_core::{JurisdictionType, Opportunity};
use bidmon_storage::{Snapshot, SnapshotStore};
use bidmon_sync::{start_scheduler, statistics, SyncConfig, SyncPipeline};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

pub const CRATE_NAME: &str = "bidmon-web";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SnapshotStore>,
    pub pipeline: Arc<SyncPipeline>,
    pub monitor_active: bool,
}

impl AppState {
    pub fn new(store: Arc<SnapshotStore>, pipeline: Arc<SyncPipeline>) -> Self {
        Self {
            store,
            pipeline,
            monitor_active: false,
        }
    }

    pub fn with_monitor_active(mut self, active: bool) -> Self {
        self.monitor_active = active;
        self
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    message: &'static str,
    bids_count: usize,
    last_update: Option<DateTime<Utc>>,
    monitor_active: bool,
}

#[derive(Debug, Serialize)]
struct BidsResponse<'a> {
    success: bool,
    count: usize,
    bids: &'a [Opportunity],
    last_update: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct StatisticsBody {
    total: usize,
    municipal: usize,
    county: usize,
    state: usize,
    by_source: BTreeMap<String, usize>,
}

#[derive(Debug, Serialize)]
struct StatisticsResponse {
    success: bool,
    statistics: StatisticsBody,
    last_update: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct RefreshResponse {
    success: bool,
    message: &'static str,
    bids_count: usize,
    last_update: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct TypeCountRow {
    label: &'static str,
    count: usize,
}

#[derive(Debug, Clone)]
struct SourceCountRow {
    name: String,
    count: usize,
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    monitor_active: bool,
    bids_count: usize,
    last_update: String,
    type_counts: Vec<TypeCountRow>,
    source_counts: Vec<SourceCountRow>,
    sync_interval_hours: u64,
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/health", get(health_handler))
        .route("/api/bids", get(bids_handler))
        .route("/api/statistics", get(statistics_handler))
        .route("/api/refresh", get(refresh_handler).post(refresh_handler))
        .layer(cors_layer())
        .with_state(Arc::new(state))
}

pub async fn serve_from_env() -> anyhow::Result<()> {
    let config = SyncConfig::from_env();
    let port = config.web_port;
    let store = Arc::new(SnapshotStore::new());
    let pipeline = Arc::new(SyncPipeline::new(config)?);
    let scheduler = start_scheduler(pipeline.clone(), store.clone()).await?;
    let state = AppState::new(store, pipeline).with_monitor_active(scheduler.is_some());

    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, monitor_active = state.monitor_active, "bid monitor api listening");
    axum::serve(listener, app(state)).await?;
    drop(scheduler);
    Ok(())
}

async fn index_handler(State(state): State<Arc<AppState>>) -> Response {
    let snapshot = state.store.current().await;
    let stats = statistics(&snapshot.opportunities);
    render_html(IndexTemplate {
        monitor_active: state.monitor_active,
        bids_count: snapshot.len(),
        last_update: snapshot
            .last_update
            .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
            .unwrap_or_else(|| "Updating...".into()),
        type_counts: JurisdictionType::ALL
            .into_iter()
            .map(|t| TypeCountRow {
                label: t.as_str(),
                count: stats.count(t),
            })
            .collect(),
        source_counts: stats
            .by_source
            .into_iter()
            .map(|(name, count)| SourceCountRow { name, count })
            .collect(),
        sync_interval_hours: state.pipeline.config().sync_interval_secs / 3600,
    })
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let snapshot = state.store.current().await;
    Json(HealthResponse {
        status: "ok",
        message: "Bid Monitor API is running",
        bids_count: snapshot.len(),
        last_update: snapshot.last_update,
        monitor_active: state.monitor_active,
    })
}

async fn bids_handler(State(state): State<Arc<AppState>>) -> Response {
    let snapshot = state.store.current().await;
    Json(BidsResponse {
        success: true,
        count: snapshot.len(),
        bids: &snapshot.opportunities,
        last_update: snapshot.last_update,
    })
    .into_response()
}

async fn statistics_handler(State(state): State<Arc<AppState>>) -> Json<StatisticsResponse> {
    let snapshot = state.store.current().await;
    let stats = statistics(&snapshot.opportunities);
    Json(StatisticsResponse {
        success: true,
        statistics: StatisticsBody {
            total: stats.total,
            municipal: stats.count(JurisdictionType::Municipal),
            county: stats.count(JurisdictionType::County),
            state: stats.count(JurisdictionType::State),
            by_source: stats.by_source,
        },
        last_update: snapshot.last_update,
    })
}

async fn refresh_handler(State(state): State<Arc<AppState>>) -> Json<RefreshResponse> {
    let success = match state.pipeline.refresh(&state.store).await {
        Ok(summary) => {
            info!(run_id = %summary.run_id, unique = summary.unique, "on-demand refresh published");
            true
        }
        Err(err) => {
            warn!(error = %err, "on-demand refresh failed");
            false
        }
    };
    let snapshot: Arc<Snapshot> = state.store.current().await;
    Json(RefreshResponse {
        success,
        message: if success { "Refresh completed" } else { "Refresh failed" },
        bids_count: snapshot.len(),
        last_update: snapshot.last_update,
    })
}

fn render_html<T: Template>(tpl: T) -> Response {
    match tpl.render() {
        Ok(html) => Html(html).into_response(),
        Err(err) => server_error(anyhow::anyhow!(err.to_string())),
    }
}

fn server_error(err: anyhow::Error) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(format!("Server error: {}", err)),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request};
    use bidmon_core::{SourceLabel, SubstringMatcher};
    use bidmon_storage::{RequestPacer, StaticPageFetcher};
    use chrono::NaiveDate;
    use http_body_util::BodyExt;
    use std::path::Path;
    use tower::ServiceExt;
    use uuid::Uuid;

    const REGISTRY: &str = r#"
sources:
  - source_id: example_city
    display_name: Example City
    url: https://example.gov/bids
    location: Example, OH
    type: Municipal
  - source_id: example_county
    display_name: Example County
    url: https://county.example.gov/bids
    location: Example County, OH
    type: County
"#;

    fn state(root: &Path) -> AppState {
        let http = StaticPageFetcher::new()
            .with_page(
                "https://example.gov/bids",
                r#"<ul>
                    <li><a href="/bids/1">Storm Sewer Cleaning and CCTV Inspection Services</a></li>
                    <li><a href="/bids/1b">Storm Sewer Cleaning and CCTV Inspection</a></li>
                    <li><a href="/parks">Parks and Recreation Mowing Contract</a></li>
                </ul>"#,
            )
            .with_page(
                "https://county.example.gov/bids",
                r#"<li><a href="/rfq/7">RFQ-7 Catch Basin Cleaning Program</a></li>"#,
            );
        let config = SyncConfig {
            workspace_root: root.to_path_buf(),
            request_delay_ms: 0,
            scheduler_enabled: false,
            ..Default::default()
        };
        let pipeline = SyncPipeline::new(config)
            .unwrap()
            .with_fetcher(Arc::new(http))
            .with_matcher(Arc::new(SubstringMatcher::core()))
            .with_pacer(RequestPacer::unpaced());
        AppState::new(Arc::new(SnapshotStore::new()), Arc::new(pipeline))
    }

    async fn get_json(app: Router, method: &str, uri: &str) -> serde_json::Value {
        let resp = app
            .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE].to_str().unwrap(), "application/json");
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn health_reports_empty_snapshot_before_first_run() {
        let dir = tempfile::tempdir().unwrap();
        let json = get_json(app(state(dir.path())), "GET", "/api/health").await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["bids_count"], 0);
        assert!(json["last_update"].is_null());
        assert_eq!(json["monitor_active"], false);
    }

    #[tokio::test]
    async fn refresh_then_read_bids_and_statistics() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("sources.yaml"), REGISTRY).unwrap();
        let app = app(state(dir.path()));

        let refresh = get_json(app.clone(), "POST", "/api/refresh").await;
        assert_eq!(refresh["success"], true);
        assert_eq!(refresh["message"], "Refresh completed");
        assert_eq!(refresh["bids_count"], 3);
        assert!(refresh["last_update"].is_string());

        let bids = get_json(app.clone(), "GET", "/api/bids").await;
        assert_eq!(bids["success"], true);
        assert_eq!(bids["count"], 3);
        assert_eq!(bids["bids"][0]["url"], "https://example.gov/bids/1");
        assert_eq!(bids["bids"][1]["url"], "https://example.gov/bids/1b");
        assert_eq!(bids["bids"][2]["type"], "County");
        assert_eq!(bids["bids"][2]["bid_number"], "RFQ-7");

        let stats = get_json(app, "GET", "/api/statistics").await;
        assert_eq!(stats["statistics"]["total"], 3);
        assert_eq!(stats["statistics"]["municipal"], 2);
        assert_eq!(stats["statistics"]["county"], 1);
        assert_eq!(stats["statistics"]["state"], 0);
        assert_eq!(stats["statistics"]["by_source"]["Example County"], 1);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        let previous = Opportunity {
            source: "Example City".into(),
            title: "Vacuum Truck Rental Services".into(),
            url: "https://example.gov/bids/9".into(),
            posted_date: NaiveDate::from_ymd_opt(2026, 10, 18).unwrap(),
            location: "Example, OH".into(),
            jurisdiction_type: JurisdictionType::Municipal,
            bid_number: String::new(),
            description: None,
        };
        state
            .store
            .publish(Snapshot::new(vec![previous], Utc::now(), Uuid::new_v4()))
            .await;

        let app = app(state);
        let refresh = get_json(app.clone(), "GET", "/api/refresh").await;
        assert_eq!(refresh["success"], false);
        assert_eq!(refresh["message"], "Refresh failed");
        assert_eq!(refresh["bids_count"], 1);

        let bids = get_json(app, "GET", "/api/bids").await;
        assert_eq!(bids["bids"][0]["title"], "Vacuum Truck Rental Services");
    }

    #[tokio::test]
    async fn api_allows_cross_origin_browsers() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(state(dir.path()));

        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/bids")
                    .header(header::ORIGIN, "https://dashboard.example.org")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");

        let preflight = app
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/api/refresh")
                    .header(header::ORIGIN, "https://dashboard.example.org")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(preflight.status().is_success());
        assert_eq!(preflight.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        let methods = preflight.headers()[header::ACCESS_CONTROL_ALLOW_METHODS].to_str().unwrap();
        assert!(methods.contains("POST"));
    }

    #[tokio::test]
    async fn index_page_renders_counts() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        let label = SourceLabel {
            name: "Cuyahoga County".into(),
            location: "Cuyahoga County, OH".into(),
            jurisdiction_type: JurisdictionType::County,
        };
        let opp = Opportunity::from_link(
            &label,
            "Storm Sewer Cleaning Services",
            "https://cuyahogacounty.us/bids/1".into(),
            None,
            NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
        );
        state.store.publish(Snapshot::new(vec![opp], Utc::now(), Uuid::new_v4())).await;

        let resp = app(state)
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("Public Bid Monitor"));
        assert!(text.contains("Cuyahoga County"));
        assert!(text.contains("/api/statistics"));
        assert!(!text.contains("Updating..."));
    }
}
