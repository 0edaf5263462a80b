use axum::{
    Extension, Json, Router,
    extract::{FromRef, State},
    http::header,
    middleware,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::Key;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::cache::DataCache;
use crate::charts::{self, Chart, RawView, Tab};
use crate::config::{DataSource, Settings, source_for_team};
use crate::downloader;
use crate::error::{DashboardError, Result};
use crate::filter::{DynamicFilters, FilterWidget};
use crate::loader;
use crate::login::{
    Authenticator, CookieSettings, Identity, SessionStore, handle_login, handle_logout,
    require_auth, serve_login_page,
};
use crate::metrics;
use crate::table::{Dataset, Table};

/// Number of bins on the explore page histogram.
pub const HISTOGRAM_BINS: usize = 10;

/// Shared server state, cloned into every handler
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub auth: Arc<Authenticator>,
    pub sessions: Arc<SessionStore>,
    pub cookie: Arc<CookieSettings>,
    datasets: Arc<DataCache<Dataset>>,
    explore: Arc<DataCache<Table>>,
    http: reqwest::Client,
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie.key.clone()
    }
}

impl AppState {
    pub fn new(settings: Settings) -> Result<Self> {
        let cookie = CookieSettings::from_settings(&settings)?;
        let sessions = SessionStore::new(cookie.session_duration());
        let auth = Authenticator::from_settings(&settings);
        let http = reqwest::Client::builder()
            .timeout(settings.remote_timeout)
            .build()
            .map_err(|e| DashboardError::Http {
                url: String::new(),
                message: e.to_string(),
            })?;

        Ok(AppState {
            datasets: Arc::new(DataCache::new(settings.cache_ttl)),
            explore: Arc::new(DataCache::new(settings.cache_ttl)),
            settings: Arc::new(settings),
            auth: Arc::new(auth),
            sessions: Arc::new(sessions),
            cookie: Arc::new(cookie),
            http,
        })
    }

    fn team_source(&self, team: &str) -> Result<DataSource> {
        source_for_team(
            &self.settings.secrets,
            team,
            self.settings.default_data.as_deref(),
        )
    }

    /// Prepared dataset of a team, from the cache when fresh
    async fn team_dataset(&self, team: &str) -> Result<Arc<Dataset>> {
        let source = self.team_source(team)?;
        self.datasets
            .get_or_try_load(&source.key(), || load_source(&self.http, &source))
            .await
    }
}

async fn load_source(http: &reqwest::Client, source: &DataSource) -> Result<Dataset> {
    let table = match source {
        DataSource::File(path) => load_file(path.clone()).await?,
        DataSource::Remote { url } => loader::fetch_remote(http, url).await?,
    };
    Dataset::prepare(table)
}

async fn load_file(path: PathBuf) -> Result<Table> {
    let display = path.display().to_string();
    tokio::task::spawn_blocking(move || loader::load_table(&path))
        .await
        .map_err(|e| DashboardError::Io {
            path: display,
            source: std::io::Error::other(e),
        })?
}

/// Build the router: login routes are public, everything else needs a session.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/", get(serve_dashboard))
        .route("/explore", get(serve_explore))
        .route("/api/dashboard", post(dashboard_data))
        .route("/api/explore", get(explore_data))
        .route("/api/download/csv", post(download_csv))
        .route("/api/download/xlsx", post(download_xlsx))
        .route("/api/refresh", post(refresh_data))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/login", get(serve_login_page).post(handle_login))
        .route("/logout", get(handle_logout).post(handle_logout))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(settings: Settings) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let bind = settings.bind;
    let app = router(AppState::new(settings)?);

    let listener = TcpListener::bind(bind).await?;
    log::info!("Listening on http://{}", bind);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn serve_dashboard() -> Html<&'static str> {
    Html(include_str!("./static/dashboard.html"))
}

async fn serve_explore() -> Html<&'static str> {
    Html(include_str!("./static/explore.html"))
}

/// Filter selections sent by the dashboard page
#[derive(Debug, Default, Deserialize)]
pub struct DashboardRequest {
    #[serde(default)]
    pub selections: BTreeMap<String, Vec<String>>,
}

/// Everything the dashboard page renders for one run
#[derive(Debug, Serialize)]
pub struct DashboardView {
    pub team: String,
    pub welcome: String,
    pub header: String,
    pub filters: Vec<FilterWidget>,
    pub tabs: Vec<Tab>,
    pub total_rows: usize,
    pub filtered_rows: usize,
}

/// Apply the requested selections to the team's dataset
///
/// Selected values that the other filters exclude are dropped before
/// filtering, so the returned widgets always show a reachable state.
async fn filtered_table(
    state: &AppState,
    identity: &Identity,
    selections: BTreeMap<String, Vec<String>>,
) -> Result<(Arc<Dataset>, DynamicFilters, Table)> {
    let dataset = state.team_dataset(&identity.username).await?;

    let mut filters = DynamicFilters::with_default_columns();
    filters.select(selections)?;
    filters.reconcile(&dataset)?;
    let filtered = filters.filter(&dataset)?;

    Ok((dataset, filters, filtered))
}

async fn dashboard_data(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(request): Json<DashboardRequest>,
) -> Result<Json<DashboardView>> {
    let (dataset, filters, filtered) =
        filtered_table(&state, &identity, request.selections).await?;

    Ok(Json(DashboardView {
        header: format!("Team Dashboard: {}", identity.username),
        welcome: format!("Welcome {}", identity.name),
        team: identity.username,
        filters: filters.widgets(&dataset)?,
        tabs: charts::dashboard_tabs(&filtered),
        total_rows: dataset.table().len(),
        filtered_rows: filtered.len(),
    }))
}

async fn download_csv(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(request): Json<DashboardRequest>,
) -> Result<Response> {
    let (_, _, filtered) = filtered_table(&state, &identity, request.selections).await?;
    let body = downloader::to_csv(&filtered)?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"dashboard.csv\""),
        ],
        body,
    )
        .into_response())
}

async fn download_xlsx(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(request): Json<DashboardRequest>,
) -> Result<Response> {
    let (_, _, filtered) = filtered_table(&state, &identity, request.selections).await?;
    let body = downloader::to_xlsx(&filtered)?;

    Ok((
        [
            (
                header::CONTENT_TYPE,
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            ),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"dashboard.xlsx\""),
        ],
        body,
    )
        .into_response())
}

/// Forget the cached data of the caller's team so the next run reloads it
async fn refresh_data(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<serde_json::Value>> {
    let source = state.team_source(&identity.username)?;
    let dropped = state.datasets.invalidate(&source.key()).await;
    log::info!("refresh requested by {} (cached: {})", identity.username, dropped);

    Ok(Json(serde_json::json!({
        "status": "ok",
        "invalidated": dropped,
    })))
}

#[derive(Debug, Serialize)]
pub struct ExploreView {
    pub raw: RawView,
    pub histogram: Chart,
}

async fn explore_data(State(state): State<AppState>) -> Result<Json<ExploreView>> {
    let path = state
        .settings
        .explore_data
        .clone()
        .ok_or_else(|| DashboardError::Config {
            path: "explore-data".to_string(),
            message: "no explore data file configured".to_string(),
        })?;

    let key = format!("file:{}", path.display());
    let table = state.explore.get_or_try_load(&key, || load_file(path)).await?;

    let column = &state.settings.histogram_column;
    let values = metrics::numeric_values(&table, column)?;
    let hist = metrics::histogram(&values, HISTOGRAM_BINS)?;

    Ok(Json(ExploreView {
        raw: charts::raw_view(&table),
        histogram: charts::histogram_chart(&format!("Histogram of {}", column), &hist),
    }))
}
