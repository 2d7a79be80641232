// Web API - axum routes for the dashboard pages and JSON endpoints
//
// Every interaction in the browser is a fresh GET against /api/map (or
// /api/aggregates, /api/sales) with the current slider values as query
// parameters. Handlers take a snapshot of the dataset and run the pipeline.

use crate::aggregate::{totals, AggregateTotals, BlockGroupAggregate};
use crate::choropleth::{MapMetric, MapView};
use crate::counties::County;
use crate::dataset::{DatasetInfo, SharedDataset};
use crate::filter::{slider_bounds, SalesFilter, SliderBounds};
use crate::pages::{navigation, NavEntry, Page, SOURCE_NOTE};
use crate::sales::SaleRecord;
use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

const OSM_TILES: &str = "https://tile.openstreetmap.org/{z}/{x}/{y}.png";
const OSM_ATTRIBUTION: &str = "&copy; OpenStreetMap contributors";
const MAPBOX_ATTRIBUTION: &str = "&copy; Mapbox &copy; OpenStreetMap contributors";

/// Fingerprint of the dataset a response was computed from
const FINGERPRINT_HEADER: &str = "x-dataset-fingerprint";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub data: SharedDataset,
    pub mapbox_token: Option<String>,
    pub web_dir: PathBuf,
}

impl AppState {
    pub fn new(data: SharedDataset, mapbox_token: Option<String>) -> Self {
        AppState {
            data,
            mapbox_token,
            web_dir: PathBuf::from("web"),
        }
    }

    /// Basemap tile template; Mapbox streets when a token is configured
    fn tile_url(&self) -> String {
        match self.mapbox_token.as_deref().filter(|t| !t.is_empty()) {
            Some(token) => format!(
                "https://api.mapbox.com/styles/v1/mapbox/streets-v12/tiles/256/{{z}}/{{x}}/{{y}}@2x?access_token={}",
                urlencoding::encode(token)
            ),
            None => OSM_TILES.to_string(),
        }
    }

    fn attribution(&self) -> &'static str {
        if self.mapbox_token.as_deref().is_some_and(|t| !t.is_empty()) {
            MAPBOX_ATTRIBUTION
        } else {
            OSM_ATTRIBUTION
        }
    }
}

/// API Response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

impl ApiResponse<()> {
    fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

fn fail(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ApiResponse::err(message))).into_response()
}

fn with_fingerprint(mut response: Response, fingerprint: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(fingerprint) {
        response.headers_mut().insert(FINGERPRINT_HEADER, value);
    }
    response
}

// ============================================================================
// Query parameters
// ============================================================================

/// Slider values from the page; missing values take the slider defaults
#[derive(Debug, Default, Deserialize)]
pub struct FilterQuery {
    pub sqft_min: Option<i64>,
    pub sqft_max: Option<i64>,
    pub bedrooms: Option<i64>,
    pub bathrooms: Option<f64>,
    pub county: Option<String>,
    pub metric: Option<String>,
}

impl FilterQuery {
    pub fn filter(&self) -> anyhow::Result<SalesFilter> {
        let defaults = SalesFilter::default();
        let filter = SalesFilter {
            sqft_min: self.sqft_min.unwrap_or(defaults.sqft_min),
            sqft_max: self.sqft_max.unwrap_or(defaults.sqft_max),
            min_bedrooms: self.bedrooms.unwrap_or(defaults.min_bedrooms),
            min_bathrooms: self.bathrooms.unwrap_or(defaults.min_bathrooms),
            county: self.county.clone().filter(|c| !c.is_empty()),
        };
        filter.validate()?;
        Ok(filter)
    }

    pub fn metric(&self) -> anyhow::Result<MapMetric> {
        match self.metric.as_deref() {
            None | Some("") => Ok(MapMetric::default()),
            Some(name) => name.parse(),
        }
    }
}

/// Unwrap the query or answer 400 inside the usual envelope
fn parse_query(query: Result<Query<FilterQuery>, QueryRejection>) -> Result<FilterQuery, Response> {
    match query {
        Ok(Query(query)) => Ok(query),
        Err(rejection) => Err(fail(StatusCode::BAD_REQUEST, rejection.body_text())),
    }
}

// ============================================================================
// Response bodies
// ============================================================================

#[derive(Serialize)]
pub struct MetricOption {
    pub column: &'static str,
    pub label: &'static str,
}

#[derive(Serialize)]
pub struct ClientConfig {
    pub sliders: Vec<SliderBounds>,
    pub defaults: SalesFilter,
    pub metrics: Vec<MetricOption>,
    pub default_metric: MapMetric,
    pub view: MapView,
    pub tile_url: String,
    pub attribution: &'static str,
    pub source_note: &'static str,
    pub counties: Vec<County>,
}

#[derive(Serialize)]
pub struct AggregatesResponse {
    pub filter: SalesFilter,
    pub totals: AggregateTotals,
    pub block_groups: Vec<BlockGroupAggregate>,
}

#[derive(Serialize)]
pub struct SalesResponse {
    pub filter: SalesFilter,
    pub count: usize,
    pub sales: Vec<SaleRecord>,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/pages - Navigation entries
async fn get_pages() -> Json<ApiResponse<Vec<NavEntry>>> {
    Json(ApiResponse::ok(navigation()))
}

/// GET /api/config - Widget bounds, defaults and basemap settings
async fn get_config(State(state): State<AppState>) -> Json<ApiResponse<ClientConfig>> {
    let counties = state.data.snapshot().counties.counties();

    Json(ApiResponse::ok(ClientConfig {
        sliders: slider_bounds(),
        defaults: SalesFilter::default(),
        metrics: MapMetric::ALL
            .into_iter()
            .map(|metric| MetricOption {
                column: metric.column(),
                label: metric.label(),
            })
            .collect(),
        default_metric: MapMetric::default(),
        view: MapView::default(),
        tile_url: state.tile_url(),
        attribution: state.attribution(),
        source_note: SOURCE_NOTE,
        counties,
    }))
}

/// GET /api/dataset - What is loaded right now
async fn get_dataset(State(state): State<AppState>) -> Json<ApiResponse<DatasetInfo>> {
    Json(ApiResponse::ok(state.data.snapshot().info.clone()))
}

/// GET /api/counties - County lookup table
async fn get_counties(State(state): State<AppState>) -> Json<ApiResponse<Vec<County>>> {
    Json(ApiResponse::ok(state.data.snapshot().counties.counties()))
}

/// GET /api/map - Choropleth for the current filters
async fn get_map(
    State(state): State<AppState>,
    query: Result<Query<FilterQuery>, QueryRejection>,
) -> Response {
    let query = match parse_query(query) {
        Ok(query) => query,
        Err(response) => return response,
    };
    let (filter, metric) = match query.filter().and_then(|f| Ok((f, query.metric()?))) {
        Ok(parsed) => parsed,
        Err(e) => return fail(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let dataset = state.data.snapshot();
    match dataset.map(&filter, metric) {
        Ok(map) => {
            tracing::debug!(
                filter = %filter.summary(),
                metric = metric.column(),
                features = map.features.features.len(),
                "map rendered"
            );
            with_fingerprint(
                (StatusCode::OK, Json(ApiResponse::ok(map))).into_response(),
                &dataset.info.fingerprint,
            )
        }
        Err(e) => {
            tracing::error!(error = %e, "map rendering failed");
            fail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// GET /api/aggregates - Aggregate table for the current filters
async fn get_aggregates(
    State(state): State<AppState>,
    query: Result<Query<FilterQuery>, QueryRejection>,
) -> Response {
    let query = match parse_query(query) {
        Ok(query) => query,
        Err(response) => return response,
    };
    let filter = match query.filter() {
        Ok(filter) => filter,
        Err(e) => return fail(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let dataset = state.data.snapshot();
    let filtered = dataset.filtered_sales(&filter);
    let block_groups = crate::aggregate::aggregate_by_block_group(&filtered, &dataset.counties);

    let response = AggregatesResponse {
        totals: totals(&filtered, &block_groups),
        filter,
        block_groups,
    };
    with_fingerprint(
        (StatusCode::OK, Json(ApiResponse::ok(response))).into_response(),
        &dataset.info.fingerprint,
    )
}

/// GET /api/sales - Filtered raw records
async fn get_sales(
    State(state): State<AppState>,
    query: Result<Query<FilterQuery>, QueryRejection>,
) -> Response {
    let query = match parse_query(query) {
        Ok(query) => query,
        Err(response) => return response,
    };
    let filter = match query.filter() {
        Ok(filter) => filter,
        Err(e) => return fail(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let dataset = state.data.snapshot();
    let sales = dataset.filtered_sales(&filter);

    let response = SalesResponse {
        count: sales.len(),
        filter,
        sales,
    };
    with_fingerprint(
        (StatusCode::OK, Json(ApiResponse::ok(response))).into_response(),
        &dataset.info.fingerprint,
    )
}

/// POST /api/reload - Re-read both input files
async fn reload(State(state): State<AppState>) -> Response {
    let data = state.data.clone();
    match tokio::task::spawn_blocking(move || data.reload()).await {
        Ok(Ok(info)) => {
            tracing::info!(
                sales = %state.data.source().sales_path.display(),
                geometry = %state.data.source().geometry_path.display(),
                fingerprint = %info.fingerprint,
                "dataset reloaded"
            );
            (StatusCode::OK, Json(ApiResponse::ok(info))).into_response()
        }
        Ok(Err(e)) => {
            tracing::error!(error = %format!("{:#}", e), "reload failed");
            fail(StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e))
        }
        Err(e) => fail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

// ============================================================================
// Pages
// ============================================================================

/// GET / and /home-sales - Map page
async fn serve_home_sales() -> impl IntoResponse {
    Html(include_str!("../web/index.html"))
}

fn placeholder(page: Page) -> Html<String> {
    Html(
        include_str!("../web/placeholder.html")
            .replace("{{title}}", page.title())
            .replace("{{icon}}", page.icon()),
    )
}

/// GET /permits - Not built yet
async fn serve_permits() -> impl IntoResponse {
    placeholder(Page::Permits)
}

/// GET /demographics - Not built yet
async fn serve_demographics() -> impl IntoResponse {
    placeholder(Page::Demographics)
}

async fn not_found() -> Response {
    let mut response = fail(StatusCode::NOT_FOUND, "not found");
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState) -> Router {
    let web_dir = state.web_dir.clone();

    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/pages", get(get_pages))
        .route("/config", get(get_config))
        .route("/dataset", get(get_dataset))
        .route("/counties", get(get_counties))
        .route("/map", get(get_map))
        .route("/aggregates", get(get_aggregates))
        .route("/sales", get(get_sales))
        .route("/reload", post(reload))
        .with_state(state);

    Router::new()
        .route("/", get(serve_home_sales))
        .route("/home-sales", get(serve_home_sales))
        .route("/permits", get(serve_permits))
        .route("/demographics", get(serve_demographics))
        .nest("/api", api_routes)
        .nest_service("/static", ServeDir::new(web_dir))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_query_defaults() {
        let query = FilterQuery::default();

        assert_eq!(query.filter().unwrap(), SalesFilter::default());
        assert_eq!(query.metric().unwrap(), MapMetric::TotalSales);
    }

    #[test]
    fn test_filter_query_rejects_bad_values() {
        let query = FilterQuery {
            bathrooms: Some(0.3),
            ..FilterQuery::default()
        };
        assert!(query.filter().is_err());

        let query = FilterQuery {
            metric: Some("median_price".to_string()),
            ..FilterQuery::default()
        };
        assert!(query.metric().is_err());
    }

    #[test]
    fn test_empty_county_is_ignored() {
        let query = FilterQuery {
            county: Some(String::new()),
            ..FilterQuery::default()
        };

        assert_eq!(query.filter().unwrap().county, None);
    }
}
