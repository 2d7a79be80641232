// Router tests - requests go through the full axum stack via oneshot

#![cfg(feature = "server")]

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use home_sales_map::api::{router, AppState};
use home_sales_map::{DataSource, GeometryOptions, SharedDataset};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

const SALES: &str = "\
address,price,price_sf,square_footage,bedrooms,bathrooms,latitude,longitude,BG_ID
10 Oak St,300000,150,2000,3,2.0,34.55,-83.52,131370001001
12 Oak St,240000,120,1800,3,2.5,34.55,-83.52,131370001001
3 Hill Rd,400000,200,2400,4,3.0,34.36,-83.47,130110101001
";

const GEOJSON: &str = r#"{"type":"FeatureCollection","features":[
    {"type":"Feature","properties":{"GEOID":"131370001001"},
     "geometry":{"type":"Polygon","coordinates":[[[-83.6,34.5],[-83.5,34.5],[-83.5,34.6],[-83.6,34.5]]]}},
    {"type":"Feature","properties":{"GEOID":130110101001},
     "geometry":{"type":"Polygon","coordinates":[[[-83.5,34.3],[-83.4,34.3],[-83.4,34.4],[-83.5,34.3]]]}}
]}"#;

struct Fixture {
    // Keeps the files alive for the duration of the test
    dir: TempDir,
    app: Router,
}

fn fixture(token: Option<&str>) -> Fixture {
    let dir = TempDir::new().unwrap();
    let sales_path = dir.path().join("sales_file.csv");
    let geometry_path = dir.path().join("blockGroups.geojson");
    std::fs::write(&sales_path, SALES).unwrap();
    std::fs::write(&geometry_path, GEOJSON).unwrap();

    let data = SharedDataset::load(DataSource {
        sales_path,
        geometry_path,
        geometry: GeometryOptions::default(),
    })
    .unwrap();

    let app = router(AppState::new(data, token.map(str::to_string)));
    Fixture { dir, app }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

#[tokio::test]
async fn test_health() {
    let fx = fixture(None);

    let (status, body) = get(&fx.app, "/api/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"], "OK");
}

#[tokio::test]
async fn test_map_with_defaults() {
    let fx = fixture(None);

    let (status, body) = get(&fx.app, "/api/map").await;

    assert_eq!(status, StatusCode::OK);
    let map = &body["data"];
    assert_eq!(map["metric"], "total_sales");
    assert_eq!(map["filtered_sales"], 3);
    assert_eq!(map["features"]["type"], "FeatureCollection");

    let features = map["features"]["features"].as_array().unwrap();
    assert_eq!(features.len(), 2);
    assert_eq!(features[0]["id"], "131370001001");
    assert_eq!(features[0]["properties"]["total_sales"], 2);
    assert_eq!(features[1]["properties"]["GEOID"], "130110101001");
    assert_eq!(features[1]["properties"]["county_name"], "Banks");
    assert!(features[0]["properties"]["fill_color"]
        .as_str()
        .unwrap()
        .starts_with('#'));
}

#[tokio::test]
async fn test_map_with_sliders() {
    let fx = fixture(None);

    let (status, body) = get(
        &fx.app,
        "/api/map?sqft_min=1500&sqft_max=2000&bedrooms=3&bathrooms=2.5&metric=median_SF",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let map = &body["data"];
    assert_eq!(map["metric"], "median_SF");
    assert_eq!(map["filtered_sales"], 1);

    let features = map["features"]["features"].as_array().unwrap();
    assert_eq!(features.len(), 1);
    assert_eq!(features[0]["properties"]["median_SF"], 1800.0);
}

#[tokio::test]
async fn test_bad_parameters_are_rejected() {
    let fx = fixture(None);

    let (status, body) = get(&fx.app, "/api/map?bathrooms=1.3").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("bathrooms"));

    let (status, _) = get(&fx.app, "/api/map?sqft_min=3000&sqft_max=1000").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get(&fx.app, "/api/aggregates?bedrooms=many").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get(&fx.app, "/api/map?metric=median_price").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_aggregates_and_sales() {
    let fx = fixture(None);

    let (status, body) = get(&fx.app, "/api/aggregates?county=Habersham").await;
    assert_eq!(status, StatusCode::OK);
    let rows = body["data"]["block_groups"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["BG_ID"], "131370001001");
    assert_eq!(rows[0]["median_priceSF"], 135.0);
    assert_eq!(body["data"]["totals"]["total_sales"], 2);

    let (status, body) = get(&fx.app, "/api/sales?bedrooms=4&sqft_max=2500").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["count"], 1);
    assert_eq!(body["data"]["sales"][0]["address"], "3 Hill Rd");
}

#[tokio::test]
async fn test_config_without_token_uses_osm() {
    let fx = fixture(None);

    let (_, body) = get(&fx.app, "/api/config").await;
    let config = &body["data"];

    assert!(config["tile_url"]
        .as_str()
        .unwrap()
        .contains("openstreetmap"));
    assert_eq!(config["view"]["zoom"], 8.5);
    assert_eq!(config["defaults"]["sqft_min"], 1000);
    assert_eq!(config["defaults"]["sqft_max"], 2500);
    assert_eq!(config["metrics"].as_array().unwrap().len(), 3);
    assert_eq!(config["counties"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_config_with_token_uses_mapbox() {
    let fx = fixture(Some("pk.test token"));

    let (_, body) = get(&fx.app, "/api/config").await;
    let tile_url = body["data"]["tile_url"].as_str().unwrap();

    assert!(tile_url.starts_with("https://api.mapbox.com/"));
    assert!(tile_url.ends_with("access_token=pk.test%20token"));
}

#[tokio::test]
async fn test_reload_picks_up_new_rows() {
    let fx = fixture(None);
    let (_, before) = get(&fx.app, "/api/dataset").await;

    std::fs::write(
        fx.dir.path().join("sales_file.csv"),
        format!("{}5 New St,250000,125,2000,3,2.0,34.55,-83.52,131370001001\n", SALES),
    )
    .unwrap();

    let (status, body) = send(
        &fx.app,
        Request::post("/api/reload").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["sales_rows"], 4);
    assert_ne!(body["data"]["fingerprint"], before["data"]["fingerprint"]);

    let (_, map) = get(&fx.app, "/api/map").await;
    assert_eq!(map["data"]["filtered_sales"], 4);
}

#[tokio::test]
async fn test_unknown_route_is_json_404() {
    let fx = fixture(None);

    let (status, body) = get(&fx.app, "/api/nope").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_placeholder_pages() {
    let fx = fixture(None);

    let response = fx
        .app
        .clone()
        .oneshot(Request::get("/permits").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let html = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(html.contains("Building Permits"));
    assert!(!html.contains("{{title}}"));
}

#[tokio::test]
async fn test_map_page_lists_filtered_sales() {
    let fx = fixture(None);

    let response = fx
        .app
        .clone()
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let html = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(html.contains("/api/sales?"));
    assert!(html.contains("id=\"sales-rows\""));
}
