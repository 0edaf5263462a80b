#![cfg(feature = "web")]

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use std::path::Path;
use std::time::Duration;
use team_dashboard::app::{AppState, router};
use team_dashboard::config::{AuthenticatorConfig, Connection, Secrets, Settings};
use team_dashboard::login::hash_password;
use tempfile::TempDir;
use tower::ServiceExt;

const TRACKING: &str = "\
Date,Role,Position,Player Name,Maximum Velocity,Peak Meta Power,HR_o85,HR_u85
2024-10-01,Forward,Wing,Alex,28.4,41.2,12,48
2024-10-01,Back,Center,\"Tremblay, Sam\",26.1,38.0,6,30
2024-10-08,Forward,Wing,Alex,29.0,43.5,10,0
";

const EXPLORE: &str = "\
Player Name,CVE
Alex,1
Sam,2
Jo,2
Kim,not measured
";

fn settings(dir: &TempDir) -> Settings {
    let data = dir.path().join("sherbrooke.csv");
    let explore = dir.path().join("explore.csv");
    std::fs::write(&data, TRACKING).unwrap();
    std::fs::write(&explore, EXPLORE).unwrap();

    let secrets = Secrets::parse(
        &format!(
            r#"
[passwords]
sherbrooke = "vert-et-or"
mcgill = "redbirds"

[teams]
sherbrooke = "sher"

[connections.sher]
path = "{}"
"#,
            data.display()
        ),
        Path::new("secrets.toml"),
    )
    .unwrap();

    let mut settings = Settings::new("127.0.0.1:0".parse().unwrap(), secrets);
    settings.explore_data = Some(explore);
    settings
}

fn app(dir: &TempDir) -> Router {
    router(AppState::new(settings(dir)).unwrap())
}

/// Same data, but logins are checked against hashed credentials.
fn hashed_app(dir: &TempDir) -> Router {
    let yaml = format!(
        r#"
credentials:
  usernames:
    sherbrooke:
      name: Sherbrooke
      email: staff@example.org
      password: "{}"
cookie:
  name: vert_et_or_session
  key: some_signature_key
  expiry_days: 30
"#,
        hash_password("vert-et-or").unwrap()
    );

    let mut settings = settings(dir);
    settings.authenticator =
        Some(AuthenticatorConfig::parse(&yaml, Path::new("config.yaml")).unwrap());
    router(AppState::new(settings).unwrap())
}

fn login_request(username: &str, password: &str) -> Request<Body> {
    Request::post("/login")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(format!("username={}&password={}", username, password)))
        .unwrap()
}

async fn login(app: &Router) -> String {
    let response = app
        .clone()
        .oneshot(login_request("sherbrooke", "vert-et-or"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/");

    let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
    set_cookie.split(';').next().unwrap().to_string()
}

fn api_post(uri: &str, cookie: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::COOKIE, cookie)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn wrong_password_is_sent_back_to_login() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);

    let response = app.clone().oneshot(login_request("sherbrooke", "bleus")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/login?failed=true");
    assert!(response.headers().get(header::SET_COOKIE).is_none());

    let page = app
        .oneshot(Request::get("/login?failed=true").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let bytes = to_bytes(page.into_body(), usize::MAX).await.unwrap();
    let html = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(html.contains("User not known or password incorrect"));
}

#[tokio::test]
async fn protected_routes_need_a_session() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);

    let api = app
        .clone()
        .oneshot(api_post("/api/dashboard", "dashboard_session=forged", json!({})))
        .await
        .unwrap();
    assert_eq!(api.status(), StatusCode::UNAUTHORIZED);

    let page = app
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(page.status(), StatusCode::SEE_OTHER);
    assert_eq!(page.headers()[header::LOCATION], "/login");
}

#[tokio::test]
async fn dashboard_applies_every_selection() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);
    let cookie = login(&app).await;

    let response = app
        .clone()
        .oneshot(api_post(
            "/api/dashboard",
            &cookie,
            json!({ "selections": { "Player Name": ["Alex"], "Date": ["2024-10-01"] } }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let view = json_body(response).await;
    assert_eq!(view["team"], "sherbrooke");
    assert_eq!(view["header"], "Team Dashboard: sherbrooke");
    assert_eq!(view["total_rows"], 3);
    assert_eq!(view["filtered_rows"], 1);

    let tabs: Vec<&str> = view["tabs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|tab| tab["name"].as_str().unwrap())
        .collect();
    assert_eq!(tabs, ["Speed", "Power", "Conditioning", "Raw"]);

    let raw = &view["tabs"][3]["raw"];
    let hr_col = raw["headers"]
        .as_array()
        .unwrap()
        .iter()
        .position(|h| h == "HRper")
        .unwrap();
    assert_eq!(raw["rows"][0][hr_col], "25");
}

#[tokio::test]
async fn filter_options_follow_other_selections() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);
    let cookie = login(&app).await;

    let response = app
        .oneshot(api_post(
            "/api/dashboard",
            &cookie,
            json!({ "selections": { "Role": ["Back"] } }),
        ))
        .await
        .unwrap();
    let view = json_body(response).await;

    let players = view["filters"]
        .as_array()
        .unwrap()
        .iter()
        .find(|w| w["column"] == "Player Name")
        .unwrap();
    assert_eq!(players["options"], json!(["Tremblay, Sam"]));
    assert_eq!(view["filtered_rows"], 1);
}

#[tokio::test]
async fn unknown_filter_column_is_a_bad_request() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);
    let cookie = login(&app).await;

    let response = app
        .oneshot(api_post(
            "/api/dashboard",
            &cookie,
            json!({ "selections": { "Jersey": ["7"] } }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn team_without_connection_is_forbidden() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);

    let response = app.clone().oneshot(login_request("mcgill", "redbirds")).await.unwrap();
    let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
    let cookie = set_cookie.split(';').next().unwrap().to_string();

    let response = app
        .oneshot(api_post("/api/dashboard", &cookie, json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn csv_download_contains_filtered_rows() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);
    let cookie = login(&app).await;

    let response = app
        .oneshot(api_post(
            "/api/download/csv",
            &cookie,
            json!({ "selections": { "Role": ["Back"] } }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .contains("dashboard.csv")
    );

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let csv = String::from_utf8(bytes.to_vec()).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("Date,Role,Position,Player Name"));
    assert!(lines[0].ends_with(",HRper"));
    assert!(lines[1].starts_with("2024-10-01,Back,Center,\"Tremblay, Sam\""));
    assert!(lines[1].ends_with(",20"));
}

#[tokio::test]
async fn refresh_drops_cached_data() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);
    let cookie = login(&app).await;

    let first = app
        .clone()
        .oneshot(api_post("/api/refresh", &cookie, json!({})))
        .await
        .unwrap();
    assert_eq!(json_body(first).await["invalidated"], false);

    app.clone()
        .oneshot(api_post("/api/dashboard", &cookie, json!({})))
        .await
        .unwrap();

    let second = app
        .oneshot(api_post("/api/refresh", &cookie, json!({})))
        .await
        .unwrap();
    assert_eq!(json_body(second).await["invalidated"], true);
}

#[tokio::test]
async fn logout_ends_the_session() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);
    let cookie = login(&app).await;

    let response = app
        .clone()
        .oneshot(
            Request::post("/logout")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.headers()[header::LOCATION], "/login");

    let response = app
        .oneshot(api_post("/api/dashboard", &cookie, json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn explore_histograms_the_numeric_values() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);
    let cookie = login(&app).await;

    let response = app
        .oneshot(
            Request::get("/api/explore")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let view = json_body(response).await;
    assert_eq!(view["raw"]["rows"].as_array().unwrap().len(), 4);

    let bins = view["histogram"]["spec"]["data"]["values"].as_array().unwrap();
    assert_eq!(bins.len(), 10);
    let total: u64 = bins.iter().map(|b| b["count"].as_u64().unwrap()).sum();
    assert_eq!(total, 3);
}

#[tokio::test]
async fn hashed_credentials_set_the_configured_cookie() {
    let dir = TempDir::new().unwrap();
    let app = hashed_app(&dir);

    let response = app
        .clone()
        .oneshot(login_request("sherbrooke", "vert-et-or"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/");

    let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
    assert!(set_cookie.starts_with("vert_et_or_session="), "{}", set_cookie);
    assert!(set_cookie.contains("Max-Age=2592000"), "{}", set_cookie);
    let cookie = set_cookie.split(';').next().unwrap().to_string();

    let response = app
        .oneshot(api_post("/api/dashboard", &cookie, json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let view = json_body(response).await;
    assert_eq!(view["welcome"], "Welcome Sherbrooke");
    assert_eq!(view["team"], "sherbrooke");
}

#[tokio::test]
async fn hashed_credentials_reject_wrong_password() {
    let dir = TempDir::new().unwrap();
    let app = hashed_app(&dir);

    // the plaintext secrets are not consulted once hashed credentials exist
    for (user, pass) in [("sherbrooke", "bleus"), ("mcgill", "redbirds")] {
        let response = app.clone().oneshot(login_request(user, pass)).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/login?failed=true");
        assert!(response.headers().get(header::SET_COOKIE).is_none());
    }
}

#[tokio::test]
async fn stalled_remote_sheet_times_out() {
    // accepts connections but never answers
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    let dir = TempDir::new().unwrap();
    let mut settings = settings(&dir);
    settings.secrets.teams.insert("mcgill".into(), "remote".into());
    settings.secrets.connections.insert(
        "remote".into(),
        Connection {
            path: None,
            spreadsheet: Some(format!("http://{}/mcgill.csv", addr)),
            worksheet: None,
        },
    );
    settings.remote_timeout = Duration::from_millis(200);
    let app = router(AppState::new(settings).unwrap());

    let response = app.clone().oneshot(login_request("mcgill", "redbirds")).await.unwrap();
    let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
    let cookie = set_cookie.split(';').next().unwrap().to_string();

    let response = tokio::time::timeout(
        Duration::from_secs(10),
        app.oneshot(api_post("/api/dashboard", &cookie, json!({}))),
    )
    .await
    .expect("request should not hang")
    .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}
