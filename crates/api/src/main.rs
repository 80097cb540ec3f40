use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use folio_core::admin::{AdminWorkflow, WorkflowError};
use folio_core::auth::{LoginOutcome, SessionGate, SessionToken};
use folio_core::domain::browse::{filter_by_sector, sector_chips, SectorFilter};
use folio_core::domain::report::{Report, Tone};
use folio_core::ingest::{download_link, AttachmentSlot, DownloadLink, EmbeddedFile};
use folio_core::repository::ReportRepository;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = folio_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let kv = match folio_core::storage::open_store(&settings).await {
        Ok(kv) => kv,
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "store open failed");
            return Err(e);
        }
    };

    let state = AppState {
        repo: ReportRepository::new(kv.clone()),
        gate: SessionGate::new(kv, settings.admin_credential()),
    };

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], settings.port()));
    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/research", get(list_research))
        .route("/research/:id", get(get_research))
        .route("/admin/login", post(login))
        .route("/admin/logout", post(logout))
        .route("/admin/dashboard", get(dashboard))
        .route("/admin/reports", post(create_report))
        .route("/admin/reports/:id", put(update_report).delete(delete_report))
        .layer(DefaultBodyLimit::disable())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    repo: ReportRepository,
    gate: SessionGate,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn internal(err: anyhow::Error) -> Self {
        sentry_anyhow::capture_anyhow(&err);
        tracing::error!(error = %err, "request failed");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
    }

    /// Workflow failures keep their user-facing text; anything else is a rejected form.
    fn from_workflow(err: anyhow::Error) -> Self {
        if err.downcast_ref::<WorkflowError>().is_some() {
            sentry_anyhow::capture_anyhow(&err);
            return Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error saving report. Please try again.",
            );
        }
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, format!("{err:#}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

#[derive(Debug, Serialize)]
struct ReportView {
    #[serde(flatten)]
    report: Report,
    recommendation_tone: Option<Tone>,
    upside_direction: Option<Tone>,
    pdf: Option<DownloadLink>,
    excel: Option<DownloadLink>,
}

impl From<Report> for ReportView {
    fn from(report: Report) -> Self {
        Self {
            recommendation_tone: report.recommendation_tone(),
            upside_direction: report.upside_direction(),
            pdf: download_link(&report.title, AttachmentSlot::Pdf, &report.pdf_url),
            excel: download_link(&report.title, AttachmentSlot::Spreadsheet, &report.excel_url),
            report,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ResearchQuery {
    sector: Option<String>,
}

#[derive(Debug, Serialize)]
struct ResearchPage {
    sectors: Vec<String>,
    selected: String,
    reports: Vec<ReportView>,
}

async fn list_research(
    State(state): State<AppState>,
    Query(query): Query<ResearchQuery>,
) -> Json<ResearchPage> {
    let reports = state.repo.list().await;
    let filter = SectorFilter::parse(query.sector.as_deref());
    let chips = sector_chips(&reports, &filter);

    Json(ResearchPage {
        sectors: chips.options,
        selected: chips.selected,
        reports: filter_by_sector(reports, &filter)
            .into_iter()
            .map(ReportView::from)
            .collect(),
    })
}

async fn get_research(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ReportView>, ApiError> {
    let id = parse_id(&id)?;
    let report = state
        .repo
        .find_by_id(id)
        .await
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "Analysis not found"))?;
    Ok(Json(report.into()))
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    password: String,
}

const SESSION_COOKIE: &str = "folio_session";

/// The session presented by the request: a bearer token, else the session cookie.
fn session_from(headers: &HeaderMap) -> Option<SessionToken> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if let Some(token) = bearer {
        return SessionToken::parse(token);
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .and_then(|(_, value)| SessionToken::parse(value))
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    match state.gate.login(&req.password).await.map_err(ApiError::internal)? {
        LoginOutcome::Granted { session } => {
            let cookie = format!("{SESSION_COOKIE}={session}; Path=/; HttpOnly; SameSite=Strict");
            let body = Json(serde_json::json!({ "authenticated": true, "token": session.as_str() }));
            Ok(([(header::SET_COOKIE, cookie)], body).into_response())
        }
        LoginOutcome::Denied { message } => Err(ApiError::new(StatusCode::UNAUTHORIZED, message)),
    }
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, ApiError> {
    if let Some(session) = session_from(&headers) {
        state.gate.logout(&session).await.map_err(ApiError::internal)?;
    }
    let cookie = format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Strict; Max-Age=0");
    Ok((StatusCode::NO_CONTENT, [(header::SET_COOKIE, cookie)]).into_response())
}

async fn dashboard(State(state): State<AppState>, headers: HeaderMap) -> Response {
    match enter(&state, &headers).await {
        Ok(wf) => Json(wf.reports().to_vec()).into_response(),
        Err(_) => Redirect::to(folio_core::admin::workflow::LOGIN_ROUTE).into_response(),
    }
}

async fn create_report(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Report>), ApiError> {
    let mut wf = enter(&state, &headers).await?;
    read_form(&mut wf, multipart).await?;
    let report = wf.submit().await.map_err(ApiError::from_workflow)?;
    Ok((StatusCode::CREATED, Json(report)))
}

async fn update_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<Report>, ApiError> {
    let id = parse_id(&id)?;
    let mut wf = enter(&state, &headers).await?;
    if !wf.begin_edit(id).await {
        return Err(ApiError::new(StatusCode::NOT_FOUND, "Report not found"));
    }
    read_form(&mut wf, multipart).await?;
    wf.save_edit()
        .await
        .map_err(ApiError::from_workflow)?
        .map(Json)
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "Report not found"))
}

#[derive(Debug, Deserialize)]
struct DeleteQuery {
    #[serde(default)]
    confirm: bool,
}

async fn delete_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<DeleteQuery>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id)?;
    let mut wf = enter(&state, &headers).await?;
    if !query.confirm {
        return Err(ApiError::new(
            StatusCode::CONFLICT,
            folio_core::admin::workflow::DELETE_PROMPT,
        ));
    }
    let confirm = |_: &str| true;
    wf.delete(id, &confirm).await.map_err(ApiError::from_workflow)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn enter(state: &AppState, headers: &HeaderMap) -> Result<AdminWorkflow, ApiError> {
    let session = session_from(headers)
        .ok_or_else(|| ApiError::new(StatusCode::UNAUTHORIZED, "admin session required"))?;
    AdminWorkflow::enter(state.repo.clone(), state.gate.clone(), session)
        .await
        .map_err(|e| ApiError::new(StatusCode::UNAUTHORIZED, e.to_string()))
}

/// Text parts become field updates; `pdf`, `excel` and `logo` parts become attachments.
async fn read_form(wf: &mut AdminWorkflow, mut multipart: Multipart) -> Result<(), ApiError> {
    let bad_request = |e: &dyn std::fmt::Display| ApiError::new(StatusCode::BAD_REQUEST, e.to_string());

    while let Some(field) = multipart.next_field().await.map_err(|e| bad_request(&e))? {
        let name = field.name().unwrap_or_default().to_string();

        if let Some(slot) = AttachmentSlot::from_form_name(&name) {
            let file_name = field.file_name().unwrap_or(&name).to_string();
            let content_type = field.content_type().map(str::to_string);
            let bytes = field.bytes().await.map_err(|e| bad_request(&e))?;
            if bytes.is_empty() {
                continue;
            }
            tracing::debug!(?slot, file_name = %file_name, bytes = bytes.len(), "upload received");
            wf.select_upload(
                slot,
                EmbeddedFile::from_bytes(&file_name, content_type.as_deref(), &bytes),
            );
            continue;
        }

        let value = field.text().await.map_err(|e| bad_request(&e))?;
        wf.set_field(&name, value).map_err(|e| bad_request(&e))?;
    }
    Ok(())
}

fn parse_id(raw: &str) -> Result<i64, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::new(StatusCode::BAD_REQUEST, format!("invalid report id {raw:?}")))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &folio_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, HeaderValue, Request};
    use folio_core::auth::{hash_password, Credential};
    use folio_core::storage::MemoryStore;
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    const PASSWORD: &str = "let-me-in";
    const BOUNDARY: &str = "folio-test-boundary";

    fn app() -> Router {
        let kv = Arc::new(MemoryStore::new());
        let credential = Credential::from_phc(hash_password(PASSWORD).unwrap()).unwrap();
        router(AppState {
            repo: ReportRepository::new(kv.clone()),
            gate: SessionGate::new(kv, Some(credential)),
        })
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Option<Value>, Option<String>) {
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let location = res
            .headers()
            .get(header::LOCATION)
            .map(|v| v.to_str().unwrap().to_string());
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).ok();
        (status, json, location)
    }

    fn get(path: &str) -> Request<Body> {
        Request::get(path).body(Body::empty()).unwrap()
    }

    fn login_req(password: &str) -> Request<Body> {
        Request::post("/admin/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::json!({ "password": password }).to_string()))
            .unwrap()
    }

    /// Logs in and returns the session token, checking the cookie carries the same one.
    async fn login(app: &Router) -> String {
        let res = app.clone().oneshot(login_req(PASSWORD)).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let cookie = res.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        let token = body["token"].as_str().unwrap().to_string();
        assert!(cookie.starts_with(&format!("folio_session={token};")));
        token
    }

    fn with_cookie(mut req: Request<Body>, token: &str) -> Request<Body> {
        req.headers_mut().insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("theme=dark; folio_session={token}")).unwrap(),
        );
        req
    }

    fn with_bearer(mut req: Request<Body>, token: &str) -> Request<Body> {
        req.headers_mut().insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        req
    }

    fn multipart(method: &str, path: &str, fields: &[(&str, &str)], files: &[(&str, &str, &[u8])]) -> Request<Body> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        for (name, file_name, bytes) in files {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method(method)
            .uri(path)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn healthz_ok() {
        let res = app().oneshot(get("/healthz")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn wrong_password_keeps_dashboard_closed() {
        let app = app();
        let (status, body, _) = send(&app, login_req("nope")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body.unwrap()["error"], "Invalid password");

        let (status, _, location) = send(&app, get("/admin/dashboard")).await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        assert_eq!(location.as_deref(), Some("/admin"));
    }

    #[tokio::test]
    async fn correct_password_opens_dashboard() {
        let app = app();
        let token = login(&app).await;

        let (status, body, _) = send(&app, with_cookie(get("/admin/dashboard"), &token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.unwrap(), serde_json::json!([]));

        let (status, _, _) = send(&app, with_bearer(get("/admin/dashboard"), &token)).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn admin_writes_require_login() {
        let app = app();
        let req = multipart("POST", "/admin/reports", &[("title", "Acme Corp")], &[]);
        let (status, _, _) = send(&app, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn another_client_gets_no_admin_access() {
        let app = app();
        let token = login(&app).await;
        let req = multipart(
            "POST",
            "/admin/reports",
            &[("title", "Acme Corp"), ("ticker", "acme"), ("sector", "Tech")],
            &[],
        );
        let (_, body, _) = send(&app, with_cookie(req, &token)).await;
        let id = body.unwrap()["id"].as_i64().unwrap();

        let (status, _, location) = send(&app, get("/admin/dashboard")).await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        assert_eq!(location.as_deref(), Some("/admin"));

        let delete = || {
            Request::delete(format!("/admin/reports/{id}?confirm=true"))
                .body(Body::empty())
                .unwrap()
        };
        let (status, _, _) = send(&app, delete()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let forged = "0123456789abcdef0123456789abcdef";
        let (status, _, _) = send(&app, with_bearer(delete(), forged)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _, _) = send(&app, get(&format!("/research/{id}"))).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn logout_ends_only_that_session() {
        let app = app();
        let first = login(&app).await;
        let second = login(&app).await;

        let logout = Request::post("/admin/logout").body(Body::empty()).unwrap();
        let (status, _, _) = send(&app, with_cookie(logout, &first)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _, _) = send(&app, with_cookie(get("/admin/dashboard"), &first)).await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        let (status, _, _) = send(&app, with_cookie(get("/admin/dashboard"), &second)).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn created_report_is_browsable() {
        let app = app();
        let token = login(&app).await;

        let req = multipart(
            "POST",
            "/admin/reports",
            &[
                ("title", "Acme Corp"),
                ("ticker", "acme"),
                ("sector", "Tech"),
                ("recommendation", "Buy"),
            ],
            &[("pdf", "acme.pdf", &b"%PDF"[..])],
        );
        let (status, body, _) = send(&app, with_cookie(req, &token)).await;
        assert_eq!(status, StatusCode::CREATED);
        let id = body.unwrap()["id"].as_i64().unwrap();

        let (status, body, _) = send(&app, get("/research")).await;
        assert_eq!(status, StatusCode::OK);
        let page = body.unwrap();
        assert_eq!(page["sectors"], serde_json::json!(["all", "Tech"]));
        assert_eq!(page["reports"].as_array().unwrap().len(), 1);
        assert_eq!(page["reports"][0]["ticker"], "ACME");

        let (_, body, _) = send(&app, get("/research?sector=Energy")).await;
        assert!(body.unwrap()["reports"].as_array().unwrap().is_empty());

        let (status, body, _) = send(&app, get(&format!("/research/{id}"))).await;
        assert_eq!(status, StatusCode::OK);
        let detail = body.unwrap();
        assert_eq!(detail["valuation"]["metrics"]["recommendation"], "Buy");
        assert_eq!(detail["recommendation_tone"], "positive");
        assert_eq!(detail["pdf"]["href"], "data:application/pdf;base64,JVBERg==");
        assert_eq!(detail["pdf"]["download_name"], "Acme Corp - Research Report.pdf");
        assert!(detail["excel"].is_null());
    }

    #[tokio::test]
    async fn update_keeps_unsupplied_fields() {
        let app = app();
        let token = login(&app).await;
        let req = multipart(
            "POST",
            "/admin/reports",
            &[("title", "Acme Corp"), ("ticker", "acme"), ("sector", "Tech")],
            &[("excel", "model.xlsx", &b"PK"[..])],
        );
        let (_, body, _) = send(&app, with_cookie(req, &token)).await;
        let created = body.unwrap();
        let id = created["id"].as_i64().unwrap();

        let req = multipart(
            "PUT",
            &format!("/admin/reports/{id}"),
            &[("valuation.metrics.upside", "-4%")],
            &[],
        );
        let (status, body, _) = send(&app, with_cookie(req, &token)).await;
        assert_eq!(status, StatusCode::OK);
        let updated = body.unwrap();
        assert_eq!(updated["id"], created["id"]);
        assert_eq!(updated["title"], "Acme Corp");
        assert_eq!(updated["excelUrl"], created["excelUrl"]);
        assert_eq!(updated["valuation"]["metrics"]["upside"], "-4%");

        let (_, body, _) = send(&app, get(&format!("/research/{id}"))).await;
        assert_eq!(body.unwrap()["upside_direction"], "negative");

        let req = multipart("PUT", &format!("/admin/reports/{}", id + 1), &[], &[]);
        let (status, _, _) = send(&app, with_cookie(req, &token)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_needs_confirmation() {
        let app = app();
        let token = login(&app).await;
        let req = multipart(
            "POST",
            "/admin/reports",
            &[("title", "Acme Corp"), ("ticker", "acme"), ("sector", "Tech")],
            &[],
        );
        let (_, body, _) = send(&app, with_cookie(req, &token)).await;
        let id = body.unwrap()["id"].as_i64().unwrap();

        let del = |q: &str| {
            Request::delete(format!("/admin/reports/{id}{q}"))
                .body(Body::empty())
                .unwrap()
        };
        let (status, _, _) = send(&app, with_cookie(del(""), &token)).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _, _) = send(&app, with_cookie(del("?confirm=true"), &token)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _, _) = send(&app, get(&format!("/research/{id}"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn rejects_bad_ids_and_unknown_fields() {
        let app = app();
        let (status, _, _) = send(&app, get("/research/not-a-number")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let token = login(&app).await;
        let req = multipart("POST", "/admin/reports", &[("rating", "AAA")], &[]);
        let (status, _, _) = send(&app, with_cookie(req, &token)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let req = multipart("POST", "/admin/reports", &[("title", "No ticker")], &[]);
        let (status, body, _) = send(&app, with_cookie(req, &token)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body.unwrap()["error"].as_str().unwrap().contains("ticker"));
    }
}
