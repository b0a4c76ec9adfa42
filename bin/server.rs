// Cardbox - Web API Server
// The single access path to the store: browsers talk JSON to these handlers
// and never hold store credentials themselves.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use cardbox::{
    auth, composer, filter_cards, storage, AuthError, CardError, CardForm, CardRow, CardStore,
    FsObjectStore, SearchField, SessionRecord, SqliteStore, UploadFile,
};

/// Shared application state
#[derive(Clone)]
struct AppState {
    store: Arc<SqliteStore>,
    images: Arc<FsObjectStore>,
}

// ============================================================================
// Response envelopes
// ============================================================================

/// Error envelope: { message, error? } with a non-200 status.
#[derive(Serialize)]
struct ErrorBody {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

struct ApiError {
    status: StatusCode,
    message: String,
    detail: Option<String>,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        ApiError {
            status,
            message: message.into(),
            detail: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            message: self.message,
            error: self.detail,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<CardError> for ApiError {
    fn from(e: CardError) -> Self {
        let status = match &e {
            CardError::ValidationFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CardError::InvalidAttachment(_) => StatusCode::BAD_REQUEST,
            CardError::MasterDataConflict { .. } => StatusCode::CONFLICT,
            CardError::StorageUnavailable(_) => StatusCode::BAD_GATEWAY,
            CardError::MasterDataUnavailable { .. } | CardError::WriteFailed(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        eprintln!("request failed: {}", e);
        ApiError::new(status, e.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        let status = match &e {
            AuthError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AuthError::EmailTaken => StatusCode::CONFLICT,
            AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AuthError::Unavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError::new(status, e.to_string())
    }
}

fn store_failure(context: &str, detail: impl std::fmt::Display) -> ApiError {
    eprintln!("{}: {}", context, detail);
    ApiError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: format!("{} failed", context),
        detail: Some(detail.to_string()),
    }
}

// ============================================================================
// Session gate
// ============================================================================

/// Pull the session token out of Authorization: Bearer or X-Session-Token.
fn session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(header::AUTHORIZATION) {
        if let Ok(text) = value.to_str() {
            if let Some(token) = text.strip_prefix("Bearer ") {
                return Some(token.trim().to_string());
            }
        }
    }
    headers
        .get("x-session-token")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
}

/// All card endpoints require a live session.
fn require_session(state: &AppState, headers: &HeaderMap) -> Result<SessionRecord, ApiError> {
    let token = session_token(headers)
        .ok_or_else(|| ApiError::new(StatusCode::UNAUTHORIZED, "sign in required"))?;

    match auth::current_session(state.store.as_ref(), &token) {
        Ok(Some(session)) => Ok(session),
        Ok(None) => Err(ApiError::new(StatusCode::UNAUTHORIZED, "sign in required")),
        Err(e) => Err(ApiError::from(e)),
    }
}

// ============================================================================
// Auth handlers
// ============================================================================

#[derive(Deserialize)]
struct Credentials {
    email: String,
    password: String,
}

#[derive(Serialize)]
struct SignInResponse {
    token: String,
}

/// POST /api/auth/signup
async fn post_signup(
    State(state): State<AppState>,
    Json(creds): Json<Credentials>,
) -> Result<impl IntoResponse, ApiError> {
    auth::sign_up(state.store.as_ref(), &creds.email, &creds.password)?;
    let token = auth::sign_in(state.store.as_ref(), &creds.email, &creds.password)?;
    Ok((StatusCode::CREATED, Json(SignInResponse { token })))
}

/// POST /api/auth/signin
async fn post_signin(
    State(state): State<AppState>,
    Json(creds): Json<Credentials>,
) -> Result<impl IntoResponse, ApiError> {
    let token = auth::sign_in(state.store.as_ref(), &creds.email, &creds.password)?;
    Ok(Json(SignInResponse { token }))
}

/// POST /api/auth/signout
async fn post_signout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(token) = session_token(&headers) {
        auth::sign_out(state.store.as_ref(), &token)?;
    }
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/auth/session - current session, if any
async fn get_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let session = require_session(&state, &headers)?;
    Ok(Json(session))
}

// ============================================================================
// Card handlers
// ============================================================================

#[derive(Deserialize)]
struct ListQuery {
    term: Option<String>,
    field: Option<String>,
}

/// GET /api/cards?term=&field= - joined listing, filtered in memory
async fn get_cards(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<CardRow>>, ApiError> {
    require_session(&state, &headers)?;

    let rows = state
        .store
        .list_cards()
        .map_err(|e| store_failure("card listing", e))?;

    let field = match query.field.as_deref() {
        Some(name) => SearchField::from_str(name).ok_or_else(|| {
            ApiError::new(
                StatusCode::BAD_REQUEST,
                format!("unknown search field '{}'", name),
            )
        })?,
        None => SearchField::All,
    };
    let term = query.term.as_deref().unwrap_or("");

    Ok(Json(filter_cards(&rows, term, field)))
}

/// POST /api/cards - register a card from label + scalar fields
async fn post_card(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(form): Json<CardForm>,
) -> Result<impl IntoResponse, ApiError> {
    require_session(&state, &headers)?;

    let id = composer::submit(
        state.store.as_ref(),
        state.images.as_ref(),
        &form,
        None,
        None,
    )?;
    let row = fetch_card(&state, id)?;

    Ok((StatusCode::CREATED, Json(row)))
}

/// GET /api/cards/:id
async fn get_card(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<CardRow>, ApiError> {
    require_session(&state, &headers)?;
    Ok(Json(fetch_card(&state, id)?))
}

/// PUT /api/cards/:id - full replace with re-resolved labels
async fn put_card(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(form): Json<CardForm>,
) -> Result<Json<CardRow>, ApiError> {
    require_session(&state, &headers)?;

    composer::submit(
        state.store.as_ref(),
        state.images.as_ref(),
        &form,
        None,
        Some(id),
    )?;

    Ok(Json(fetch_card(&state, id)?))
}

/// DELETE /api/cards/:id - image cleanup (best-effort), then the row
async fn delete_card(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    require_session(&state, &headers)?;

    composer::delete(state.store.as_ref(), state.images.as_ref(), id)?;
    Ok(StatusCode::NO_CONTENT)
}

fn fetch_card(state: &AppState, id: i64) -> Result<CardRow, ApiError> {
    state
        .store
        .get_card(id)
        .map_err(|e| store_failure("card lookup", e))?
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, format!("card {} not found", id)))
}

// ============================================================================
// Image handlers
// ============================================================================

/// POST /api/cards/:id/image - raw image body, Content-Type required
async fn post_card_image(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    body: Bytes,
) -> Result<Json<CardRow>, ApiError> {
    require_session(&state, &headers)?;

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();

    let row = fetch_card(&state, id)?;
    let file = UploadFile {
        file_name: format!("card-{}", id),
        content_type,
        bytes: body.to_vec(),
    };

    // Re-submit the row's own fields with the new file attached; the
    // composer handles naming, upload, and stale-object cleanup.
    composer::submit(
        state.store.as_ref(),
        state.images.as_ref(),
        &row.to_form(),
        Some(&file),
        Some(id),
    )?;

    Ok(Json(fetch_card(&state, id)?))
}

#[derive(Serialize)]
struct ImageUrlResponse {
    url: String,
}

/// GET /api/cards/:id/image - signed view URL, valid for one hour
async fn get_card_image(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<ImageUrlResponse>, ApiError> {
    require_session(&state, &headers)?;

    let row = fetch_card(&state, id)?;
    let image_ref = row
        .image_ref
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "card has no image"))?;

    let url = storage::view_url(state.images.as_ref(), &image_ref)
        .map_err(|e| ApiError::new(StatusCode::BAD_GATEWAY, format!("unable to load image: {}", e)))?;

    Ok(Json(ImageUrlResponse { url }))
}

#[derive(Deserialize)]
struct SignedQuery {
    expires: i64,
    token: String,
}

/// GET /images/*path - signature-checked object retrieval
async fn get_image(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Query(query): Query<SignedQuery>,
) -> Result<Response, ApiError> {
    let decoded = urlencoding::decode(&path)
        .map(|s| s.into_owned())
        .unwrap_or(path);

    // Signed URLs are the only grant; no session is involved here.
    if decoded.contains("..") || !state.images.verify_token(&decoded, query.expires, &query.token) {
        return Err(ApiError::new(StatusCode::FORBIDDEN, "invalid or expired link"));
    }

    let full = state.images.object_path(&decoded);
    let bytes = tokio::fs::read(&full)
        .await
        .map_err(|_| ApiError::new(StatusCode::NOT_FOUND, "image not found"))?;

    let content_type = match full.extension().and_then(|e| e.to_str()) {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    };

    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}

// ============================================================================
// Health
// ============================================================================

#[derive(Serialize)]
struct Health {
    status: &'static str,
    version: &'static str,
}

/// GET /api/health
async fn health_check() -> impl IntoResponse {
    Json(Health {
        status: "ok",
        version: cardbox::VERSION,
    })
}

// ============================================================================
// Main Server
// ============================================================================

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[tokio::main]
async fn main() {
    println!("📇 Cardbox - Web API Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let db_path = env_or("CARDBOX_DB", "cardbox.db");
    let storage_dir = env_or("CARDBOX_STORAGE_DIR", "storage");
    let addr = env_or("CARDBOX_ADDR", "0.0.0.0:3000");
    let base_url = env_or("CARDBOX_BASE_URL", "http://localhost:3000");
    let secret = env_or("CARDBOX_SECRET", "dev-secret");

    let store = match SqliteStore::open(std::path::Path::new(&db_path)) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("❌ Failed to open database {}: {}", db_path, e);
            std::process::exit(1);
        }
    };
    println!("✓ Database opened: {}", db_path);

    let state = AppState {
        store: Arc::new(store),
        images: Arc::new(FsObjectStore::new(storage_dir, base_url, secret)),
    };

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/auth/signup", post(post_signup))
        .route("/auth/signin", post(post_signin))
        .route("/auth/signout", post(post_signout))
        .route("/auth/session", get(get_session))
        .route("/cards", get(get_cards).post(post_card))
        .route(
            "/cards/:id",
            get(get_card).put(put_card).delete(delete_card),
        )
        .route("/cards/:id/image", get(get_card_image).post(post_card_image));

    let app = Router::new()
        .nest("/api", api_routes)
        .route("/images/*path", get(get_image))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("❌ Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    println!("\n🚀 Server running on http://{}", addr);
    println!("   API: http://{}/api/cards", addr);
    println!("\n   Press Ctrl+C to stop\n");

    if let Err(e) = axum::serve(listener, app).await {
        eprintln!("❌ Server error: {}", e);
        std::process::exit(1);
    }
}
