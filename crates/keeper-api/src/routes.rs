use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chrono::Utc;
use keeper_core::auth::{Argon2Hasher, PasswordHasher, TokenSigner};
use keeper_core::crypto::{AesGcmCipher, Cipher, PassthroughCipher};
use keeper_core::db::{Database, LibSqlRecordStore, RecordStore};
use keeper_core::models::{
    base64_bytes, ApiResponse, AuthResponse, LoginRequest, RegisterRequest, SyncRequest,
    SyncResponse,
};
use keeper_core::sync::SyncHandler;
use keeper_core::{Record, RecordId, RecordKind};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::{authenticate, AuthenticatedUser};
use crate::config::AppConfig;
use crate::error::AppError;
use crate::users::{User, UserRepository};

type ServerSync = SyncHandler<LibSqlRecordStore, Arc<dyn Cipher>>;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    store: LibSqlRecordStore,
    users: UserRepository,
    sync: Arc<ServerSync>,
    tokens: Arc<TokenSigner>,
    hasher: Arc<dyn PasswordHasher>,
}

impl AppState {
    pub async fn from_config(config: Arc<AppConfig>) -> Result<Self, AppError> {
        let db = Database::open_location(&config.database).await?;
        Self::with_database(config, db).await
    }

    pub async fn with_database(config: Arc<AppConfig>, db: Database) -> Result<Self, AppError> {
        let shared = Arc::new(tokio::sync::Mutex::new(db));
        let store = LibSqlRecordStore::from_shared(Arc::clone(&shared));
        let users = UserRepository::new(shared).await?;

        let at_rest: Arc<dyn Cipher> = if config.at_rest_encryption {
            let passphrase = config.encryption_key.as_deref().ok_or_else(|| {
                AppError::Config("ENCRYPTION_KEY is required for at-rest encryption".to_string())
            })?;
            Arc::new(AesGcmCipher::from_passphrase(passphrase)?)
        } else {
            tracing::warn!("At-rest encryption is disabled; payloads are stored as received");
            Arc::new(PassthroughCipher)
        };

        let tokens = TokenSigner::new(config.jwt_secret.as_bytes(), config.token_ttl)?;

        Ok(Self {
            sync: Arc::new(SyncHandler::new(store.clone(), at_rest)),
            store,
            users,
            tokens: Arc::new(tokens),
            hasher: Arc::new(Argon2Hasher),
            config,
        })
    }

    fn issue_session(&self, user: &User) -> Result<AuthResponse, AppError> {
        let (token, expires_at) = self.tokens.issue(&user.id, &user.username)?;
        Ok(AuthResponse {
            token,
            user: user.info(),
            expires_at,
        })
    }

    fn at_rest(&self) -> &dyn Cipher {
        self.sync.cipher().as_ref()
    }

    fn outbound(&self, record: Record) -> Result<Record, AppError> {
        let payload = self.at_rest().decrypt(&record.payload)?;
        Ok(record.with_payload(payload))
    }

    /// A live record owned by `user`; anything else reads as missing.
    async fn owned_record(
        &self,
        user: &AuthenticatedUser,
        id: &RecordId,
    ) -> Result<Record, AppError> {
        let record = self.store.get(id).await?;
        if record.owner_id != user.user_id || record.is_deleted {
            return Err(AppError::not_found(format!("record {id}")));
        }
        Ok(record)
    }
}

pub fn app_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route(
            "/data",
            get(list_records)
                .post(create_record)
                .put(update_record)
                .delete(delete_record),
        )
        .route("/sync", post(sync))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let api_routes = Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .merge(protected_routes);

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
}

async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
    })
}

async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = authenticate(state.tokens.as_ref(), request.headers())?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<AuthResponse>>, AppError> {
    let Json(request) = payload?;
    request.validate()?;

    let proof = state.hasher.hash(&request.password)?;
    let user = state
        .users
        .create(request.username.trim(), request.email.trim(), &proof)
        .await?;

    let session = state.issue_session(&user)?;
    Ok(Json(
        ApiResponse::ok(session).with_message("User registered successfully"),
    ))
}

async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<AuthResponse>>, AppError> {
    let Json(request) = payload?;

    let user = state
        .users
        .find_by_username(request.username.trim())
        .await?
        .ok_or_else(|| AppError::unauthorized("invalid credentials"))?;
    if !state.hasher.verify(&request.password, &user.password_hash)? {
        tracing::info!(user = %user.id, "Rejected login");
        return Err(AppError::unauthorized("invalid credentials"));
    }

    let session = state.issue_session(&user)?;
    tracing::info!(user = %user.id, "User logged in");
    Ok(Json(ApiResponse::ok(session).with_message("Login successful")))
}

/// Record fields a client may set through the CRUD endpoints.
#[derive(Debug, Deserialize)]
struct RecordInput {
    #[serde(default)]
    id: Option<RecordId>,
    kind: RecordKind,
    title: String,
    #[serde(with = "base64_bytes")]
    payload: Vec<u8>,
    #[serde(default)]
    metadata: String,
}

impl RecordInput {
    fn check(&self) -> Result<(), AppError> {
        keeper_core::models::validate_title(self.title.trim())?;
        if self.payload.is_empty() {
            return Err(AppError::bad_request("payload must not be empty"));
        }
        Ok(())
    }
}

async fn list_records(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<ApiResponse<Vec<Record>>>, AppError> {
    let records = state
        .store
        .list(&user.user_id)
        .await?
        .into_iter()
        .map(|record| state.outbound(record))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(ApiResponse::ok(records)))
}

async fn create_record(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    payload: Result<Json<RecordInput>, JsonRejection>,
) -> Result<Json<ApiResponse<Record>>, AppError> {
    let Json(input) = payload?;
    input.check()?;

    // Same answer whoever holds the id.
    let id = input.id.unwrap_or_default();
    match state.store.get(&id).await {
        Ok(_) => return Err(AppError::bad_request("record id is already in use")),
        Err(keeper_core::Error::NotFound(_)) => {}
        Err(error) => return Err(error.into()),
    }

    let mut record = Record::new(
        &user.user_id,
        input.kind,
        input.title.trim(),
        input.payload,
        input.metadata.trim(),
    );
    record.id = id;

    let stored = record.with_payload(state.at_rest().encrypt(&record.payload)?);
    let saved = state.store.save(&stored).await?;
    tracing::info!(endpoint = "data_create", record = %saved.id, "Record created");
    Ok(Json(
        ApiResponse::ok(saved.with_payload(record.payload)).with_message("Record created"),
    ))
}

async fn update_record(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    payload: Result<Json<RecordInput>, JsonRejection>,
) -> Result<Json<ApiResponse<Record>>, AppError> {
    let Json(input) = payload?;
    input.check()?;
    let id = input
        .id
        .ok_or_else(|| AppError::bad_request("id is required"))?;

    let existing = state.owned_record(&user, &id).await?;
    let updated = Record {
        kind: input.kind,
        title: input.title.trim().to_string(),
        payload: state.at_rest().encrypt(&input.payload)?,
        metadata: input.metadata.trim().to_string(),
        version: existing.version + 1,
        ..existing
    };

    let saved = state.store.save(&updated).await?;
    tracing::info!(
        endpoint = "data_update",
        record = %saved.id,
        version = saved.version,
        "Record updated"
    );
    Ok(Json(
        ApiResponse::ok(saved.with_payload(input.payload)).with_message("Record updated"),
    ))
}

#[derive(Debug, Deserialize)]
struct DeleteQuery {
    id: Option<String>,
}

async fn delete_record(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    query: Result<Query<DeleteQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<RecordId>>, AppError> {
    let Query(query) = query?;
    let raw = keeper_core::util::normalize_text_option(query.id)
        .ok_or_else(|| AppError::bad_request("id is required"))?;
    let id: RecordId = raw
        .parse()
        .map_err(|_| AppError::bad_request(format!("invalid record id: {raw}")))?;

    state.owned_record(&user, &id).await?;
    state.store.soft_delete(&id).await?;
    tracing::info!(endpoint = "data_delete", record = %id, "Record deleted");
    Ok(Json(ApiResponse::ok(id).with_message("Record deleted")))
}

async fn sync(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    payload: Result<Json<SyncRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<SyncResponse>>, AppError> {
    let Json(request) = payload?;
    let incoming = request.changes.len();

    let response = state
        .sync
        .merge(&user.user_id, request.since, request.changes)
        .await?;
    tracing::info!(
        endpoint = "sync",
        user = %user.username,
        incoming,
        outgoing = response.changes.len(),
        conflicts = response.conflicts.len(),
        "Served sync round"
    );
    Ok(Json(ApiResponse::ok(response)))
}
