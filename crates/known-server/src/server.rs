use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use known_core::blog::BlogIndex;
use known_core::error::KnownError;
use known_core::frontmatter::{FrontMatter, ParsedPost};
use known_core::model::Folder;
use known_core::posts::PreviewMode;
use known_core::selection::{resolve_selection, SelectionState};
use known_core::store::{with_deadline, with_retry, DocumentStore, FolderStore};

use crate::session::{extract_token, Session, SessionProvider};

/// Shared server state: stores, the blog index, and the session boundary.
pub struct Server {
    folders: Arc<dyn FolderStore>,
    docs: Arc<dyn DocumentStore>,
    blog: BlogIndex,
    sessions: Arc<dyn SessionProvider>,
    preview: PreviewMode,
    store_timeout: Duration,
}

impl Server {
    pub fn new(
        folders: Arc<dyn FolderStore>,
        docs: Arc<dyn DocumentStore>,
        blog: BlogIndex,
        sessions: Arc<dyn SessionProvider>,
        preview: PreviewMode,
        store_timeout: Duration,
    ) -> Self {
        Server {
            folders,
            docs,
            blog,
            sessions,
            preview,
            store_timeout,
        }
    }

    pub fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .route("/api/folders", post(create_folder))
            .route("/api/folders/:folder_id", delete(delete_folder))
            .route("/api/clear-preview", post(clear_preview))
            .route("/app", get(app_index))
            .route("/app/*segments", get(app_selection))
            .route("/blog", get(blog_index))
            .route("/blog/:slug", get(blog_post))
            .with_state(self.clone())
    }

    /// Resolve the request's session, or fail with `AuthRequired`.
    async fn require_session(&self, headers: &HeaderMap) -> Result<Session, KnownError> {
        let token = extract_token(headers).ok_or(KnownError::AuthRequired)?;
        self.sessions
            .session_for(&token)
            .await
            .ok_or(KnownError::AuthRequired)
    }

    async fn create_folder(&self, user_id: &str, name: &str) -> Result<Folder, KnownError> {
        let folders = self.folders.clone();
        let user_id = user_id.to_string();
        let name = name.to_string();
        with_deadline(
            "create_folder",
            self.store_timeout,
            with_retry("create_folder", move || {
                let folders = folders.clone();
                let user_id = user_id.clone();
                let name = name.clone();
                async move { folders.create_folder(&user_id, &name).await }
            }),
        )
        .await
    }

    async fn list_folders(&self, user_id: &str) -> Result<Vec<Folder>, KnownError> {
        let folders = self.folders.clone();
        let user_id = user_id.to_string();
        with_deadline(
            "list_folders",
            self.store_timeout,
            with_retry("list_folders", move || {
                let folders = folders.clone();
                let user_id = user_id.clone();
                async move { folders.list_folders(&user_id).await }
            }),
        )
        .await
    }

    async fn delete_folder(&self, user_id: &str, folder_id: &str) -> Result<(), KnownError> {
        let folders = self.folders.clone();
        let user_id = user_id.to_string();
        let folder_id = folder_id.to_string();
        with_deadline(
            "delete_folder",
            self.store_timeout,
            with_retry("delete_folder", move || {
                let folders = folders.clone();
                let user_id = user_id.clone();
                let folder_id = folder_id.clone();
                async move { folders.delete_folder(&user_id, &folder_id).await }
            }),
        )
        .await
    }

    /// The full `/app` page state: the user's folder list plus whatever the
    /// path segments select.
    async fn app_page(&self, session: &Session, segments: &[String]) -> Result<AppPage, KnownError> {
        let folders = self.list_folders(&session.user.id).await?;
        let selection = with_deadline(
            "resolve_selection",
            self.store_timeout,
            resolve_selection(Some(segments), &folders, self.docs.as_ref()),
        )
        .await?;
        Ok(AppPage { folders, selection })
    }
}

/// Request/response failure, mapped onto the wire.
#[derive(Debug)]
pub enum ApiError {
    Core(KnownError),
    /// Protected page route without a session: send the browser to sign in.
    SignIn,
}

impl From<KnownError> for ApiError {
    fn from(err: KnownError) -> Self {
        ApiError::Core(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::SignIn => Redirect::to("/signin").into_response(),
            ApiError::Core(err) => {
                let status = match &err {
                    KnownError::NotFound { .. } => StatusCode::NOT_FOUND,
                    KnownError::AuthRequired => StatusCode::UNAUTHORIZED,
                    KnownError::Persistence(_) | KnownError::FrontMatter(_) => {
                        error!(error = %err, "request failed");
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                (status, Json(json!({ "error": err.to_string() }))).into_response()
            }
        }
    }
}

/// Missing session on a page route becomes a redirect instead of a 401.
fn page_auth(result: Result<Session, KnownError>) -> Result<Session, ApiError> {
    result.map_err(|err| match err {
        KnownError::AuthRequired => ApiError::SignIn,
        other => ApiError::Core(other),
    })
}

#[derive(Debug, Deserialize)]
pub struct CreateFolderRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct DataEnvelope<T> {
    pub data: T,
}

/// Server-prepared state for the `/app` pages, handed to the render layer.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppPage {
    pub folders: Vec<Folder>,
    #[serde(flatten)]
    pub selection: SelectionState,
}

async fn create_folder(
    State(server): State<Arc<Server>>,
    headers: HeaderMap,
    Json(body): Json<CreateFolderRequest>,
) -> Result<(StatusCode, Json<DataEnvelope<Folder>>), ApiError> {
    let session = server.require_session(&headers).await?;
    let folder = server.create_folder(&session.user.id, &body.name).await?;
    info!(folder = %folder.id, user = %session.user.id, "folder created");
    Ok((StatusCode::CREATED, Json(DataEnvelope { data: folder })))
}

async fn delete_folder(
    State(server): State<Arc<Server>>,
    headers: HeaderMap,
    Path(folder_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let session = server.require_session(&headers).await?;
    server.delete_folder(&session.user.id, &folder_id).await?;
    info!(folder = %folder_id, user = %session.user.id, "folder deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn app_index(
    State(server): State<Arc<Server>>,
    headers: HeaderMap,
) -> Result<Json<AppPage>, ApiError> {
    let session = page_auth(server.require_session(&headers).await)?;
    Ok(Json(server.app_page(&session, &[]).await?))
}

async fn app_selection(
    State(server): State<Arc<Server>>,
    headers: HeaderMap,
    Path(segments): Path<String>,
) -> Result<Json<AppPage>, ApiError> {
    let session = page_auth(server.require_session(&headers).await)?;
    let segments: Vec<String> = segments
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect();
    Ok(Json(server.app_page(&session, &segments).await?))
}

/// Disable preview mode: every blog surface goes back to published-only.
async fn clear_preview(State(server): State<Arc<Server>>) -> &'static str {
    server.preview.clear();
    info!("preview mode cleared");
    "preview mode disabled"
}

async fn blog_index(
    State(server): State<Arc<Server>>,
) -> Result<Json<Vec<FrontMatter>>, ApiError> {
    Ok(Json(server.blog.aggregate().await?))
}

async fn blog_post(
    State(server): State<Arc<Server>>,
    Path(slug): Path<String>,
) -> Result<Json<ParsedPost>, ApiError> {
    Ok(Json(server.blog.render(&slug).await?))
}
