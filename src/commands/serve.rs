use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::OnceLock;

use axum::async_trait;
use axum::body::{self, Bytes};
use axum::extract::{
    ConnectInfo, DefaultBodyLimit, FromRequestParts, Multipart, Path, Query, State,
};
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use regex::Regex;
use serde::Deserialize;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};
use urlencoding::encode;

use crate::controllers::paste::{self as pastes, SubmitForm, Upload};
use crate::diff::{Diff, DiffMode};
use crate::error::ValidationError;
use crate::hashing::user_fingerprint;
use crate::types::api::{
    CompareView, PasteList, PasteSummary, PasteView, TreeView, UploadPaste,
};
use crate::types::RequestContext;
use crate::{App, AppError};

/// The manual for the service in man page form.
const MANUAL: &str = include_str!("../../assets/manual.txt");

pub async fn run(app: App) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([127, 0, 0, 1], app.config.port));
    info!("listening on {addr}");

    axum::Server::bind(&addr)
        .serve(router(app).into_make_service_with_connect_info::<SocketAddr>())
        .await?;

    Ok(())
}

pub fn router(app: App) -> Router {
    let max_upload_size = app.config.limits.max_upload_size;

    Router::new()
        .route("/", get(index).post(upload_paste))
        .route("/new", get(new_paste))
        .route("/all", get(list_pastes))
        .route("/compare/:old/:new", get(compare_pastes))
        .route("/unidiff/:old/:new", get(unidiff_pastes))
        .route("/:id", get(show_paste).delete(delete_paste))
        .route("/:id/", get(show_paste).delete(delete_paste)) // hack
        .route("/:id/raw", get(raw_paste))
        .route("/:id/tree", get(show_tree))
        .route("/:id/attachments/:file_name", get(get_attachment))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_size))
        .layer(TraceLayer::new_for_http())
        .with_state(app)
}

/// The submitter of the current request, fingerprinted from the client
/// address.
struct Submitter(RequestContext);

#[async_trait]
impl FromRequestParts<App> for Submitter {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, app: &App) -> Result<Self, Self::Rejection> {
        let client = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_default();
        Ok(Submitter(RequestContext {
            user_hash: user_fingerprint(&app.config.fingerprint.secret, &client),
        }))
    }
}

async fn index() -> &'static str {
    MANUAL
}

#[derive(Deserialize)]
struct NewParams {
    reply_to: Option<String>,
}

async fn new_paste(
    State(mut app): State<App>,
    Query(params): Query<NewParams>,
) -> crate::AppResult<impl IntoResponse> {
    let draft = pastes::draft_reply(&mut app, params.reply_to.as_deref()).await?;
    Ok(Json(draft))
}

async fn upload_paste(
    State(mut app): State<App>,
    Submitter(ctx): Submitter,
    mut multipart: Multipart,
) -> crate::AppResult<impl IntoResponse> {
    let mut form = SubmitForm {
        spam_checked: true,
        ..SubmitForm::default()
    };
    let mut uploads = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_owned();
        let file_name = field.file_name().map(ToOwned::to_owned);

        if name.starts_with("file_") {
            let data = field.bytes().await?;
            let Some(file_name) = file_name.as_deref().and_then(secure_filename) else {
                continue;
            };
            if !app.config.attachments.enabled || !app.config.attachments.allows(&file_name) {
                debug!("ignoring attachment '{file_name}'");
                continue;
            }
            if !data.is_empty() {
                uploads.push(Upload { file_name, data });
            }
            continue;
        }

        let value = field.text().await?;
        match name.as_str() {
            "code" => form.code = value,
            "language" => form.language = value,
            "password" => form.password = value,
            "parent" => form.parent = Some(value.trim_start_matches('#').to_owned()),
            "private" => form.private = !matches!(value.as_str(), "0" | "false"),
            // honeypot field, invisible to humans
            "webpage" => form.spam_checked = value.is_empty(),
            _ => {}
        }
    }

    let paste = pastes::submit(&mut app, &ctx, &form, uploads).await?;

    let id = app.store.identifier(&paste);
    let path = format!("/{id}");
    let url = format!("{base_url}{path}", base_url = app.config.base_url);

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, path)],
        Json(UploadPaste {
            id,
            url,
            parent: paste.parent_id.map(|parent| app.store.codec().encode(parent)),
        }),
    ))
}

async fn show_paste(
    State(mut app): State<App>,
    Path(id): Path<String>,
) -> crate::AppResult<impl IntoResponse> {
    let (paste, attachments) = pastes::fetch(&mut app, &id).await?;
    Ok(Json(PasteView::new(app.store.codec(), paste, &attachments)))
}

async fn raw_paste(
    State(mut app): State<App>,
    Path(id): Path<String>,
) -> crate::AppResult<impl IntoResponse> {
    let code = pastes::raw(&mut app, &id).await?;
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], code))
}

async fn show_tree(
    State(mut app): State<App>,
    Path(id): Path<String>,
) -> crate::AppResult<impl IntoResponse> {
    let tree = pastes::revision_tree(&mut app, &id).await?;
    Ok(Json(TreeView::new(app.store.codec(), &tree, &id)))
}

async fn get_attachment(
    State(mut app): State<App>,
    Path((id, file_name)): Path<(String, String)>,
) -> crate::AppResult<Response<body::Full<Bytes>>> {
    let (attachment, data) = pastes::fetch_attachment(&mut app, &id, &file_name).await?;
    let response = Response::builder()
        .header(
            header::CONTENT_DISPOSITION,
            format!(
                "inline; filename*=UTF-8''{}",
                encode(&attachment.file_name)
            ),
        )
        .body(body::Full::new(data))?;
    Ok(response)
}

async fn delete_paste(
    State(mut app): State<App>,
    Query(params): Query<HashMap<String, String>>,
    Path(id): Path<String>,
) -> crate::AppResult<impl IntoResponse> {
    let password = params
        .get("password")
        .filter(|p| !p.is_empty())
        .ok_or(ValidationError::MissingPassword)?;

    pastes::remove(&mut app, &id, password).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct ListParams {
    page: Option<u32>,
    #[serde(default)]
    only_mine: bool,
}

async fn list_pastes(
    State(mut app): State<App>,
    Submitter(ctx): Submitter,
    Query(params): Query<ListParams>,
) -> crate::AppResult<impl IntoResponse> {
    let listing =
        pastes::list(&mut app, &ctx, params.page.unwrap_or(1), params.only_mine).await?;
    let codec = app.store.codec();
    Ok(Json(PasteList {
        pastes: listing
            .pastes
            .iter()
            .map(|paste| PasteSummary::new(codec, paste))
            .collect(),
        has_next: listing.pagination.has_next(),
        has_previous: listing.pagination.has_previous(),
        pagination: listing.pagination,
    }))
}

async fn compare_pastes(
    State(mut app): State<App>,
    Path((old, new)): Path<(String, String)>,
) -> crate::AppResult<impl IntoResponse> {
    let (old_side, new_side, diff) =
        pastes::compare(&mut app, &old, &new, DiffMode::Structured).await?;
    let Diff::Structured(diff) = diff else {
        return Err(AppError::NotFound);
    };
    Ok(Json(CompareView {
        old: app.store.identifier(&old_side),
        new: app.store.identifier(&new_side),
        diff,
    }))
}

async fn unidiff_pastes(
    State(mut app): State<App>,
    Path((old, new)): Path<(String, String)>,
) -> crate::AppResult<impl IntoResponse> {
    let (_, _, diff) = pastes::compare(&mut app, &old, &new, DiffMode::Unified).await?;
    let Diff::Unified(text) = diff else {
        return Err(AppError::NotFound);
    };
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], text))
}

/// Reduce an uploaded file name to a safe single path component, or `None`
/// if nothing usable is left.
fn secure_filename(name: &str) -> Option<String> {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    let unsafe_chars = UNSAFE.get_or_init(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("valid regex"));

    // browsers may send a full client-side path
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned = unsafe_chars.replace_all(base, "_");
    let cleaned = cleaned.trim_matches(|c| c == '.' || c == '_');
    (!cleaned.is_empty()).then(|| cleaned.to_owned())
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, HttpBody};
    use axum::http::{Method, Request};
    use tower::ServiceExt;

    use super::*;
    use crate::test_app;

    const BOUNDARY: &str = "revbin-test-boundary";

    fn multipart_body(fields: &[(&str, &str)], files: &[(&str, &str, &str)]) -> String {
        let mut body = String::new();
        for (name, value) in fields {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            ));
        }
        for (name, file_name, content) in files {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; \
                 filename=\"{file_name}\"\r\nContent-Type: text/plain\r\n\r\n{content}\r\n"
            ));
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));
        body
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, String) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let mut body = response.into_body();
        let mut bytes = Vec::new();
        while let Some(chunk) = body.data().await {
            bytes.extend_from_slice(&chunk.unwrap());
        }
        (status, String::from_utf8(bytes).unwrap())
    }

    async fn create(router: &Router, fields: &[(&str, &str)]) -> (StatusCode, String) {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(fields, &[])))
            .unwrap();
        send(router, request).await
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn created_id(body: &str) -> String {
        let value: serde_json::Value = serde_json::from_str(body).unwrap();
        value["id"].as_str().unwrap().to_owned()
    }

    #[tokio::test]
    async fn create_view_and_delete() {
        let (app, _dir) = test_app().await;
        let router = router(app);

        let (status, body) = create(
            &router,
            &[("code", "print(1)"), ("language", "python"), ("password", "abc")],
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created_id(&body);

        let (status, raw) = send(&router, get(&format!("/{id}/raw"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(raw, "print(1)");

        let (status, view) = send(&router, get(&format!("/{id}"))).await;
        assert_eq!(status, StatusCode::OK);
        let view: serde_json::Value = serde_json::from_str(&view).unwrap();
        assert_eq!(view["language"], "python");
        assert!(view["parent"].is_null());
        assert!(view.get("password_hash").is_none());

        let delete = |password: &str| {
            Request::builder()
                .method(Method::DELETE)
                .uri(format!("/{id}?password={password}"))
                .body(Body::empty())
                .unwrap()
        };
        let (status, _) = send(&router, delete("wrongpass")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&router, get(&format!("/{id}/raw"))).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(&router, delete("abc")).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&router, get(&format!("/{id}"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn missing_fields_are_unprocessable() {
        let (app, _dir) = test_app().await;
        let router = router(app);
        let (status, body) = create(&router, &[("code", "x"), ("language", "text")]).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body, "a password is required");

        let (status, _) = create(
            &router,
            &[
                ("code", "buy now"),
                ("language", "text"),
                ("password", "p"),
                ("webpage", "http://spam.example"),
            ],
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn revisions_tree_and_diffs() {
        let (app, _dir) = test_app().await;
        let router = router(app);

        let (_, body) = create(
            &router,
            &[("code", "line1\nline2"), ("language", "text"), ("password", "p")],
        )
        .await;
        let a = created_id(&body);
        let (_, body) = create(
            &router,
            &[
                ("code", "line1\nline2\nline3"),
                ("language", "text"),
                ("password", "p"),
                ("parent", a.as_str()),
            ],
        )
        .await;
        let b = created_id(&body);

        let (status, tree) = send(&router, get(&format!("/{b}/tree"))).await;
        assert_eq!(status, StatusCode::OK);
        let tree: serde_json::Value = serde_json::from_str(&tree).unwrap();
        assert_eq!(tree["root"], a.as_str());
        assert_eq!(tree["current"], b.as_str());
        assert_eq!(tree["nodes"][0]["children"][0], b.as_str());

        let (status, text) = send(&router, get(&format!("/unidiff/{a}/{b}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(text.ends_with("@@ -1,2 +1,3 @@\n line1\n line2\n+line3\n"));

        let (status, json) = send(&router, get(&format!("/compare/{a}/{b}"))).await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(json["diff"]["lines_added"], 1);
        assert_eq!(json["diff"]["hunks"].as_array().unwrap().len(), 1);

        let (status, _) = send(&router, get(&format!("/compare/{a}/not-a-real-id"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, draft) = send(&router, get(&format!("/new?reply_to={b}"))).await;
        assert_eq!(status, StatusCode::OK);
        let draft: serde_json::Value = serde_json::from_str(&draft).unwrap();
        assert_eq!(draft["parent"], b.as_str());
    }

    #[tokio::test]
    async fn attachments_are_uploaded_and_served() {
        let (app, _dir) = test_app().await;
        let router = router(app);

        let request = Request::builder()
            .method(Method::POST)
            .uri("/")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(
                &[("code", "see file"), ("language", "text"), ("password", "p")],
                &[
                    ("file_1", "../../notes.txt", "hello file"),
                    ("file_2", "evil.sh", "rm -rf /"),
                ],
            )))
            .unwrap();
        let (status, body) = send(&router, request).await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created_id(&body);

        let (_, view) = send(&router, get(&format!("/{id}"))).await;
        let view: serde_json::Value = serde_json::from_str(&view).unwrap();
        let attachments = view["attachments"].as_array().unwrap();
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0]["file_name"], "notes.txt");

        let (status, content) =
            send(&router, get(&format!("/{id}/attachments/notes.txt"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content, "hello file");
    }

    #[tokio::test]
    async fn listing_pages() {
        let (app, _dir) = test_app().await;
        let router = router(app);
        create(
            &router,
            &[("code", "one"), ("language", "text"), ("password", "p")],
        )
        .await;

        let (status, list) = send(&router, get("/all")).await;
        assert_eq!(status, StatusCode::OK);
        let list: serde_json::Value = serde_json::from_str(&list).unwrap();
        assert_eq!(list["pastes"].as_array().unwrap().len(), 1);
        assert_eq!(list["pagination"]["total"], 1);

        let (status, _) = send(&router, get("/all?page=2")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&router, get("/not-a-real-id")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn filenames_are_sanitized() {
        assert_eq!(secure_filename("notes.txt").as_deref(), Some("notes.txt"));
        assert_eq!(
            secure_filename("C:\\Users\\me\\my file.png").as_deref(),
            Some("my_file.png")
        );
        assert_eq!(secure_filename("../../etc/passwd").as_deref(), Some("passwd"));
        assert_eq!(secure_filename(".."), None);
        assert_eq!(secure_filename(""), None);
    }
}
