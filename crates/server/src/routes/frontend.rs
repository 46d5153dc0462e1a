//! Serves the bundled SPA. Unknown paths get `index.html` so client-side
//! routing works on reload.

use axum::{
    body::Body,
    http::{HeaderValue, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use rust_embed::RustEmbed;

use crate::error::ApiError;

#[derive(RustEmbed)]
#[folder = "../../frontend/dist"]
pub struct Assets;

const INDEX: &str = "index.html";

/// Serve an embedded asset, or the SPA shell for client routes
pub async fn serve_frontend(uri: Uri) -> Response {
    let path = uri.path().trim_start_matches('/');
    if path.is_empty() {
        return serve_file(INDEX);
    }
    if Assets::get(path).is_some() {
        return serve_file(path);
    }
    if path == "api" || path.starts_with("api/") {
        return ApiError::NotFound(format!("no route for /{path}")).into_response();
    }
    // Missing files that look like assets are real 404s.
    if path.rsplit('/').next().is_some_and(|f| f.contains('.')) {
        return StatusCode::NOT_FOUND.into_response();
    }
    serve_file(INDEX)
}

fn serve_file(path: &str) -> Response {
    let Some(file) = Assets::get(path) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    let content_type = HeaderValue::from_str(mime.as_ref())
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));

    let mut response = Response::new(Body::from(file.data.into_owned()));
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, content_type);
    response
}
