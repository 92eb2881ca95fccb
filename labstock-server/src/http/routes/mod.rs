//! Route handlers organized by resource.

pub mod antibodies;
pub mod auth;
pub mod batches;
pub mod chemicals;
pub mod comments;
pub mod entities;
pub mod files;
pub mod fly_stocks;
pub mod health;
pub mod imports;
pub mod oligonucleotides;
pub mod plasmids;
pub mod requests;

use std::sync::Arc;

use axum::http::header;
use axum::response::Response;
use axum::Router;

use crate::state::AppState;

/// All /api routes.
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .merge(auth::router())
        .merge(antibodies::router())
        .merge(plasmids::router())
        .merge(oligonucleotides::router())
        .merge(chemicals::router())
        .merge(fly_stocks::router())
        .merge(batches::router())
        .merge(entities::router())
        .merge(comments::router())
        .merge(requests::router())
        .merge(files::router())
        .merge(imports::router())
}

/// Build a file-download response with a Content-Disposition header.
pub(crate) fn download_response(bytes: Vec<u8>, filename: &str, content_type: &str) -> Response {
    Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        )
        .body(bytes.into())
        .unwrap_or_default()
}
