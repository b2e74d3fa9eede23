use std::sync::Arc;

use axum::{
    Json, Router,
    extract::Extension,
    response::{IntoResponse, Response},
    routing::get,
};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new().route("/", get(list_categories))
}

pub async fn list_categories(Extension(services): Extension<Arc<AppServices>>) -> Response {
    match services.categories().await {
        Ok(categories) => Json(
            categories
                .into_iter()
                .map(dto::CategoryResponse::from)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => errors::operation_error_to_response(e),
    }
}
