use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};

use stockroom_core::StoreId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new().route("/:store_id/restock", post(restock_store))
}

pub async fn restock_store(
    Extension(services): Extension<Arc<AppServices>>,
    Path(store_id): Path<String>,
    body: Result<Json<dto::RestockRequest>, JsonRejection>,
) -> Response {
    let store_id: StoreId = match errors::parse_id(&store_id, "store") {
        Ok(v) => v,
        Err(res) => return res,
    };
    let quantities = match body {
        Ok(Json(body)) => match body.into_quantities() {
            Ok(q) => q,
            Err(res) => return res,
        },
        Err(rejection) => return errors::body_rejection_to_response(rejection),
    };

    match services.restock(store_id, quantities).await {
        Ok(_) => StatusCode::OK.into_response(),
        Err(e) => errors::operation_error_to_response(e),
    }
}
