use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};

use stockroom_core::{CategoryId, ProductId};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_products))
        .route("/by-category/:category_id", get(products_by_category))
        .route(
            "/:product_id/category/:category_id",
            put(link_category).delete(unlink_category),
        )
        .route("/:product_id/book", post(book_product))
}

pub async fn list_products(Extension(services): Extension<Arc<AppServices>>) -> Response {
    match services.all_products().await {
        Ok(groups) => Json(
            groups
                .into_iter()
                .map(dto::CategoryGroupResponse::from)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => errors::operation_error_to_response(e),
    }
}

pub async fn products_by_category(
    Extension(services): Extension<Arc<AppServices>>,
    Path(category_id): Path<String>,
) -> Response {
    let category_id: CategoryId = match errors::parse_id(&category_id, "category") {
        Ok(v) => v,
        Err(res) => return res,
    };

    match services.products_by_category(category_id).await {
        Ok(products) => Json(
            products
                .into_iter()
                .map(dto::ProductResponse::from)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => errors::operation_error_to_response(e),
    }
}

fn parse_link_path(product_id: &str, category_id: &str) -> Result<(ProductId, CategoryId), Response> {
    Ok((
        errors::parse_id(product_id, "product")?,
        errors::parse_id(category_id, "category")?,
    ))
}

pub async fn link_category(
    Extension(services): Extension<Arc<AppServices>>,
    Path((product_id, category_id)): Path<(String, String)>,
) -> Response {
    let (product_id, category_id) = match parse_link_path(&product_id, &category_id) {
        Ok(v) => v,
        Err(res) => return res,
    };

    match services.link(product_id, category_id).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => errors::operation_error_to_response(e),
    }
}

pub async fn unlink_category(
    Extension(services): Extension<Arc<AppServices>>,
    Path((product_id, category_id)): Path<(String, String)>,
) -> Response {
    let (product_id, category_id) = match parse_link_path(&product_id, &category_id) {
        Ok(v) => v,
        Err(res) => return res,
    };

    match services.unlink(product_id, category_id).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => errors::operation_error_to_response(e),
    }
}

pub async fn book_product(
    Extension(services): Extension<Arc<AppServices>>,
    Path(product_id): Path<String>,
    body: Result<Json<dto::BookRequest>, JsonRejection>,
) -> Response {
    let product_id: ProductId = match errors::parse_id(&product_id, "product") {
        Ok(v) => v,
        Err(res) => return res,
    };
    let Json(body) = match body {
        Ok(v) => v,
        Err(rejection) => return errors::body_rejection_to_response(rejection),
    };

    match services.book(product_id, body.qty).await {
        Ok(_) => StatusCode::OK.into_response(),
        Err(e) => errors::operation_error_to_response(e),
    }
}
