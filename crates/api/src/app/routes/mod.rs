use axum::Router;

pub mod categories;
pub mod products;
pub mod stores;
pub mod system;

/// Router for every catalog and stock endpoint.
pub fn router() -> Router {
    Router::new()
        .nest("/categories", categories::router())
        .nest("/products", products::router())
        .nest("/store", stores::router())
}
