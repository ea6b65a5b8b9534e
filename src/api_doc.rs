use utoipa::OpenApi;

use crate::handlers;
use crate::models::{KeyValueBody, ServerResult};

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "rawkv-proxy API",
        version = "0.1.0",
        description = "HTTP batch get/set/delete proxy in front of a raw key-value store"
    ),
    paths(
        handlers::ping::ping_handler,
        handlers::get::get_handler,
        handlers::del::del_handler,
        handlers::set::set_handler
    ),
    components(schemas(ServerResult, KeyValueBody)),
    tags(
        (name = "health", description = "Liveness probe"),
        (name = "kv", description = "Batch raw key-value operations")
    )
)]
pub struct ApiDoc;
