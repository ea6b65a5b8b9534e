use axum::{Router, extract::DefaultBodyLimit, middleware, routing::any};
use tower_http::compression::CompressionLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api_doc::ApiDoc;
use crate::handlers::{del_handler, get_handler, ping_handler, set_handler};
use crate::instrument::{Instrumented, Sampler, instrument};
use crate::metrics::Endpoint;
use crate::routes;
use crate::state::AppState;

/// Build the proxy router.
///
/// Every endpoint accepts any method and rejects wrong ones itself, so the
/// instrumentation layer sees and counts those requests too. `set` bodies
/// are not size capped; `MAX_SET_KEYS` is the only bound on a batch.
pub fn router(state: AppState) -> Router {
    let metrics = state.metrics.clone();
    let sampler = Sampler::new(state.config.log_sample_rate);
    let instrumented = move |endpoint: Endpoint| {
        middleware::from_fn_with_state(
            Instrumented::new(endpoint, metrics.clone(), sampler),
            instrument,
        )
    };

    Router::new()
        .route(
            routes::PING,
            any(ping_handler).layer(instrumented(Endpoint::Ping)),
        )
        .route(
            routes::GET,
            any(get_handler).layer(instrumented(Endpoint::Get)),
        )
        .route(
            routes::DEL,
            any(del_handler).layer(instrumented(Endpoint::Del)),
        )
        .route(
            routes::SET,
            any(set_handler)
                .layer::<_, std::convert::Infallible>(instrumented(Endpoint::Set))
                .layer(DefaultBodyLimit::disable()),
        )
        .with_state(state)
        .merge(SwaggerUi::new(routes::SWAGGER_UI).url(routes::OPENAPI_JSON, ApiDoc::openapi()))
        .layer(CompressionLayer::new())
}
