use http::header::CONTENT_TYPE;
use http::{HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Builds a CORS layer from a comma-separated origin list.
///
/// Returns `None` when no usable origin is configured, in which case the router is served without
/// cross-origin headers.
pub fn cors_layer(origins: &str) -> Option<CorsLayer> {
    let allowed = origins
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin, "ignoring malformed cors origin");
                None
            }
        })
        .collect::<Vec<_>>();

    if allowed.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([CONTENT_TYPE])
            .allow_origin(AllowOrigin::list(allowed)),
    )
}
