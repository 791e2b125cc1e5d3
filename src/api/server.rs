use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{MatchedPath, Request};
use axum::middleware::{Next, from_fn};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use http::StatusCode;
use serde::Serialize;
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::instrument;

use crate::api::handler::*;
use crate::api::middleware::cors_layer;
use crate::db::repositories::ConnectionGateway;
use crate::scoring::{ScoringService, WindowError};
use crate::util::env::{EnvErr, Var};
use crate::var;

pub type JsonResult<T> = core::result::Result<Json<T>, RouteError>;

pub type SharedGateway = Arc<dyn ConnectionGateway>;

pub struct AppState {
    pub scoring: ScoringService<SharedGateway>,
}

impl AppState {
    pub fn new(scoring: ScoringService<SharedGateway>) -> Self {
        Self { scoring }
    }
}

/// Assembles the scoring routes around `state`.
pub fn router(state: AppState, cors: Option<CorsLayer>) -> Router {
    let app = Router::new()
        .route("/health", get(|| async { StatusCode::OK }))
        .route("/ranking", get(ranking))
        .route("/score/{user_type}/{user_id}", get(user_score))
        .route("/connections", post(record_connection))
        .route("/connections/{user_type}/{user_id}", get(user_connections))
        .route(
            "/connections/{user_type}/{user_id}/today",
            get(connected_today),
        )
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
                let method = req.method();
                let uri = req.uri();

                let matched_path = req
                    .extensions()
                    .get::<MatchedPath>()
                    .map(|matched| matched.as_str());

                tracing::debug_span!("api_request", ?method, ?uri, ?matched_path)
            }),
        )
        .layer(from_fn(log_route_errors))
        .with_state(Arc::new(state));

    match cors {
        Some(cors) => app.layer(cors),
        None => app,
    }
}

/// Logs any `RouteError` a handler attached to its response.
#[instrument(skip(request, next), fields(uri = request.uri().to_string()))]
async fn log_route_errors(request: Request, next: Next) -> Response {
    let res = next.run(request).await;
    if let Some(err) = res.extensions().get::<Arc<RouteError>>() {
        tracing::error!(error = ?err, "error occurred inside route handler");
    }

    res
}

/// Binds `SERVER_API_PORT` and serves until interrupted.
#[instrument(skip(state))]
pub async fn serve(state: AppState) -> Result<(), RouteError> {
    let port = var!(Var::ServerApiPort).await?;
    let port = port
        .parse::<u16>()
        .map_err(|_| RouteError::InvalidPort(port.to_owned()))?;

    let app = router(state, cors_layer(var!(Var::CorsAllowOrigins).await?));

    let socket_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
    let listener = tokio::net::TcpListener::bind(socket_addr).await?;

    tracing::info!(
        server_url = &format!("http://127.0.0.1:{port}"),
        "server ready"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await?;

    Ok(())
}

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("unknown user type '{0}'")]
    InvalidUserType(String),

    #[error("missing user id")]
    MissingUserId,

    #[error(transparent)]
    InvalidWindow(#[from] WindowError),

    #[error(transparent)]
    InvalidQuery(#[from] QueryRejection),

    #[error(transparent)]
    InvalidBody(#[from] JsonRejection),

    #[error("invalid server port '{0}'")]
    InvalidPort(String),

    #[error(transparent)]
    EnvError(#[from] EnvErr),

    #[error(transparent)]
    IoError(#[from] std::io::Error),
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            message: String,
        }

        let (status, message, err) = match &self {
            RouteError::InvalidUserType(_) | RouteError::MissingUserId => {
                // caller mistake, nothing for the server to report
                (StatusCode::BAD_REQUEST, self.to_string(), None)
            }

            RouteError::InvalidWindow(err) => (StatusCode::BAD_REQUEST, err.to_string(), None),

            RouteError::InvalidQuery(rejection) => {
                (StatusCode::BAD_REQUEST, rejection.body_text(), None)
            }

            RouteError::InvalidBody(rejection) => (rejection.status(), rejection.body_text(), None),

            RouteError::InvalidPort(_) | RouteError::EnvError(_) | RouteError::IoError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                self.to_string(),
                Some(self),
            ),
        };

        let mut response = (status, Json(ErrorResponse { message })).into_response();
        if let Some(err) = err {
            response.extensions_mut().insert(Arc::new(err));
        }

        response
    }
}
