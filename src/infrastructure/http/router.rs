use std::future::Future;
use std::net::SocketAddr;
use std::time::Instant;

use axum::extract::{self, ConnectInfo, Request};
use axum::http::{HeaderValue, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::{Router, routing};
use tokio::net::TcpListener;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::application::services::run_guarded;
use crate::application::use_cases::AvatarGateway;
use crate::domain::entities::{AvatarResponse, ResponseHandle, UserIdentifier};

/// Builds the service router around `gateway`.
pub fn avatar_router(gateway: AvatarGateway) -> Router {
    Router::new()
        .route("/health", routing::get(handle_health_get))
        .route("/avatar/*identifier", routing::get(handle_avatar_get))
        .layer(middleware::from_fn(log_request))
        .with_state(gateway)
}

/// Serves `router` on `listener` until `shutdown` resolves.
///
/// # Errors
///
/// Returns the I/O error that stopped the server.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}

async fn handle_health_get() -> &'static str {
    "ok"
}

async fn handle_avatar_get(
    extract::Path(identifier): extract::Path<String>,
    extract::State(gateway): extract::State<AvatarGateway>,
) -> Response {
    let identifier = match UserIdentifier::parse(identifier) {
        Ok(identifier) => identifier,
        Err(e) => {
            debug!(error = %e, "Rejected avatar identifier");
            return respond(AvatarResponse::text(400, format!("Error: {e}.")));
        }
    };

    let (handle, rx) = ResponseHandle::channel();

    // Completes even if the client hangs up.
    tokio::spawn(run_guarded("avatar fetch", async move {
        gateway.fetch(identifier, handle).await;
    }));

    match rx.await {
        Ok(response) => respond(response),
        Err(_) => {
            warn!("Avatar request dropped without a response");
            respond(AvatarResponse::text(500, "Error: request dropped."))
        }
    }
}

fn respond(response: AvatarResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static(response.content_type),
        )],
        response.body,
    )
        .into_response()
}

async fn log_request(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.to_string());
    let user_agent = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let span = info_span!(
        "http_request",
        http.method = %method,
        http.target = %path,
    );
    let response = next.run(request).instrument(span).await;

    info!(
        method = %method,
        path = %path,
        remote = remote.as_deref().unwrap_or("-"),
        user_agent = user_agent.as_deref().unwrap_or("-"),
        status = response.status().as_u16(),
        duration_ms = start.elapsed().as_millis(),
        "Request completed"
    );

    response
}
