use std::net::SocketAddr;

use axum::{
    middleware,
    routing::{get, MethodRouter},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth::middleware::require_auth;
use crate::state::AppState;
use crate::{auth, users};

/// Whether a route sits behind `require_auth`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Protected,
}

/// One entry of the route table.
pub struct Route {
    pub path: &'static str,
    pub access: Access,
    pub handler: MethodRouter<AppState>,
}

impl Route {
    pub fn new(path: &'static str, access: Access, handler: MethodRouter<AppState>) -> Self {
        Self {
            path,
            access,
            handler,
        }
    }
}

pub fn route_table() -> Vec<Route> {
    let mut routes = vec![Route::new("/health", Access::Public, get(|| async { "ok" }))];
    routes.extend(users::routes());
    routes.extend(auth::routes());
    routes
}

pub fn build_app(state: AppState) -> Router {
    let guard = middleware::from_fn_with_state(state.clone(), require_auth);

    route_table()
        .into_iter()
        .fold(Router::new(), |router, route| {
            let handler = match route.access {
                Access::Public => route.handler,
                Access::Protected => route.handler.route_layer(guard.clone()),
            };
            router.route(route.path, handler)
        })
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!(
                        "http_request",
                        %method,
                        uri = %uri,
                        status = tracing::field::Empty
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     _latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, "response");
                        } else {
                            tracing::info!(%status, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router, host: &str, port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
