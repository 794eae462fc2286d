// HTTP surface: health checks and tenant-scoped context endpoints

use axum::{
    Extension, Router,
    extract::{FromRequestParts, Path, Request, State},
    http::{StatusCode, request::Parts},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::get,
};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::auth::{
    Credentials, ResolutionContext, ResolutionError, TenantResolver, ThemeBindingResolver,
    ThemeScope,
};
use crate::readiness::ReadinessGate;

/// Shared state for every route.
#[derive(Clone)]
pub struct AppState {
    pub gate: ReadinessGate,
    pub resolver: Arc<TenantResolver>,
    pub themes: ThemeBindingResolver,
}

impl AppState {
    pub fn new(resolver: TenantResolver, themes: ThemeBindingResolver) -> Self {
        Self {
            gate: resolver.gate().clone(),
            resolver: Arc::new(resolver),
            themes,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let themed = Router::new()
        .route("/api/themes/{theme_slug}/context", get(theme_context))
        .route_layer(middleware::from_fn_with_state(state.clone(), bind_theme));

    // Layers added later run first: resolution, then theme binding.
    let tenant_scoped = Router::new()
        .route("/api/context", get(current_context))
        .merge(themed)
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            resolve_tenant,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/health/ready", get(readiness))
        .merge(tenant_scoped)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Resolve the tenant for the request and store the context in extensions.
pub async fn resolve_tenant(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ResolutionError> {
    let credentials = Credentials::from_request(req.headers(), req.uri().query());

    let ctx = state
        .resolver
        .resolve(&credentials)
        .await
        .inspect_err(|e| warn!(code = e.code(), path = %req.uri().path(), "request rejected"))?;

    req.extensions_mut().insert(ctx);
    Ok(next.run(req).await)
}

/// Bind an already resolved context to the `theme_slug` path segment.
pub async fn bind_theme(
    State(state): State<AppState>,
    Path(params): Path<HashMap<String, String>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ResolutionError> {
    let Some(theme_slug) = params.get("theme_slug") else {
        return Ok(next.run(req).await);
    };

    let mut ctx = req
        .extensions_mut()
        .remove::<ResolutionContext>()
        .ok_or_else(|| ResolutionError::Internal("theme binding ran before resolution".into()))?;

    let scope = state
        .themes
        .bind(&mut ctx, theme_slug)
        .await
        .inspect_err(|e| warn!(code = e.code(), theme = %theme_slug, "theme binding rejected"))?;

    req.extensions_mut().insert(ctx);
    req.extensions_mut().insert(scope);
    Ok(next.run(req).await)
}

impl<S> FromRequestParts<S> for ResolutionContext
where
    S: Send + Sync,
{
    type Rejection = ResolutionError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<ResolutionContext>()
            .cloned()
            .ok_or_else(|| ResolutionError::Internal("route is not tenant scoped".into()))
    }
}

async fn health_check() -> Result<Json<Value>, StatusCode> {
    Ok(Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}

async fn readiness(State(state): State<AppState>) -> Response {
    let status = state.gate.status();
    let code = if status.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        code,
        Json(json!({
            "status": status.as_str(),
            "timestamp": chrono::Utc::now().to_rfc3339()
        })),
    )
        .into_response()
}

async fn current_context(ctx: ResolutionContext) -> Json<ResolutionContext> {
    Json(ctx)
}

async fn theme_context(
    ctx: ResolutionContext,
    Extension(scope): Extension<ThemeScope>,
) -> Json<Value> {
    Json(json!({
        "tenantId": ctx.tenant_id(),
        "user": ctx.user(),
        "theme": scope,
    }))
}
