use axum::{
    Extension, Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use deskkit::{AppInfo, Controller, Injectable, RequestScope, ServiceScope};
use std::sync::Arc;

use super::dto::InfoDto;
use crate::domain::clock::{ClockReading, SystemClock};

/// Routes of the diagnostics plugin.
pub struct DiagnosticsController {
    clock: Arc<SystemClock>,
    info: Arc<AppInfo>,
}

impl Injectable for DiagnosticsController {
    fn inject(scope: &ServiceScope) -> anyhow::Result<Self> {
        Ok(Self {
            clock: scope.resolve::<SystemClock>()?,
            info: scope.resolve::<AppInfo>()?,
        })
    }
}

impl Controller for DiagnosticsController {
    fn routes(self: Arc<Self>) -> Router {
        Router::new()
            .route("/Test/Test", get(test))
            .route("/Diagnostics/Info", get(info))
            .with_state(self)
    }
}

/// Resolution failures inside a handler.
struct HandlerError(anyhow::Error);

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        tracing::error!(error = %format!("{:#}", self.0), "Diagnostics request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, self.0.to_string()).into_response()
    }
}

impl<E: Into<anyhow::Error>> From<E> for HandlerError {
    fn from(e: E) -> Self {
        Self(e.into())
    }
}

async fn test(Extension(scope): Extension<RequestScope>) -> Result<String, HandlerError> {
    let reading = scope.resolve::<ClockReading>()?;
    Ok(format!("test {}", reading.at))
}

async fn info(State(ctrl): State<Arc<DiagnosticsController>>) -> Result<Json<InfoDto>, HandlerError> {
    let reading = ctrl.clock.now()?;
    Ok(Json(InfoDto {
        title: ctrl.info.title.clone(),
        version: ctrl.info.version.clone(),
        product_name: ctrl.info.product_name.clone(),
        started_at: ctrl.clock.started_at().to_rfc3339(),
        uptime_secs: reading.uptime.num_seconds(),
    }))
}
