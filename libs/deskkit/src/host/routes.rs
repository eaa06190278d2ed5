//! Router assembly for a hosted endpoint.

use axum::{
    Router,
    extract::{Request, State},
    middleware::{self, Next},
    response::Response,
    routing::get,
};
use std::{ops::Deref, sync::Arc};
use tower_http::trace::TraceLayer;

use crate::{
    container::{ContainerError, ServiceContainer, ServiceScope},
    registry::ControllerExport,
};

/// A class contributing routes to every hosted endpoint.
///
/// Controllers are resolved from the endpoint's own container when the endpoint is built.
pub trait Controller: Send + Sync + 'static {
    fn routes(self: Arc<Self>) -> Router;
}

/// Per-request unit of work, available to handlers as `Extension<RequestScope>`.
#[derive(Clone)]
pub struct RequestScope(Arc<ServiceScope>);

impl Deref for RequestScope {
    type Target = ServiceScope;

    fn deref(&self) -> &ServiceScope {
        &self.0
    }
}

async fn attach_scope(
    State(container): State<Arc<ServiceContainer>>,
    mut req: Request,
    next: Next,
) -> Response {
    req.extensions_mut()
        .insert(RequestScope(Arc::new(container.create_scope())));
    next.run(req).await
}

async fn builtin_test() -> String {
    format!("test {}", chrono::Local::now())
}

/// Built-in `/test` route plus every controller's routes.
///
/// # Errors
/// Returns [`ContainerError`] if a controller cannot be resolved.
pub(crate) fn build_router(
    container: &Arc<ServiceContainer>,
    controllers: &[ControllerExport],
) -> Result<Router, ContainerError> {
    let mut router = Router::new().route("/test", get(builtin_test));
    for export in controllers {
        let controller = export.resolve(container)?;
        router = router.merge(controller.routes());
        tracing::debug!(
            module = export.module,
            controller = %export.type_key,
            "Controller mounted"
        );
    }
    Ok(router
        .layer(middleware::from_fn_with_state(
            Arc::clone(container),
            attach_scope,
        ))
        .layer(TraceLayer::new_for_http()))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::{
        container::{ContainerBuilder, TypeKey},
        lifetime::Lifetime,
        registry::{ExportModule, ExportRegistry, ExportSet, Injectable},
    };
    use axum::{Extension, body::Body, http::StatusCode};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    static VISITS: AtomicUsize = AtomicUsize::new(0);

    struct Visit(usize);
    impl Injectable for Visit {
        fn inject(_: &ServiceScope) -> anyhow::Result<Self> {
            Ok(Visit(VISITS.fetch_add(1, Ordering::SeqCst)))
        }
    }

    struct VisitController;
    impl Injectable for VisitController {
        fn inject(_: &ServiceScope) -> anyhow::Result<Self> {
            Ok(VisitController)
        }
    }

    impl Controller for VisitController {
        fn routes(self: Arc<Self>) -> Router {
            Router::new().route(
                "/Visit/Same",
                get(|Extension(scope): Extension<RequestScope>| async move {
                    let a = scope.resolve::<Visit>().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
                    let b = scope.resolve::<Visit>().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
                    Ok::<_, StatusCode>(format!("{}", Arc::ptr_eq(&a, &b)))
                }),
            )
        }
    }

    fn exports(set: &mut ExportSet) {
        set.class::<Visit>(Lifetime::Scoped);
        set.controller::<VisitController>();
    }

    static VISITS_MODULE: ExportModule = ExportModule::builtin("visits", exports);

    fn router() -> Router {
        let catalog = ExportRegistry::scan([&VISITS_MODULE]);
        let mut builder = ContainerBuilder::new();
        ExportRegistry::register(&mut builder, &catalog).unwrap();
        let container = builder.build().unwrap();
        assert!(container.contains(TypeKey::of::<VisitController>()));
        build_router(&container, &catalog.controllers).unwrap()
    }

    async fn body(router: Router, uri: &str) -> (StatusCode, String) {
        let response = router
            .oneshot(axum::http::Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn builtin_test_route_answers() {
        let (status, text) = body(router(), "/test").await;
        assert_eq!(status, StatusCode::OK);
        assert!(text.starts_with("test "), "unexpected body: {text}");
    }

    #[tokio::test]
    async fn scoped_services_are_per_request() {
        let router = router();
        let (status, text) = body(router.clone(), "/Visit/Same").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(text, "true");

        let before = VISITS.load(Ordering::SeqCst);
        body(router, "/Visit/Same").await;
        assert_eq!(VISITS.load(Ordering::SeqCst), before + 1);
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let (status, _) = body(router(), "/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
