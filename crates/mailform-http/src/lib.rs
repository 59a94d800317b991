//! # mailform-http
//!
//! Serves the mailform preview and test-send routes with axum.
//!
//! ```ignore
//! let mailer = Arc::new(Mailer::builder().template(welcome).build()?);
//! mailer.init();
//! let app = axum::Router::new().merge(mailform_http::router(&mailer)?);
//! ```

use axum::{
    extract::{Path, Query},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use mailform::{
    Mailer, MailerError, RouteHandler, RouteRegistrar, RouteRequest, RouteResponse,
    RoutingMiddleware,
};
use std::{collections::HashMap, sync::Arc};
use tracing::debug;

/// [`RouteRegistrar`] that builds an axum [`Router`]
#[derive(Debug, Default)]
pub struct AxumRegistrar {
    router: Router,
}

impl AxumRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_router(self) -> Router {
        self.router
    }
}

impl RouteRegistrar for AxumRegistrar {
    fn get(&mut self, path: String, handler: Arc<dyn RouteHandler>) {
        debug!("Registering GET {}", path);

        let route = get(
            move |params: Option<Path<HashMap<String, String>>>,
                  Query(query): Query<HashMap<String, String>>| {
                let handler = handler.clone();
                async move {
                    let request = RouteRequest {
                        params: params.map(|Path(params)| params).unwrap_or_default(),
                        query,
                    };
                    into_response(handler.handle(request).await)
                }
            },
        );

        self.router = std::mem::take(&mut self.router).route(&path, route);
    }
}

/// Convert a handler response into an axum response
pub fn into_response(response: RouteResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        [(header::CONTENT_TYPE, response.content_type)],
        response.body,
    )
        .into_response()
}

/// Router with the preview and send routes of every template
///
/// Empty when `add_routes` is off in the mailer configuration.
pub fn router(mailer: &Arc<Mailer>) -> Result<Router, MailerError> {
    if !mailer.config().add_routes {
        debug!("Mailer routes disabled");
        return Ok(Router::new());
    }

    let mut middleware = RoutingMiddleware::new(AxumRegistrar::new());
    mailer.apply_middleware(&mut middleware)?;
    debug!("Registered {} mailer routes", middleware.registered().len());

    Ok(middleware.into_registrar().into_router())
}
