//! Declarative request router.
//!
//! Routes are matched in registration order and the first one whose method,
//! header constraints, path template and mandatory query keys all hold wins.
//! A miss is not an error: [`Router::dispatch`] hands the request back so
//! the caller decides how to answer it.
//!
//! ```
//! use waybill::{Request, Response, Uri};
//! use waybill::router::Router;
//!
//! # futures::executor::block_on(async {
//! let router = Router::new()
//!     .get("/files/{id}", |_req, matched| async move {
//!         Response::text(format!("file {}", matched.param("id").unwrap_or_default()))
//!     })
//!     .unwrap();
//!
//! let request = Request::new(http::Method::GET, Uri::parse("/files/42").unwrap());
//! let response = router.dispatch(request).await.unwrap();
//! assert_eq!(response.body.text().await, "file 42");
//! # });
//! ```

mod matched;
pub mod template;

pub use matched::RouteMatch;
pub use template::{QueryKey, RouteTemplate, Segment};

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use tracing::debug;
use waybill_core::{Error, Uri, query};

use crate::message::{Request, Response};

/// An async request handler.
///
/// Implemented for every `Fn(Request, RouteMatch) -> impl Future<Output = Response>`.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, request: Request, matched: RouteMatch) -> BoxFuture<'static, Response>;
}

impl<F, Fut> Handler for F
where
    F: Fn(Request, RouteMatch) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    fn call(&self, request: Request, matched: RouteMatch) -> BoxFuture<'static, Response> {
        Box::pin(self(request, matched))
    }
}

/// A header a request must carry for a route to match.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderConstraint {
    pub name: HeaderName,
    /// Required value, or `None` when presence is enough.
    pub value: Option<HeaderValue>,
}

impl HeaderConstraint {
    fn holds(&self, headers: &HeaderMap) -> bool {
        match &self.value {
            Some(expected) => headers.get_all(&self.name).iter().any(|v| v == expected),
            None => headers.contains_key(&self.name),
        }
    }
}

/// A route definition: method, template, header constraints and handler.
#[derive(Clone)]
pub struct Route {
    method: Option<Method>,
    template: RouteTemplate,
    headers: Vec<HeaderConstraint>,
    handler: Arc<dyn Handler>,
}

impl Route {
    /// Create a route. `None` accepts any method.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTemplate`] if the template does not compile.
    pub fn new<H: Handler>(method: Option<Method>, template: &str, handler: H) -> Result<Self, Error> {
        Ok(Self {
            method,
            template: RouteTemplate::parse(template)?,
            headers: Vec::new(),
            handler: Arc::new(handler),
        })
    }

    /// Require a header with exactly this value.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.push(HeaderConstraint {
            name,
            value: Some(value),
        });
        self
    }

    /// Require a header to be present with any value.
    pub fn with_header_present(mut self, name: HeaderName) -> Self {
        self.headers.push(HeaderConstraint { name, value: None });
        self
    }

    /// Accepted method, `None` for any.
    pub fn method(&self) -> Option<&Method> {
        self.method.as_ref()
    }

    pub fn template(&self) -> &RouteTemplate {
        &self.template
    }

    pub fn header_constraints(&self) -> &[HeaderConstraint] {
        &self.headers
    }

    fn accepts(&self, method: &Method, headers: &HeaderMap) -> bool {
        self.method.as_ref().is_none_or(|m| m == method)
            && self.headers.iter().all(|constraint| constraint.holds(headers))
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("template", &self.template.source())
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

macro_rules! method_routes {
    ($($(#[$doc:meta])* $name:ident => $method:expr;)*) => {
        $(
            $(#[$doc])*
            ///
            /// # Errors
            ///
            /// Returns [`Error::InvalidTemplate`] if the template does not compile.
            pub fn $name<F, Fut>(self, template: &str, handler: F) -> Result<Self, Error>
            where
                F: Fn(Request, RouteMatch) -> Fut + Send + Sync + 'static,
                Fut: Future<Output = Response> + Send + 'static,
            {
                Ok(self.route(Route::new($method, template, handler)?))
            }
        )*
    };
}

/// An ordered, immutable-after-construction list of routes.
#[derive(Clone, Debug, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a route. Earlier routes take precedence.
    pub fn route(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    method_routes! {
        /// Register a `GET` route.
        get => Some(Method::GET);
        /// Register a `POST` route.
        post => Some(Method::POST);
        /// Register a `PUT` route.
        put => Some(Method::PUT);
        /// Register a `PATCH` route.
        patch => Some(Method::PATCH);
        /// Register a `DELETE` route.
        delete => Some(Method::DELETE);
        /// Register a route accepting any method.
        any => None;
    }

    /// Registered routes in precedence order.
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Find the first route matching the request line and headers.
    pub fn find(
        &self,
        method: &Method,
        uri: &Uri,
        headers: &HeaderMap,
    ) -> Option<(&Route, RouteMatch)> {
        let path = uri.path_or_root();
        let query = uri.query_str().map(query::parse).unwrap_or_default();

        for route in &self.routes {
            if !route.accepts(method, headers) {
                continue;
            }
            let Some(captures) = route.template.captures(path) else {
                continue;
            };
            if !route.template.query_satisfied(&query) {
                continue;
            }

            debug!(
                method = %method,
                path = %path,
                route_pattern = %route.template,
                path_params = ?captures.path,
                "Route matched"
            );
            return Some((
                route,
                RouteMatch {
                    path: captures.path,
                    query,
                    wildcards: captures.wildcards,
                    fragment: uri.fragment_str().map(str::to_string),
                },
            ));
        }

        debug!(method = %method, path = %path, "No route matched");
        None
    }

    /// Match a request without consuming it.
    pub fn match_request(&self, request: &Request) -> Option<RouteMatch> {
        self.find(&request.method, &request.uri, &request.headers)
            .map(|(_, matched)| matched)
    }

    /// Run the handler of the first matching route.
    ///
    /// The request body is normalized into a stream before the handler sees
    /// it. When nothing matches the request is returned untouched.
    pub async fn dispatch(&self, mut request: Request) -> Result<Response, Request> {
        let Some((route, matched)) = self.find(&request.method, &request.uri, &request.headers)
        else {
            return Err(request);
        };

        request.body = std::mem::take(&mut request.body).wrap();
        Ok(route.handler.call(request, matched).await)
    }
}
