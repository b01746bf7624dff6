//! Exact-path router
//!
//! Routes are keyed by path first, then by method, so a request for a known
//! path with the wrong method can be told apart from an unknown path:
//! - Unknown path: `RouteMatch::NotFound` (404)
//! - Known path, unregistered method: `RouteMatch::MethodNotAllowed` (405)

use crate::{Error, Method, Result};
use std::collections::HashMap;

/// Route match result
#[derive(Debug)]
pub enum RouteMatch<'a, T> {
    /// A handler is registered for this method and path
    Found(&'a T),
    /// The path exists but not for this method
    MethodNotAllowed(Vec<Method>),
    /// No route for this path
    NotFound,
}

/// Per-path table of handlers by method
struct MethodRouter<T> {
    handlers: HashMap<Method, T>,
}

impl<T> MethodRouter<T> {
    fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    fn at(&self, method: &Method) -> Option<&T> {
        match method {
            Method::Head => self
                .handlers
                .get(&Method::Head)
                .or_else(|| self.handlers.get(&Method::Get)),
            _ => self.handlers.get(method),
        }
    }

    fn allowed(&self) -> Vec<Method> {
        let mut methods: Vec<Method> = self.handlers.keys().cloned().collect();
        if methods.contains(&Method::Get) && !methods.contains(&Method::Head) {
            methods.push(Method::Head);
        }
        methods.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        methods
    }
}

/// HTTP router
pub struct Router<T> {
    routes: HashMap<String, MethodRouter<T>>,
}

impl<T> Router<T> {
    /// Create a new router
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
        }
    }

    /// Add a route
    pub fn route(&mut self, method: Method, path: &str, value: T) -> Result<()> {
        if !path.starts_with('/') {
            return Err(Error::InvalidPath(path.to_string()));
        }

        let entry = self
            .routes
            .entry(path.to_string())
            .or_insert_with(MethodRouter::new);

        if entry.handlers.contains_key(&method) {
            return Err(Error::DuplicateRoute {
                method: method.to_string(),
                path: path.to_string(),
            });
        }
        entry.handlers.insert(method, value);
        Ok(())
    }

    /// Match a request
    pub fn match_route(&self, method: &Method, path: &str) -> RouteMatch<'_, T> {
        match self.routes.get(path) {
            Some(methods) => match methods.at(method) {
                Some(value) => RouteMatch::Found(value),
                None => RouteMatch::MethodNotAllowed(methods.allowed()),
            },
            None => RouteMatch::NotFound,
        }
    }
}

impl<T> Default for Router<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_routes() {
        let mut router: Router<&str> = Router::new();
        router.route(Method::Post, "/validate-vcl", "validate").unwrap();
        router.route(Method::Get, "/healthz", "health").unwrap();

        assert!(matches!(
            router.match_route(&Method::Post, "/validate-vcl"),
            RouteMatch::Found(&"validate")
        ));
        assert!(matches!(
            router.match_route(&Method::Get, "/healthz"),
            RouteMatch::Found(&"health")
        ));
        assert!(matches!(
            router.match_route(&Method::Post, "/validate-vcl/extra"),
            RouteMatch::NotFound
        ));
    }

    #[test]
    fn test_method_not_allowed() {
        let mut router: Router<&str> = Router::new();
        router.route(Method::Post, "/validate-vcl", "validate").unwrap();

        match router.match_route(&Method::Get, "/validate-vcl") {
            RouteMatch::MethodNotAllowed(allowed) => assert_eq!(allowed, vec![Method::Post]),
            other => panic!("expected 405, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_method_on_known_path() {
        let mut router: Router<&str> = Router::new();
        router.route(Method::Post, "/validate-vcl", "validate").unwrap();

        let propfind = Method::parse("PROPFIND");
        assert!(matches!(
            router.match_route(&propfind, "/validate-vcl"),
            RouteMatch::MethodNotAllowed(_)
        ));
        assert!(matches!(router.match_route(&propfind, "/other"), RouteMatch::NotFound));
    }

    #[test]
    fn test_head_fallback() {
        let mut router: Router<&str> = Router::new();
        router.route(Method::Get, "/healthz", "health").unwrap();

        // HEAD should fallback to GET
        assert!(matches!(
            router.match_route(&Method::Head, "/healthz"),
            RouteMatch::Found(&"health")
        ));
    }

    #[test]
    fn test_rejects_bad_registrations() {
        let mut router: Router<&str> = Router::new();
        assert!(matches!(
            router.route(Method::Post, "validate-vcl", "validate"),
            Err(Error::InvalidPath(_))
        ));

        router.route(Method::Post, "/validate-vcl", "first").unwrap();
        assert!(matches!(
            router.route(Method::Post, "/validate-vcl", "second"),
            Err(Error::DuplicateRoute { .. })
        ));
    }
}
