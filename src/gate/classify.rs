use crate::net::Request;

/// Path segment marking data endpoints
const API_SEGMENT: &str = "/api/";

/// How an intercepted request is answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
  /// Not intercepted; the request goes out untouched
  Bypass,
  NetworkFirst,
  CacheFirst,
}

/// Classify a request. First match wins:
/// non-GET or extension scheme, then API path, then everything else.
pub fn classify(request: &Request, bypass_schemes: &[String]) -> Route {
  let scheme = request.url.scheme();
  if !request.is_get() || bypass_schemes.iter().any(|s| s.eq_ignore_ascii_case(scheme)) {
    return Route::Bypass;
  }

  if request.url.path().contains(API_SEGMENT) {
    return Route::NetworkFirst;
  }

  Route::CacheFirst
}
