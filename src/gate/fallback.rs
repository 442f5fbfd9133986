use crate::net::{Request, Response};

const OFFLINE_TEXT: &str = "You are offline. Please check your internet connection.";

/// Synthetic answer for a request that neither cache nor network could serve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
  /// HTML navigation; the offline page is preferred when stored
  Document,
  Stylesheet,
  Script,
  Unavailable,
}

impl Fallback {
  pub fn for_request(request: &Request) -> Self {
    let path = request.url.path();

    if request.accepts_html() {
      Self::Document
    } else if path.ends_with(".css") {
      Self::Stylesheet
    } else if path.ends_with(".js") || path.ends_with(".mjs") {
      Self::Script
    } else {
      Self::Unavailable
    }
  }

  /// The synthetic response. For `Document` this is the plain-text notice
  /// used when no offline page is stored.
  pub fn response(self) -> Response {
    match self {
      Self::Document => Response::text(OFFLINE_TEXT),
      Self::Stylesheet => Response::new(200, "/* Offline - Styles not available */")
        .with_header("Content-Type", "text/css"),
      Self::Script => Response::new(200, "// Offline - JavaScript not available")
        .with_header("Content-Type", "application/javascript"),
      Self::Unavailable => Response::new(503, "Offline - Resource not available")
        .with_header("Content-Type", "text/plain;charset=UTF-8"),
    }
  }
}

/// Answer for an API request when the network failed and nothing is stored
pub fn api_unavailable() -> Response {
  let body = serde_json::json!({
    "error": "offline",
    "message": "Resource not available offline",
  });
  Response::new(503, body.to_string()).with_header("Content-Type", "application/json")
}
