//! Error pages served by the framework
//!
//! Applications can override any page by providing an `errors.<status>` view.
//! When no such view exists, or it fails to render, a built-in page is used so
//! an error never turns into a second error.

use crate::error::Error;
use crate::http::Response;
use crate::security::HtmlEscaper;
use crate::views::ViewEngine;
use hyper::StatusCode;
use serde_json::json;
use std::sync::Arc;

/// Built-in page returned when no route matches and no not-found handler is set
pub const NOT_FOUND_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0"/>
  <title>404 - Page Not Found</title>
  <style>
    body {
      margin: 0;
      padding: 0;
      background-color: #3782ab;
      font-family: Arial, sans-serif;
      display: flex;
      justify-content: center;
      align-items: center;
      height: 100vh;
      color: #fff;
      flex-direction: column;
      text-align: center;
    }
    .error-code { font-size: 8rem; font-weight: bold; margin: 0; }
    .error-message { font-size: 2rem; margin-bottom: 20px; }
    .error-description { font-size: 1.2rem; margin-bottom: 30px; max-width: 500px; }
    a {
      padding: 10px 20px;
      background-color: #fff;
      color: #3782ab;
      border-radius: 4px;
      font-weight: bold;
      text-decoration: none;
    }
  </style>
</head>
<body>
  <h1 class="error-code">404</h1>
  <div class="error-message">Oops! Page Not Found</div>
  <div class="error-description">
    The page you're looking for doesn't exist or has been moved.
    Please check the URL or return to the homepage.
  </div>
  <a href="/">Back to Homepage</a>
</body>
</html>"#;

/// Response carrying the built-in 404 page
pub fn not_found_response() -> Response {
    Response::new(StatusCode::NOT_FOUND)
        .with_header("Content-Type", "text/html; charset=utf-8")
        .with_body(NOT_FOUND_PAGE.as_bytes().to_vec())
}

/// Self-contained fragment rendered in place of a missing top-level view
pub fn missing_view_fragment(path: &str) -> String {
    let message = format!(
        "The view file '{}' was not found. Please ensure that the view exists in the correct directory.",
        path
    );
    format!(
        "<html><body><h1>Error</h1><p>{}</p></body></html>",
        HtmlEscaper::escape(&message)
    )
}

/// Error page renderer used at the request boundary
pub struct ErrorPages {
    views: Arc<ViewEngine>,
    development_mode: bool,
}

impl ErrorPages {
    pub fn new(views: Arc<ViewEngine>, development_mode: bool) -> Self {
        Self {
            views,
            development_mode,
        }
    }

    /// Render the page for `status`, preferring an application `errors.<status>` view
    pub fn render_error_page(&self, status: u16, error: Option<&Error>) -> Response {
        let status_code = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let template = format!("errors.{}", status);

        if self.views.exists(&template) {
            let data = json!({
                "status_code": status,
                "status_text": status_text(status),
                "message": user_message(status),
                "error_details": self.details(error),
            });
            match self.views.render(&template, &data) {
                Ok(html) => {
                    return Response::new(status_code)
                        .with_header("Content-Type", "text/html; charset=utf-8")
                        .with_body(html.into_bytes())
                }
                Err(e) => log::warn!(
                    "Failed to render error template '{}': {}, using fallback",
                    template,
                    e
                ),
            }
        }

        if status == 404 {
            return not_found_response();
        }
        self.fallback(status_code, error)
    }

    fn details(&self, error: Option<&Error>) -> Option<String> {
        if self.development_mode {
            error.map(|e| format!("[{}] {}", e.error_code(), e))
        } else {
            None
        }
    }

    fn fallback(&self, status_code: StatusCode, error: Option<&Error>) -> Response {
        let status = status_code.as_u16();
        let details = self
            .details(error)
            .map(|d| format!("<pre>{}</pre>", HtmlEscaper::escape(&d)))
            .unwrap_or_default();

        let html = format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>{status} - {text}</title>
    <style>
        body {{ font-family: Arial, sans-serif; background: #3782ab; color: #fff; text-align: center; padding-top: 10vh; }}
        pre {{ display: inline-block; text-align: left; background: #1f4d66; padding: 1rem; border-radius: 4px; }}
    </style>
</head>
<body>
    <h1>{status}</h1>
    <h2>{text}</h2>
    <p>{message}</p>
    {details}
</body>
</html>"#,
            status = status,
            text = status_text(status),
            message = user_message(status),
            details = details,
        );

        Response::new(status_code)
            .with_header("Content-Type", "text/html; charset=utf-8")
            .with_body(html.into_bytes())
    }
}

fn status_text(status: u16) -> &'static str {
    match status {
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "Error",
    }
}

fn user_message(status: u16) -> &'static str {
    match status {
        400 => "The request could not be understood by the server.",
        403 => "You don't have permission to access this resource.",
        404 => "The page you're looking for doesn't exist or has been moved.",
        500 => "An internal server error occurred.",
        _ => "An error occurred while processing your request.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_view_fragment_is_escaped() {
        let html = missing_view_fragment("views/<home>.squehub.html");
        assert!(html.starts_with("<html><body><h1>Error</h1><p>"));
        assert!(html.contains("&lt;home&gt;"));
        assert!(html.contains("was not found"));
    }

    #[test]
    fn test_not_found_response() {
        let response = not_found_response();
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        let body = String::from_utf8(response.body).unwrap();
        assert!(body.contains("404 - Page Not Found"));
        assert!(body.contains("#3782ab"));
    }

    #[test]
    fn test_fallback_hides_details_in_production() {
        let temp_dir = TempDir::new().unwrap();
        let views = Arc::new(ViewEngine::new(temp_dir.path()));
        let error = Error::template("secret detail");

        let prod = ErrorPages::new(Arc::clone(&views), false);
        let body = String::from_utf8(prod.render_error_page(500, Some(&error)).body).unwrap();
        assert!(!body.contains("secret detail"));

        let dev = ErrorPages::new(views, true);
        let body = String::from_utf8(dev.render_error_page(500, Some(&error)).body).unwrap();
        assert!(body.contains("secret detail"));
        assert!(body.contains("E_TEMPLATE"));
    }

    #[test]
    fn test_custom_error_view() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir_all(temp_dir.path().join("errors")).unwrap();
        std::fs::write(
            temp_dir.path().join("errors/403.squehub.html"),
            "<h1>Custom {{ $status_code }}</h1>",
        )
        .unwrap();
        let views = Arc::new(ViewEngine::new(temp_dir.path()));
        let pages = ErrorPages::new(views, false);

        let response = pages.render_error_page(403, None);
        assert_eq!(response.status, StatusCode::FORBIDDEN);
        assert_eq!(String::from_utf8(response.body).unwrap(), "<h1>Custom 403</h1>");
    }
}
