use thiserror::Error;

pub mod pages;

pub type Result<T> = std::result::Result<T, Error>;

pub use pages::ErrorPages;

/// Main error type for the Squehub framework
#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Template error: {0}")]
    Template(String),

    #[error("View not found: {0}")]
    ViewNotFound(String),

    #[error("Route not found: {0}")]
    RouteNotFound(String),

    #[error("Middleware error: {0}")]
    Middleware(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{message}")]
    WithContext {
        message: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn template(msg: impl Into<String>) -> Self {
        Error::Template(msg.into())
    }

    pub fn view_not_found(name: impl Into<String>) -> Self {
        Error::ViewNotFound(name.into())
    }

    pub fn middleware(msg: impl Into<String>) -> Self {
        Error::Middleware(msg.into())
    }

    pub fn session(msg: impl Into<String>) -> Self {
        Error::Session(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    /// Wrap this error with an additional message while keeping the source chain
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Error::WithContext {
            message: context.into(),
            source: Box::new(self),
        }
    }

    /// Stable machine readable code, used in logs and development error pages
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Http(_) => "E_HTTP",
            Error::Json(_) => "E_JSON",
            Error::Template(_) => "E_TEMPLATE",
            Error::ViewNotFound(_) => "E_VIEW_NOT_FOUND",
            Error::RouteNotFound(_) => "E_ROUTE_NOT_FOUND",
            Error::Middleware(_) => "E_MIDDLEWARE",
            Error::Session(_) => "E_SESSION",
            Error::Validation(_) => "E_VALIDATION",
            Error::InvalidInput(_) => "E_INVALID_INPUT",
            Error::Forbidden(_) => "E_FORBIDDEN",
            Error::Config(_) => "E_CONFIG",
            Error::Io(_) => "E_IO",
            Error::Internal(_) => "E_INTERNAL",
            Error::WithContext { source, .. } => source.error_code(),
        }
    }

    /// HTTP status code used when the error reaches the response boundary
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Validation(_) | Error::InvalidInput(_) => 400,
            Error::Forbidden(_) => 403,
            Error::RouteNotFound(_) => 404,
            Error::WithContext { source, .. } => source.status_code(),
            _ => 500,
        }
    }
}
