use http::StatusCode;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CanvassError {
    #[error("Malformed filter token: {0}")]
    Decode(String),

    #[error("Unsupported value: {0}")]
    UnsupportedValue(String),

    #[error("Aggregation missing from response: {0}")]
    MissingAggregation(String),

    #[error("Search engine error: {message}")]
    Engine {
        status: Option<u16>,
        message: String,
    },

    #[error("JSON error: {0}")]
    Json(String),
}

pub type Result<T> = std::result::Result<T, CanvassError>;

impl CanvassError {
    pub fn engine(message: impl Into<String>) -> Self {
        CanvassError::Engine {
            status: None,
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            CanvassError::Decode(_) => StatusCode::BAD_REQUEST,
            CanvassError::UnsupportedValue(_) => StatusCode::BAD_REQUEST,
            CanvassError::MissingAggregation(_) => StatusCode::INTERNAL_SERVER_ERROR,
            CanvassError::Engine { .. } => StatusCode::BAD_GATEWAY,
            CanvassError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<serde_json::Error> for CanvassError {
    fn from(e: serde_json::Error) -> Self {
        CanvassError::Json(e.to_string())
    }
}

impl From<reqwest::Error> for CanvassError {
    fn from(e: reqwest::Error) -> Self {
        CanvassError::Engine {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }
}
