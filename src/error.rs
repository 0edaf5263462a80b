use thiserror::Error;

/// Errors raised while loading, preparing or serving dashboard data
///
/// Every fallible operation in the library returns this type. The web layer
/// turns it into an HTTP response so a bad data file never takes the server down.
#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: String, source: csv::Error },

    #[error("spreadsheet error in {path}: {message}")]
    Excel { path: String, message: String },

    #[error("failed to fetch {url}: {message}")]
    Http { url: String, message: String },

    #[error("invalid configuration in {path}: {message}")]
    Config { path: String, message: String },

    #[error("column `{0}` not found in data")]
    MissingColumn(String),

    #[error("row {row}: cannot parse `{value}` in column `{column}` as a date")]
    InvalidDate {
        column: String,
        row: usize,
        value: String,
    },

    #[error("`{0}` is not a filterable column")]
    UnknownColumn(String),

    #[error("no data source configured for team `{0}`")]
    UnknownTeam(String),

    #[error("unsupported data file {0}")]
    UnsupportedFile(String),

    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error("histogram needs at least one bin")]
    Histogram,

    #[error("export failed: {0}")]
    Export(String),
}

pub type Result<T> = std::result::Result<T, DashboardError>;

#[cfg(feature = "web")]
impl axum::response::IntoResponse for DashboardError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let status = match &self {
            DashboardError::UnknownTeam(_) => StatusCode::FORBIDDEN,
            DashboardError::UnknownColumn(_) => StatusCode::BAD_REQUEST,
            DashboardError::Http { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        log::error!("request failed: {}", self);

        (
            status,
            axum::Json(serde_json::json!({
                "status": "error",
                "message": self.to_string(),
            })),
        )
            .into_response()
    }
}

#[cfg(all(test, feature = "web"))]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    #[test]
    fn unknown_team_is_forbidden() {
        let response = DashboardError::UnknownTeam("mcgill".into()).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn data_shape_errors_are_server_errors() {
        let response = DashboardError::MissingColumn("HR_u85".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
