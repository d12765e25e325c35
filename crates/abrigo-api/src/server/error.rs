#[derive(Debug)]
pub enum ServerError {
    Io(std::io::Error),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "server io error: {err}"),
        }
    }
}

impl std::error::Error for ServerError {}

impl From<std::io::Error> for ServerError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

#[derive(Debug)]
struct HttpApiError {
    status: StatusCode,
    error: ApiError,
}

impl HttpApiError {
    fn invalid_query(message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: ApiError::new(ErrorCode::InvalidInput, message, details),
        }
    }

    fn not_found(message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            error: ApiError::new(ErrorCode::NotFound, message, details),
        }
    }

    fn from_persistence(err: &PersistenceError) -> Self {
        let status = if err.is_busy() {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self {
            status,
            error: ApiError::new(
                ErrorCode::PersistenceFailure,
                "persistence operation failed",
                Some(err.to_string()),
            ),
        }
    }
}

impl From<&contracts::DistributionError> for HttpApiError {
    fn from(err: &contracts::DistributionError) -> Self {
        let status = match err.error_code() {
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            // Insufficient stock is a client-visible request problem, as the
            // original surface reported it.
            ErrorCode::InvalidInput | ErrorCode::InsufficientStock => StatusCode::BAD_REQUEST,
            ErrorCode::Conflict => StatusCode::CONFLICT,
            ErrorCode::PersistenceFailure => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            error: ApiError::from(err),
        }
    }
}

impl From<RequestError> for HttpApiError {
    fn from(err: RequestError) -> Self {
        match err {
            RequestError::Distribution(err) => Self::from(&err),
            RequestError::Persistence(err) => Self::from_persistence(&err),
        }
    }
}

impl IntoResponse for HttpApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.error)).into_response()
    }
}
