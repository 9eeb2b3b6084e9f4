#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("UserError: {0}")]
    UserError(String),

    #[error("ConfigError: {0}")]
    ConfigError(String),

    #[error("AuthError: {0}")]
    AuthError(String),

    /// Structured OAuth 2.0 error, either returned by an upstream authorization server or
    /// raised by the device flow endpoints.
    #[error("OAuthError: {error}; {description:?}")]
    OAuthError {
        error: String,
        description: Option<String>,
    },

    /// Device flow token is not attached yet; clients should keep polling.
    #[error("authorization_pending")]
    AuthNotReadyError { slow_down: bool },

    #[error(transparent)]
    RemoteError(#[from] crate::client::Error),

    #[error("StoreError: {0}")]
    StoreError(String),

    #[error("UnknownError: {0}")]
    UnknownError(String),

    #[error(transparent)]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    UrlParseError(#[from] url::ParseError),

    #[error(transparent)]
    OAuth2RequestTokenError(
        #[from]
        oauth2::RequestTokenError<
            oauth2::HttpClientError<reqwest::Error>,
            oauth2::StandardErrorResponse<oauth2::basic::BasicErrorResponseType>,
        >,
    ),

    #[error(transparent)]
    JwtError(#[from] jsonwebtoken::errors::Error),

    #[error(transparent)]
    ReqwestError(#[from] reqwest::Error),

    #[error("ApiError({url}): {message}; {status_code:}")]
    ApiError {
        url: url::Url,
        status_code: reqwest::StatusCode,
        message: String,
    },

    /// Failure, but we don't want to emit error to stderr/out anymore. Used in cmd
    #[error("")]
    FailureButSilentlyExit,
}

impl Error {
    /// Whether the identity provider rejected the presented grant or identity token, as opposed
    /// to an unexpected upstream failure. Sign-in handlers send the user back to the login page
    /// for the former and answer 500 for the latter.
    pub fn is_grant_rejection(&self) -> bool {
        match self {
            Error::AuthError(_) | Error::OAuthError { .. } | Error::JwtError(_) => true,
            Error::OAuth2RequestTokenError(oauth2::RequestTokenError::ServerResponse(_)) => true,
            Error::RemoteError(crate::client::Error::Unauthenticated(..)) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
