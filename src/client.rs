/// Short-lived AWS credentials obtained for a federated identity. Never persisted; every request
/// recomputes them from the session cookie.
#[derive(Clone, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemporaryCredential {
    pub access_key_id: String,
    pub secret_access_key: secrecy::SecretString,
    pub session_token: String,
    pub expiration: chrono::DateTime<chrono::Utc>,
}

impl std::fmt::Debug for TemporaryCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemporaryCredential")
            .field("access_key_id", &self.access_key_id)
            .field("expiration", &self.expiration)
            .finish()
    }
}

/// https://docs.aws.amazon.com/sdkref/latest/guide/feature-process-credentials.html
#[derive(Clone, Debug, serde::Serialize, zeroize::ZeroizeOnDrop)]
#[serde(rename_all = "PascalCase")]
pub struct CredentialProcessResponse {
    pub version: i64,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
    #[zeroize(skip)]
    pub expiration: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<&TemporaryCredential> for CredentialProcessResponse {
    fn from(cred: &TemporaryCredential) -> CredentialProcessResponse {
        use secrecy::ExposeSecret;
        CredentialProcessResponse {
            version: 1,
            access_key_id: cred.access_key_id.clone(),
            secret_access_key: cred.secret_access_key.expose_secret().to_owned(),
            session_token: if cred.session_token.is_empty() {
                None
            } else {
                Some(cred.session_token.clone())
            },
            expiration: Some(cred.expiration),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Invalid Argument: {0}")]
    InvalidArgument(String, #[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String, #[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Permission denied: {0}")]
    PermissionDenied(String, #[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String, #[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Not found: {0}")]
    NotFound(String, #[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Unknown: {0} ({1})")]
    Unknown(String, #[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Remote call succeeded but returned a response missing a mandatory field.
    pub(crate) fn incomplete(message: String) -> Error {
        Error::Unknown(
            message,
            Box::new(crate::Error::UnknownError("incomplete response".to_owned())),
        )
    }
}

/// Maps AWS SDK errors into [`Error`] by error code. Codes not listed fall back to
/// [`Error::Unknown`].
macro_rules! map_sdk_error {
    (
        $service:literal, $context:expr, $err:expr,
        $(
            $c:literal => $t:ident,
        )*
    ) => {{
        #[allow(unused_imports)]
        use aws_smithy_types::error::metadata::ProvideErrorMetadata;
        let context: &str = $context;
        match $err {
            $(
                e1 if e1.code() == Some($c) => {
                    let message = format!(
                        "{service} says {code} for {context}: {message:?}",
                        service = $service,
                        code = $c,
                        context = context,
                        message = e1.message(),
                    );
                    $crate::Error::RemoteError($crate::client::Error::$t(message, Box::new(e1)))
                }
            )*
            e => {
                let message = format!(
                    "{service} returned error for {context}: {code:?} {message:?}",
                    service = $service,
                    context = context,
                    code = e.code(),
                    message = e.message(),
                );
                $crate::Error::RemoteError($crate::client::Error::Unknown(message, Box::new(e)))
            }
        }
    }};
}
pub(crate) use map_sdk_error;

pub(crate) fn http() -> reqwest::Client {
    static HTTP: once_cell::sync::OnceCell<reqwest::Client> = once_cell::sync::OnceCell::new();
    HTTP.get_or_init(|| {
        reqwest::ClientBuilder::new()
            .user_agent(format!(
                "{}/{}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            ))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap()
    })
    .clone()
}

pub(crate) async fn sdk_config(region: &str) -> aws_config::SdkConfig {
    aws_config::load_defaults(aws_config::BehaviorVersion::latest())
        .await
        .to_builder()
        .region(Some(aws_config::Region::new(region.to_owned())))
        .build()
}
