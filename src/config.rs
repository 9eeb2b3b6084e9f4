pub const ENV_CONFIG_PATH: &str = "COGNITO_FEDERATION_CONFIG";

const DEFAULT_CONSOLE_DESTINATION: &str = "https://console.aws.amazon.com/";
const DEFAULT_FEDERATION_ENDPOINT: &str = "https://signin.aws.amazon.com/federation";

#[derive(serde::Serialize, serde::Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default = "default_listen")]
    pub listen: std::net::SocketAddr,
    /// Externally visible base URL of this service; redirect URIs are derived from it.
    pub public_url: url::Url,
    pub user_pool: UserPoolConfig,
    pub sign_in: Option<SignInConfig>,
    pub device_flow: Option<DeviceFlowConfig>,
}

fn default_listen() -> std::net::SocketAddr {
    std::net::SocketAddr::from(([127, 0, 0, 1], 3000))
}

impl Config {
    pub async fn read_from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let data = tokio::fs::read(&path).await.map_err(|e| {
            crate::Error::ConfigError(format!(
                "Can't read {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let parsed: Self = serde_json::from_slice(&data).map_err(|e| {
            crate::Error::ConfigError(format!(
                "Can't parse {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Ok(parsed)
    }

    pub fn from_env() -> crate::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok().filter(|v| !v.is_empty()))
    }

    /// Builds configuration from the environment variable names used by the deployed
    /// functions. `lookup` returns `None` for unset variables.
    pub fn from_lookup<F>(lookup: F) -> crate::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name).ok_or_else(|| {
                crate::Error::ConfigError(format!(
                    "missing required environment variable {name}"
                ))
            })
        };
        let parse_url = |name: &str, value: String| {
            url::Url::parse(&value).map_err(|e| {
                crate::Error::ConfigError(format!("{name} is not a valid URL ({value}): {e}"))
            })
        };
        let optional_url = |name: &str| lookup(name).map(|v| parse_url(name, v)).transpose();
        let parse_num = |name: &str| -> crate::Result<Option<u64>> {
            lookup(name)
                .map(|v| {
                    v.parse::<u64>().map_err(|e| {
                        crate::Error::ConfigError(format!("{name} is not a number ({v}): {e}"))
                    })
                })
                .transpose()
        };

        let public_url = match lookup("PUBLIC_URL").or_else(|| lookup("API_URL")) {
            Some(v) => parse_url("PUBLIC_URL", v)?,
            None => {
                return Err(crate::Error::ConfigError(
                    "missing required environment variable PUBLIC_URL (or API_URL)".to_owned(),
                ))
            }
        };
        let listen = match lookup("LISTEN") {
            Some(v) => v.parse().map_err(|e| {
                crate::Error::ConfigError(format!("LISTEN is not a socket address ({v}): {e}"))
            })?,
            None => default_listen(),
        };

        let user_pool = UserPoolConfig {
            region: required("REGION")?,
            user_pool_id: required("USER_POOL_ID")?,
            domain: required("DOMAIN")?,
            hosted_ui_url: optional_url("HOSTED_UI_URL")?,
            client_id: required("CLIENT_ID")?,
            client_secret: lookup("CLIENT_SECRET"),
            token_endpoint: optional_url("TOKEN_ENDPOINT")?,
            jwks_uri: optional_url("JWKS_URI")?,
            issuer: lookup("ISSUER"),
            scope: lookup("SCOPE")
                .map(|s| s.split([' ', '+']).map(|x| x.to_owned()).collect())
                .unwrap_or_else(default_oauth_scope),
        };

        let sign_in = match lookup("ID_POOL_ID") {
            None => None,
            Some(identity_pool_id) => Some(SignInConfig {
                identity_pool_id,
                identity_provider: lookup("IDENTITY_PROVIDER"),
                role_resolution: lookup("ROLE_RESOLUTION")
                    .map(|v| v.parse())
                    .transpose()?
                    .unwrap_or_default(),
                credential_strategy: lookup("CREDENTIAL_STRATEGY")
                    .map(|v| v.parse())
                    .transpose()?
                    .unwrap_or_default(),
                refresh_strategy: lookup("REFRESH_STRATEGY")
                    .map(|v| v.parse())
                    .transpose()?
                    .unwrap_or_default(),
                session_duration: parse_num("SESSION_DURATION")?
                    .map(|v| {
                        i32::try_from(v).map_err(|_| {
                            crate::Error::ConfigError("SESSION_DURATION is too large".to_owned())
                        })
                    })
                    .transpose()?,
                console: ConsoleConfig {
                    issuer: optional_url("CONSOLE_ISSUER")?,
                    destination: optional_url("CONSOLE_DESTINATION")?
                        .unwrap_or_else(default_console_destination),
                    federation_endpoint: optional_url("FEDERATION_ENDPOINT")?
                        .unwrap_or_else(default_federation_endpoint),
                },
            }),
        };

        let table_name = lookup("TABLE_NAME");
        let device_flow = if table_name.is_some() || lookup("DEVICE_FLOW_IN_MEMORY").is_some() {
            Some(DeviceFlowConfig {
                table_name,
                verification_uri: optional_url("VERIFICATION_URI")?,
                redirect_uri: optional_url("REDIRECT_URI")?,
                retry_uri: optional_url("RETRY_URI")?,
                expires_in: parse_num("EXPIRE_IN_SEC")?.unwrap_or_else(default_expires_in),
                interval: parse_num("POLLING_INTERVAL")?.unwrap_or_else(default_interval),
                response_type: lookup("RESPONSE_TYPE")
                    .map(|v| v.parse())
                    .transpose()?
                    .unwrap_or_default(),
                identity_provider: lookup("DEVICE_IDENTITY_PROVIDER"),
                pages_dir: lookup("PAGES_DIR").map(std::path::PathBuf::from),
            })
        } else {
            None
        };

        Ok(Self {
            listen,
            public_url,
            user_pool,
            sign_in,
            device_flow,
        })
    }

    pub fn validate(&self) -> crate::Result<()> {
        if !matches!(self.public_url.scheme(), "http" | "https") {
            return Err(crate::Error::ConfigError(format!(
                "public_url must be http(s): {}",
                self.public_url
            )));
        }
        self.user_pool.validate()?;
        if self.sign_in.is_none() && self.device_flow.is_none() {
            return Err(crate::Error::ConfigError(
                "Either sign_in or device_flow must be configured, but both are absent".to_owned(),
            ));
        }
        if let Some(ref s) = self.sign_in {
            s.validate()?;
        }
        if let Some(ref d) = self.device_flow {
            d.validate()?;
        }
        Ok(())
    }

    /// URL of a path on this service.
    pub fn public_url_for(&self, path: &str) -> crate::Result<url::Url> {
        join_below(&self.public_url, path)
    }
}

/// Resolves `path` below `base`, keeping every segment of `base` whether or not it ends with `/`.
pub fn join_below(base: &url::Url, path: &str) -> crate::Result<url::Url> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let dir = format!("{}/", base.path());
        base.set_path(&dir);
    }
    Ok(base.join(path.trim_start_matches('/'))?)
}

#[derive(serde::Serialize, serde::Deserialize, Clone)]
pub struct UserPoolConfig {
    pub region: String,
    pub user_pool_id: String,
    /// Hosted UI domain prefix (`<domain>.auth.<region>.amazoncognito.com`).
    pub domain: String,
    /// Overrides the hosted UI base URL, e.g. for a custom domain.
    pub hosted_ui_url: Option<url::Url>,
    pub client_id: String,
    #[serde(skip_serializing)]
    pub client_secret: Option<String>,
    pub token_endpoint: Option<url::Url>,
    pub jwks_uri: Option<url::Url>,
    pub issuer: Option<String>,
    #[serde(default = "default_oauth_scope")]
    pub scope: Vec<String>,
}

impl std::fmt::Debug for UserPoolConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserPoolConfig")
            .field("region", &self.region)
            .field("user_pool_id", &self.user_pool_id)
            .field("domain", &self.domain)
            .field("client_id", &self.client_id)
            .finish()
    }
}

fn default_oauth_scope() -> Vec<String> {
    vec!["openid".to_owned()]
}

impl UserPoolConfig {
    pub fn validate(&self) -> crate::Result<()> {
        for (name, value) in [
            ("user_pool.region", &self.region),
            ("user_pool.user_pool_id", &self.user_pool_id),
            ("user_pool.domain", &self.domain),
            ("user_pool.client_id", &self.client_id),
        ] {
            if value.is_empty() {
                return Err(crate::Error::ConfigError(format!("{name} must not be empty")));
            }
        }
        self.hosted_ui_url()?;
        Ok(())
    }

    pub fn hosted_ui_url(&self) -> crate::Result<url::Url> {
        match self.hosted_ui_url {
            Some(ref u) => Ok(u.clone()),
            None => Ok(url::Url::parse(&format!(
                "https://{}.auth.{}.amazoncognito.com/",
                self.domain, self.region
            ))?),
        }
    }

    pub fn token_endpoint(&self) -> crate::Result<url::Url> {
        self.token_endpoint
            .clone()
            .map(Ok)
            .unwrap_or_else(|| join_below(&self.hosted_ui_url()?, "oauth2/token"))
    }

    pub fn authorize_endpoint(&self) -> crate::Result<url::Url> {
        join_below(&self.hosted_ui_url()?, "oauth2/authorize")
    }

    pub fn login_endpoint(&self) -> crate::Result<url::Url> {
        join_below(&self.hosted_ui_url()?, "login")
    }

    /// `iss` claim of tokens issued by the user pool.
    pub fn issuer(&self) -> String {
        self.issuer.clone().unwrap_or_else(|| {
            format!(
                "https://cognito-idp.{}.amazonaws.com/{}",
                self.region, self.user_pool_id
            )
        })
    }

    pub fn jwks_uri(&self) -> crate::Result<url::Url> {
        self.jwks_uri
            .clone()
            .map(Ok)
            .unwrap_or_else(|| Ok(url::Url::parse(&format!("{}/.well-known/jwks.json", self.issuer()))?))
    }

    /// Provider name used as the key of identity pool login maps.
    pub fn identity_provider_name(&self) -> String {
        format!(
            "cognito-idp.{}.amazonaws.com/{}",
            self.region, self.user_pool_id
        )
    }
}

#[derive(serde::Serialize, serde::Deserialize, Debug, Clone)]
pub struct SignInConfig {
    pub identity_pool_id: String,
    /// Login map key; defaults to the user pool provider name.
    pub identity_provider: Option<String>,
    #[serde(default)]
    pub role_resolution: RoleResolution,
    #[serde(default)]
    pub credential_strategy: CredentialStrategy,
    #[serde(default)]
    pub refresh_strategy: RefreshStrategy,
    /// DurationSeconds for sts:AssumeRoleWithWebIdentity.
    pub session_duration: Option<i32>,
    #[serde(default)]
    pub console: ConsoleConfig,
}

impl SignInConfig {
    pub fn validate(&self) -> crate::Result<()> {
        if self.identity_pool_id.split_once(':').is_none() {
            return Err(crate::Error::ConfigError(format!(
                "sign_in.identity_pool_id must look like <region>:<uuid>: {}",
                self.identity_pool_id
            )));
        }
        if let Some(d) = self.session_duration {
            if !(900..=43200).contains(&d) {
                return Err(crate::Error::ConfigError(format!(
                    "sign_in.session_duration must be within 900..=43200: {d}"
                )));
            }
        }
        if matches!(self.credential_strategy, CredentialStrategy::CredentialsForIdentity)
            && matches!(self.role_resolution, RoleResolution::IdentityPoolDefault)
            && self.session_duration.is_some()
        {
            tracing::warn!("sign_in.session_duration has no effect with credentials_for_identity");
        }
        Ok(())
    }

    pub fn identity_provider(&self, user_pool: &UserPoolConfig) -> String {
        self.identity_provider
            .clone()
            .unwrap_or_else(|| user_pool.identity_provider_name())
    }
}

#[derive(serde::Serialize, serde::Deserialize, Debug, Clone)]
pub struct ConsoleConfig {
    /// `Issuer` passed to the console login URL; defaults to this service's public URL.
    pub issuer: Option<url::Url>,
    #[serde(default = "default_console_destination")]
    pub destination: url::Url,
    #[serde(default = "default_federation_endpoint")]
    pub federation_endpoint: url::Url,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            issuer: None,
            destination: default_console_destination(),
            federation_endpoint: default_federation_endpoint(),
        }
    }
}

fn default_console_destination() -> url::Url {
    url::Url::parse(DEFAULT_CONSOLE_DESTINATION).unwrap()
}

fn default_federation_endpoint() -> url::Url {
    url::Url::parse(DEFAULT_FEDERATION_ENDPOINT).unwrap()
}

/// Where the IAM role for the federated identity comes from.
#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoleResolution {
    /// `cognito:preferred_role` claim, falling back to the identity pool default.
    #[default]
    PreferredClaim,
    IdentityPoolDefault,
}

impl std::str::FromStr for RoleResolution {
    type Err = crate::Error;
    fn from_str(s: &str) -> Result<RoleResolution, crate::Error> {
        match s {
            "preferred_claim" => Ok(RoleResolution::PreferredClaim),
            "identity_pool_default" => Ok(RoleResolution::IdentityPoolDefault),
            _ => Err(crate::Error::ConfigError(format!(
                "unknown role_resolution: {s}"
            ))),
        }
    }
}

#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStrategy {
    /// cognito-identity:GetOpenIdToken then sts:AssumeRoleWithWebIdentity.
    #[default]
    WebIdentity,
    /// cognito-identity:GetCredentialsForIdentity.
    CredentialsForIdentity,
}

impl std::str::FromStr for CredentialStrategy {
    type Err = crate::Error;
    fn from_str(s: &str) -> Result<CredentialStrategy, crate::Error> {
        match s {
            "web_identity" => Ok(CredentialStrategy::WebIdentity),
            "credentials_for_identity" => Ok(CredentialStrategy::CredentialsForIdentity),
            _ => Err(crate::Error::ConfigError(format!(
                "unknown credential_strategy: {s}"
            ))),
        }
    }
}

#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RefreshStrategy {
    /// cognito-idp:InitiateAuth with REFRESH_TOKEN_AUTH.
    #[default]
    InitiateAuth,
    /// grant_type=refresh_token against the token endpoint.
    TokenEndpoint,
}

impl std::str::FromStr for RefreshStrategy {
    type Err = crate::Error;
    fn from_str(s: &str) -> Result<RefreshStrategy, crate::Error> {
        match s {
            "initiate_auth" => Ok(RefreshStrategy::InitiateAuth),
            "token_endpoint" => Ok(RefreshStrategy::TokenEndpoint),
            _ => Err(crate::Error::ConfigError(format!(
                "unknown refresh_strategy: {s}"
            ))),
        }
    }
}

#[derive(serde::Serialize, serde::Deserialize, Debug, Clone)]
pub struct DeviceFlowConfig {
    /// DynamoDB table (`device_code` partition key, `user_code` sort key, TTL on `expire`).
    /// Codes are kept in process memory when absent.
    pub table_name: Option<String>,
    pub verification_uri: Option<url::Url>,
    pub redirect_uri: Option<url::Url>,
    pub retry_uri: Option<url::Url>,
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,
    #[serde(default = "default_interval")]
    pub interval: u64,
    #[serde(default)]
    pub response_type: ResponseType,
    /// `identity_provider` parameter for the hosted UI authorize endpoint.
    pub identity_provider: Option<String>,
    /// Directory holding `index.html`, `error/index.html`, `complete/index.html` and assets.
    pub pages_dir: Option<std::path::PathBuf>,
}

fn default_expires_in() -> u64 {
    300
}

fn default_interval() -> u64 {
    5
}

impl DeviceFlowConfig {
    pub fn validate(&self) -> crate::Result<()> {
        if self.expires_in == 0 {
            return Err(crate::Error::ConfigError(
                "device_flow.expires_in must be positive".to_owned(),
            ));
        }
        if self.interval == 0 {
            return Err(crate::Error::ConfigError(
                "device_flow.interval must be positive".to_owned(),
            ));
        }
        if let Some(ref t) = self.table_name {
            if t.is_empty() {
                return Err(crate::Error::ConfigError(
                    "device_flow.table_name must not be empty".to_owned(),
                ));
            }
        }
        Ok(())
    }
}

#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    #[default]
    Code,
    Token,
}

impl ResponseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseType::Code => "code",
            ResponseType::Token => "token",
        }
    }
}

impl std::str::FromStr for ResponseType {
    type Err = crate::Error;
    fn from_str(s: &str) -> Result<ResponseType, crate::Error> {
        match s {
            "code" => Ok(ResponseType::Code),
            "token" => Ok(ResponseType::Token),
            _ => Err(crate::Error::ConfigError(format!(
                "unknown response_type: {s}"
            ))),
        }
    }
}
