pub const DEVICE_CODE_AUTH_INTERVAL_MIN: u64 = 5;
const SLOW_DOWN_STEP: std::time::Duration = std::time::Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct DeviceCodeClient {
    device_authorization_endpoint: url::Url,
    token_endpoint: url::Url,
    client_id: String,
}

#[derive(serde::Deserialize)]
struct DeviceAuthorizationResponse {
    device_code: secrecy::SecretString,
    user_code: String,
    verification_uri: url::Url,
    verification_uri_complete: Option<url::Url>,
    expires_in: u64,
    interval: Option<u64>,
}

#[derive(Debug)]
pub struct DeviceCodeFlow {
    client: DeviceCodeClient,
    device_code: secrecy::SecretString,
    pub user_code: String,
    pub verification_uri: url::Url,
    pub verification_uri_complete: Option<url::Url>,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    pub interval: std::time::Duration,
}

async fn error_from_response(resp: reqwest::Response) -> crate::Error {
    let status = resp.status();
    let body = match resp.bytes().await {
        Ok(b) => b,
        Err(e) => return e.into(),
    };
    if body.is_empty() {
        return crate::Error::AuthError(format!("server returned empty error; {status}"));
    }
    let er: oauth2::DeviceCodeErrorResponse = match serde_json::from_slice(&body) {
        Ok(er) => er,
        Err(e) => return e.into(),
    };
    tracing::debug!(response = ?er, "DeviceCodeErrorResponse");
    match er.error() {
        oauth2::DeviceCodeErrorResponseType::AuthorizationPending => {
            crate::Error::AuthNotReadyError { slow_down: false }
        }
        oauth2::DeviceCodeErrorResponseType::SlowDown => {
            crate::Error::AuthNotReadyError { slow_down: true }
        }
        other => crate::Error::OAuthError {
            error: other.to_string(),
            description: er.error_description().cloned(),
        },
    }
}

impl DeviceCodeClient {
    pub fn new(server_url: &url::Url, client_id: impl Into<String>) -> crate::Result<Self> {
        Ok(Self {
            device_authorization_endpoint: crate::config::join_below(server_url, "oauth/device/code")?,
            token_endpoint: crate::config::join_below(server_url, "oauth/token")?,
            client_id: client_id.into(),
        })
    }

    pub async fn initiate(&self, scope: &[String]) -> crate::Result<DeviceCodeFlow> {
        tracing::info!(endpoint = %self.device_authorization_endpoint, "Initiating OAuth 2.0 Device Code flow");
        let scopes = scope.join(" ");
        let mut form = vec![("client_id", self.client_id.as_str())];
        if !scopes.is_empty() {
            form.push(("scope", scopes.as_str()));
        }
        let resp = crate::client::http()
            .post(self.device_authorization_endpoint.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&form)
            .send()
            .await?;
        if resp.status() != reqwest::StatusCode::OK {
            return Err(error_from_response(resp).await);
        }
        let body: DeviceAuthorizationResponse = resp.json().await?;

        Ok(DeviceCodeFlow {
            client: self.clone(),
            device_code: body.device_code,
            user_code: body.user_code,
            verification_uri: body.verification_uri,
            verification_uri_complete: body.verification_uri_complete,
            expires_at: chrono::Utc::now() + chrono::TimeDelta::seconds(body.expires_in as i64),
            interval: std::time::Duration::from_secs(
                body.interval
                    .unwrap_or(DEVICE_CODE_AUTH_INTERVAL_MIN)
                    .max(DEVICE_CODE_AUTH_INTERVAL_MIN),
            ),
        })
    }
}

impl DeviceCodeFlow {
    /// Polls the token endpoint once.
    pub async fn complete(&self) -> crate::Result<crate::token::IdentityTokenSet> {
        use secrecy::ExposeSecret;
        let resp = crate::client::http()
            .post(self.client.token_endpoint.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[
                ("grant_type", crate::device_flow::DEVICE_CODE_GRANT_TYPE),
                ("device_code", self.device_code.expose_secret()),
                ("client_id", &self.client.client_id),
            ])
            .send()
            .await?;
        if resp.status() != reqwest::StatusCode::OK {
            return Err(error_from_response(resp).await);
        }
        let body: crate::ext_oauth2::SecrecyTokenResponse = resp.json().await?;
        crate::token::IdentityTokenSet::from_token_response(body)
    }

    /// Polls until the user completes activation or the device code expires.
    pub async fn wait(&self) -> crate::Result<crate::token::IdentityTokenSet> {
        let mut interval = self.interval;
        loop {
            if chrono::Utc::now() >= self.expires_at {
                return Err(crate::Error::AuthError(
                    "authorization timed out (device code expired)".to_owned(),
                ));
            }
            tokio::time::sleep(interval).await;
            match self.complete().await {
                Ok(t) => return Ok(t),
                Err(crate::Error::AuthNotReadyError { slow_down }) => {
                    if slow_down {
                        interval += SLOW_DOWN_STEP;
                        tracing::debug!(interval = ?interval, "Slowing down");
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}
