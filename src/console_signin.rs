#[derive(Debug, Clone)]
pub struct ConsoleSignIn {
    federation_endpoint: url::Url,
    destination: url::Url,
    issuer: url::Url,
    session_duration: Option<i32>,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct FederationSession<'a> {
    session_id: &'a str,
    session_key: &'a str,
    session_token: &'a str,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SigninTokenResponse {
    signin_token: secrecy::SecretString,
}

impl ConsoleSignIn {
    pub fn new(config: &crate::config::ConsoleConfig, default_issuer: &url::Url) -> Self {
        Self {
            federation_endpoint: config.federation_endpoint.clone(),
            destination: config.destination.clone(),
            issuer: config.issuer.clone().unwrap_or_else(|| default_issuer.clone()),
            session_duration: None,
        }
    }

    /// `SessionDuration` for the console session; only honored for credentials of
    /// AssumeRoleWithWebIdentity.
    pub fn with_session_duration(mut self, seconds: Option<i32>) -> Self {
        self.session_duration = seconds;
        self
    }

    #[tracing::instrument(skip_all, fields(access_key_id = %credential.access_key_id))]
    pub async fn signin_token(
        &self,
        credential: &crate::client::TemporaryCredential,
    ) -> crate::Result<secrecy::SecretString> {
        use secrecy::ExposeSecret;
        let session = zeroize::Zeroizing::new(serde_json::to_string(&FederationSession {
            session_id: &credential.access_key_id,
            session_key: credential.secret_access_key.expose_secret(),
            session_token: &credential.session_token,
        })?);

        let mut url = self.federation_endpoint.clone();
        {
            let mut q = url.query_pairs_mut();
            q.append_pair("Action", "getSigninToken")
                .append_pair("SessionType", "json");
            if let Some(d) = self.session_duration {
                q.append_pair("SessionDuration", &d.to_string());
            }
            q.append_pair("Session", session.as_str());
        }

        let resp = crate::client::http().get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            tracing::error!(status = %status, message = %message, "federation endpoint returned error");
            return Err(crate::Error::ApiError {
                url: self.federation_endpoint.clone(),
                status_code: status,
                message,
            });
        }
        let body: SigninTokenResponse = resp.json().await?;
        if body.signin_token.expose_secret().is_empty() {
            return Err(crate::Error::UnknownError(
                "federation endpoint returned an empty SigninToken".to_owned(),
            ));
        }
        Ok(body.signin_token)
    }

    pub fn login_url(&self, signin_token: &secrecy::SecretString) -> url::Url {
        use secrecy::ExposeSecret;
        let mut url = self.federation_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("Action", "login")
            .append_pair("Issuer", self.issuer.as_str())
            .append_pair("Destination", self.destination.as_str())
            .append_pair("SigninToken", signin_token.expose_secret());
        url
    }

    pub async fn console_url(
        &self,
        credential: &crate::client::TemporaryCredential,
    ) -> crate::Result<url::Url> {
        let token = self.signin_token(credential).await?;
        Ok(self.login_url(&token))
    }
}
