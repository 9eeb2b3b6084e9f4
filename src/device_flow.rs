//! OAuth 2.0 Device Authorization Grant ([RFC 8628][]) on top of the user pool hosted UI.
//!
//! A device asks for codes, the user opens the verification URI and signs in through the hosted
//! UI, and the completion callback parks the user pool tokens on the row until the device polls
//! them out exactly once.
//!
//! [RFC 8628]: https://datatracker.ietf.org/doc/html/rfc8628

pub const DEVICE_CODE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";

const USER_CODE_ATTEMPTS: usize = 5;

#[derive(Debug, serde::Serialize)]
pub struct DeviceAuthorizationResponse {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: url::Url,
    pub verification_uri_complete: url::Url,
    pub expires_in: u64,
    pub interval: u64,
}

#[derive(Debug, serde::Serialize, zeroize::ZeroizeOnDrop)]
pub struct DeviceTokenResponse {
    pub id_token: String,
    pub access_token: String,
    pub token_type: String,
    #[zeroize(skip)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
}

impl From<&crate::device_store::DeviceTokens> for DeviceTokenResponse {
    fn from(t: &crate::device_store::DeviceTokens) -> DeviceTokenResponse {
        use secrecy::ExposeSecret;
        DeviceTokenResponse {
            id_token: t.id_token.expose_secret().to_owned(),
            access_token: t.access_token.expose_secret().to_owned(),
            token_type: t.token_type.clone(),
            expires_in: t.expires_in,
        }
    }
}

#[derive(Debug, Default, serde::Deserialize)]
pub struct TokenRequest {
    pub grant_type: Option<String>,
    pub device_code: Option<String>,
    pub client_id: Option<String>,
}

#[derive(Default, serde::Deserialize)]
pub struct CompletionRequest {
    pub code: Option<String>,
    pub state: Option<String>,
    pub id_token: Option<String>,
    pub access_token: Option<String>,
    pub expires_in: Option<String>,
    pub token_type: Option<String>,
}

impl std::fmt::Debug for CompletionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionRequest")
            .field("has_code", &self.code.is_some())
            .field("state", &self.state)
            .field("has_id_token", &self.id_token.is_some())
            .field("has_access_token", &self.access_token.is_some())
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Activation {
    /// No user code given; show the page asking for one.
    Prompt,
    UnknownUserCode,
    Redirect(url::Url),
}

#[derive(Debug, PartialEq, Eq)]
pub enum Completion {
    Retry(url::Url),
    /// Unknown, expired or already completed user code.
    Rejected,
    Completed,
}

pub struct DeviceFlow<S: crate::device_store::DeviceCodeStore> {
    store: S,
    user_pool: crate::config::UserPoolConfig,
    config: crate::config::DeviceFlowConfig,
    verification_uri: url::Url,
    redirect_uri: url::Url,
    retry_uri: url::Url,
}

impl<S: crate::device_store::DeviceCodeStore> std::fmt::Debug for DeviceFlow<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceFlow")
            .field("client_id", &self.user_pool.client_id)
            .field("verification_uri", &self.verification_uri.as_str())
            .field("redirect_uri", &self.redirect_uri.as_str())
            .field("response_type", &self.config.response_type)
            .finish()
    }
}

fn oauth_error(error: &str, description: &str) -> crate::Error {
    crate::Error::OAuthError {
        error: error.to_owned(),
        description: Some(description.to_owned()),
    }
}

fn missing_parameter(name: &str) -> crate::Error {
    oauth_error(
        "invalid_request",
        &format!("The request body must contain the following parameter: '{name}'."),
    )
}

fn unauthorized_client() -> crate::Error {
    oauth_error("unauthorized_client", "Unauthorized or unknown client")
}

impl<S: crate::device_store::DeviceCodeStore> DeviceFlow<S> {
    pub fn new(store: S, config: &crate::config::Config) -> crate::Result<Self> {
        let device = config.device_flow.clone().ok_or_else(|| {
            crate::Error::ConfigError("device_flow is not configured".to_owned())
        })?;
        let verification_uri = match device.verification_uri {
            Some(ref u) => u.clone(),
            None => config.public_url_for("/oauth/device/activate")?,
        };
        let redirect_uri = match device.redirect_uri {
            Some(ref u) => u.clone(),
            None => config.public_url_for("/oauth/complete")?,
        };
        let retry_uri = device
            .retry_uri
            .clone()
            .unwrap_or_else(|| verification_uri.clone());
        Ok(Self {
            store,
            user_pool: config.user_pool.clone(),
            config: device,
            verification_uri,
            redirect_uri,
            retry_uri,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn pages_dir(&self) -> Option<&std::path::Path> {
        self.config.pages_dir.as_deref()
    }

    fn check_client(&self, client_id: Option<&str>) -> crate::Result<()> {
        match client_id {
            None | Some("") => Err(missing_parameter("client_id")),
            Some(c) if c == self.user_pool.client_id => Ok(()),
            Some(c) => {
                tracing::warn!(client_id = %c, "Unknown client");
                Err(unauthorized_client())
            }
        }
    }

    #[tracing::instrument(skip_all)]
    pub async fn issue_codes(
        &self,
        client_id: Option<&str>,
    ) -> crate::Result<DeviceAuthorizationResponse> {
        self.check_client(client_id)?;

        let record = crate::device_store::DeviceCodeRecord {
            device_code: generate_device_code(),
            user_code: self.unused_user_code(generate_user_code).await?,
            expire: chrono::Utc::now().timestamp() + self.config.expires_in as i64,
            tokens: None,
        };
        self.store.put_pending(&record).await?;
        tracing::info!(user_code = %record.user_code, expire = record.expire, "Issued device code");

        let mut verification_uri_complete = self.verification_uri.clone();
        verification_uri_complete
            .query_pairs_mut()
            .append_pair("user_code", &record.user_code);
        Ok(DeviceAuthorizationResponse {
            device_code: record.device_code,
            user_code: record.user_code,
            verification_uri: self.verification_uri.clone(),
            verification_uri_complete,
            expires_in: self.config.expires_in,
            interval: self.config.interval,
        })
    }

    /// User code that no live row holds. Gives up after a few collisions.
    async fn unused_user_code(
        &self,
        mut generate: impl FnMut() -> String,
    ) -> crate::Result<String> {
        for _ in 0..USER_CODE_ATTEMPTS {
            let code = generate();
            if self.store.find_by_user_code(&code).await?.is_none() {
                return Ok(code);
            }
            tracing::debug!(user_code = %code, "User code already in use; regenerating");
        }
        Err(crate::Error::StoreError(
            "could not allocate an unused user code".to_owned(),
        ))
    }

    #[tracing::instrument(skip_all)]
    pub async fn poll_token(&self, req: &TokenRequest) -> crate::Result<DeviceTokenResponse> {
        let grant_type = req
            .grant_type
            .as_deref()
            .ok_or_else(|| missing_parameter("grant_type"))?;
        let device_code = req
            .device_code
            .as_deref()
            .filter(|x| !x.is_empty())
            .ok_or_else(|| missing_parameter("device_code"))?;
        if req.client_id.as_deref().unwrap_or_default().is_empty() {
            return Err(missing_parameter("client_id"));
        }
        if grant_type != DEVICE_CODE_GRANT_TYPE {
            return Err(oauth_error(
                "unsupported_grant_type",
                "The app requested an unsupported grant type",
            ));
        }
        self.check_client(req.client_id.as_deref())?;

        let invalid_grant = || oauth_error("invalid_grant", "Invalid or expired device code.");
        let record = self
            .store
            .find_by_device_code(device_code)
            .await?
            .ok_or_else(invalid_grant)?;
        if record.tokens.is_none() {
            tracing::debug!(user_code = %record.user_code, "Authorization pending");
            return Err(crate::Error::AuthNotReadyError { slow_down: false });
        }
        let claimed = self
            .store
            .claim_tokens(&record.device_code, &record.user_code)
            .await?
            .and_then(|r| r.tokens)
            .ok_or_else(invalid_grant)?;
        tracing::info!(user_code = %record.user_code, "Handed out device flow tokens");
        Ok(DeviceTokenResponse::from(&claimed))
    }

    #[tracing::instrument(skip_all)]
    pub async fn activate(&self, user_code: Option<&str>) -> crate::Result<Activation> {
        let Some(user_code) = user_code.map(normalize_user_code).filter(|x| !x.is_empty())
        else {
            return Ok(Activation::Prompt);
        };
        let Some(record) = self.store.find_by_user_code(&user_code).await? else {
            tracing::info!(user_code = %user_code, "Activation for unknown user code");
            return Ok(Activation::UnknownUserCode);
        };
        let state = encode_state(&record.user_code);
        let url = crate::oauth_code::authorize_url(
            &self.user_pool,
            &crate::oauth_code::AuthorizeRequest {
                response_type: self.config.response_type,
                redirect_url: &self.redirect_uri,
                state: &state,
                identity_provider: self.config.identity_provider.as_deref(),
            },
        )?;
        Ok(Activation::Redirect(url))
    }

    #[tracing::instrument(skip_all, fields(req = ?req))]
    pub async fn complete(&self, req: &CompletionRequest) -> crate::Result<Completion> {
        let retry = || Completion::Retry(self.retry_uri.clone());
        let non_empty = |v: &Option<String>| v.clone().filter(|x| !x.is_empty());

        let Some(user_code) = req.state.as_deref().and_then(decode_state) else {
            return Ok(retry());
        };
        let tokens = match self.config.response_type {
            crate::config::ResponseType::Code => {
                let Some(code) = non_empty(&req.code) else {
                    return Ok(retry());
                };
                let Some(record) = self.store.find_by_user_code(&user_code).await? else {
                    return Ok(Completion::Rejected);
                };
                if record.tokens.is_some() {
                    return Ok(Completion::Rejected);
                }
                let set = crate::oauth_code::OAuthCodeExchange::new(
                    &self.user_pool,
                    &self.redirect_uri,
                )
                .perform(&code)
                .await?;
                (
                    record,
                    crate::device_store::DeviceTokens {
                        id_token: set.id_token,
                        access_token: set.access_token,
                        token_type: "Bearer".to_owned(),
                        expires_in: set.expires_in,
                    },
                )
            }
            crate::config::ResponseType::Token => {
                let (Some(id_token), Some(access_token), Some(expires_in)) = (
                    non_empty(&req.id_token),
                    non_empty(&req.access_token),
                    non_empty(&req.expires_in),
                ) else {
                    return Ok(retry());
                };
                let Some(record) = self.store.find_by_user_code(&user_code).await? else {
                    return Ok(Completion::Rejected);
                };
                (
                    record,
                    crate::device_store::DeviceTokens {
                        id_token: id_token.into(),
                        access_token: access_token.into(),
                        token_type: "Bearer".to_owned(),
                        expires_in: expires_in.parse().ok(),
                    },
                )
            }
        };
        let (record, tokens) = tokens;

        if !self.store.attach_tokens(&record, &tokens).await? {
            return Ok(Completion::Rejected);
        }
        tracing::info!(user_code = %record.user_code, "Device authorization completed");
        Ok(Completion::Completed)
    }
}

fn generate_user_code() -> String {
    let buf: [u8; 4] = rand::random();
    let hex = format!("{:08X}", u32::from_be_bytes(buf));
    format!("{}-{}", &hex[..4], &hex[4..])
}

fn generate_device_code() -> String {
    use sha2::Digest;
    let buf = zeroize::Zeroizing::new(rand::random::<[u8; 32]>());
    format!("{:x}", sha2::Sha512::digest(buf.as_ref()))
}

fn normalize_user_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// `state` parameter carrying the user code through the hosted UI.
pub fn encode_state(user_code: &str) -> String {
    use base64::Engine;
    let form = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("user_code", user_code)
        .finish();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(form)
}

pub fn decode_state(state: &str) -> Option<String> {
    use base64::Engine;
    let raw = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(state.trim_end_matches('='))
        .or_else(|_| base64::engine::general_purpose::STANDARD.decode(state))
        .ok()?;
    url::form_urlencoded::parse(&raw)
        .find(|(k, _)| k == "user_code")
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::device_store::DeviceCodeStore;

    pub(crate) fn config(token_endpoint: Option<url::Url>) -> crate::config::Config {
        let mut user_pool = crate::config::tests::user_pool();
        user_pool.token_endpoint = token_endpoint;
        crate::config::Config {
            listen: "127.0.0.1:0".parse().unwrap(),
            public_url: url::Url::parse("https://api.example.com/").unwrap(),
            user_pool,
            sign_in: None,
            device_flow: Some(serde_json::from_value(serde_json::json!({})).unwrap()),
        }
    }

    fn subject(
        token_endpoint: Option<url::Url>,
    ) -> DeviceFlow<crate::device_store::InMemoryDeviceCodeStore> {
        DeviceFlow::new(
            crate::device_store::InMemoryDeviceCodeStore::new(),
            &config(token_endpoint),
        )
        .unwrap()
    }

    fn token_request(device_code: &str) -> TokenRequest {
        TokenRequest {
            grant_type: Some(DEVICE_CODE_GRANT_TYPE.to_owned()),
            device_code: Some(device_code.to_owned()),
            client_id: Some("clientid".to_owned()),
        }
    }

    fn oauth_error_code(e: &crate::Error) -> &str {
        match e {
            crate::Error::OAuthError { error, .. } => error,
            crate::Error::AuthNotReadyError { .. } => "authorization_pending",
            _ => "other",
        }
    }

    #[test]
    fn test_generate_codes() {
        let uc = generate_user_code();
        assert_eq!(uc.len(), 9);
        assert_eq!(&uc[4..5], "-");
        assert!(uc
            .chars()
            .filter(|c| *c != '-')
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
        let dc = generate_device_code();
        assert_eq!(dc.len(), 128);
        assert!(dc.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(dc, generate_device_code());
    }

    #[test]
    fn test_state() {
        let s = encode_state("ABCD-EF01");
        assert_eq!(decode_state(&s).as_deref(), Some("ABCD-EF01"));
        // padded standard base64 of "user_code=ABCD-EF01"
        assert_eq!(
            decode_state("dXNlcl9jb2RlPUFCQ0QtRUYwMQ==").as_deref(),
            Some("ABCD-EF01")
        );
        assert!(decode_state("!!").is_none());
        assert!(decode_state(&encode_state("")).is_none());
    }

    #[tokio::test]
    async fn test_issue_codes() {
        let flow = subject(None);
        let resp = flow.issue_codes(Some("clientid")).await.unwrap();
        assert_eq!(resp.expires_in, 300);
        assert_eq!(resp.interval, 5);
        assert_eq!(
            resp.verification_uri.as_str(),
            "https://api.example.com/oauth/device/activate"
        );
        assert_eq!(
            resp.verification_uri_complete.as_str(),
            format!(
                "https://api.example.com/oauth/device/activate?user_code={}",
                resp.user_code
            )
        );
        let stored = flow
            .store()
            .find_by_device_code(&resp.device_code)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.user_code, resp.user_code);
        assert!(stored.expire > chrono::Utc::now().timestamp());

        let e = flow.issue_codes(None).await.unwrap_err();
        assert_eq!(oauth_error_code(&e), "invalid_request");
        let e = flow.issue_codes(Some("other")).await.unwrap_err();
        assert_eq!(oauth_error_code(&e), "unauthorized_client");
    }

    #[tokio::test]
    async fn test_user_code_avoids_live_rows() {
        let flow = subject(None);
        flow.store()
            .put_pending(&crate::device_store::DeviceCodeRecord {
                device_code: "dc-taken".to_owned(),
                user_code: "AAAA-AAAA".to_owned(),
                expire: chrono::Utc::now().timestamp() + 300,
                tokens: None,
            })
            .await
            .unwrap();

        let mut candidates = vec!["BBBB-BBBB", "AAAA-AAAA", "AAAA-AAAA"];
        let code = flow
            .unused_user_code(|| candidates.pop().unwrap().to_owned())
            .await
            .unwrap();
        assert_eq!(code, "BBBB-BBBB");

        let e = flow
            .unused_user_code(|| "AAAA-AAAA".to_owned())
            .await
            .unwrap_err();
        assert!(matches!(e, crate::Error::StoreError(_)));
    }

    #[tokio::test]
    async fn test_poll_validation() {
        let flow = subject(None);
        let mut req = token_request("dc");
        req.grant_type = None;
        assert_eq!(
            oauth_error_code(&flow.poll_token(&req).await.unwrap_err()),
            "invalid_request"
        );
        let mut req = token_request("");
        assert_eq!(
            oauth_error_code(&flow.poll_token(&req).await.unwrap_err()),
            "invalid_request"
        );
        req = token_request("dc");
        req.grant_type = Some("authorization_code".to_owned());
        assert_eq!(
            oauth_error_code(&flow.poll_token(&req).await.unwrap_err()),
            "unsupported_grant_type"
        );
        req = token_request("dc");
        req.client_id = Some("other".to_owned());
        assert_eq!(
            oauth_error_code(&flow.poll_token(&req).await.unwrap_err()),
            "unauthorized_client"
        );
        req = token_request("unknown");
        assert_eq!(
            oauth_error_code(&flow.poll_token(&req).await.unwrap_err()),
            "invalid_grant"
        );
    }

    #[tokio::test]
    async fn test_full_flow_with_code() {
        let (token_endpoint, seen) = crate::oauth_code::tests::spawn_token_endpoint(
            axum::http::StatusCode::OK,
            serde_json::json!({"id_token": "idt", "access_token": "at", "refresh_token": "rt", "expires_in": 3600, "token_type": "Bearer"}),
        )
        .await;
        let flow = subject(Some(token_endpoint));
        let codes = flow.issue_codes(Some("clientid")).await.unwrap();

        let e = flow
            .poll_token(&token_request(&codes.device_code))
            .await
            .unwrap_err();
        assert_eq!(oauth_error_code(&e), "authorization_pending");

        assert_eq!(flow.activate(None).await.unwrap(), Activation::Prompt);
        assert_eq!(
            flow.activate(Some("0000-0000")).await.unwrap(),
            Activation::UnknownUserCode
        );
        let Activation::Redirect(url) = flow
            .activate(Some(&codes.user_code.to_lowercase()))
            .await
            .unwrap()
        else {
            panic!("expected redirect");
        };
        let q: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(q["redirect_uri"], "https://api.example.com/oauth/complete");
        assert_eq!(decode_state(&q["state"]), Some(codes.user_code.clone()));

        let completion = CompletionRequest {
            code: Some("thecode".to_owned()),
            state: Some(q["state"].clone()),
            ..Default::default()
        };
        assert_eq!(flow.complete(&completion).await.unwrap(), Completion::Completed);
        assert_eq!(seen.lock().unwrap()[0]["code"], "thecode");
        assert_eq!(flow.complete(&completion).await.unwrap(), Completion::Rejected);

        let tokens = flow
            .poll_token(&token_request(&codes.device_code))
            .await
            .unwrap();
        assert_eq!(tokens.id_token, "idt");
        assert_eq!(tokens.access_token, "at");
        assert_eq!(tokens.token_type, "Bearer");
        assert_eq!(tokens.expires_in, Some(3600));

        let e = flow
            .poll_token(&token_request(&codes.device_code))
            .await
            .unwrap_err();
        assert_eq!(oauth_error_code(&e), "invalid_grant");
    }

    #[tokio::test]
    async fn test_complete_retries_on_missing_parameters() {
        let flow = subject(None);
        let retry = Completion::Retry(url::Url::parse("https://api.example.com/oauth/device/activate").unwrap());
        assert_eq!(
            flow.complete(&CompletionRequest::default()).await.unwrap(),
            retry
        );
        let req = CompletionRequest {
            state: Some(encode_state("ABCD-EF01")),
            ..Default::default()
        };
        assert_eq!(flow.complete(&req).await.unwrap(), retry);
        let req = CompletionRequest {
            code: Some("c".to_owned()),
            state: Some(encode_state("ABCD-EF01")),
            ..Default::default()
        };
        assert_eq!(flow.complete(&req).await.unwrap(), Completion::Rejected);
    }

    #[tokio::test]
    async fn test_complete_with_implicit_tokens() {
        let mut cfg = config(None);
        cfg.device_flow.as_mut().unwrap().response_type = crate::config::ResponseType::Token;
        let flow = DeviceFlow::new(crate::device_store::InMemoryDeviceCodeStore::new(), &cfg)
            .unwrap();
        let codes = flow.issue_codes(Some("clientid")).await.unwrap();

        let mut req = CompletionRequest {
            state: Some(encode_state(&codes.user_code)),
            id_token: Some("idt".to_owned()),
            access_token: Some("at".to_owned()),
            ..Default::default()
        };
        assert!(matches!(
            flow.complete(&req).await.unwrap(),
            Completion::Retry(_)
        ));
        req.expires_in = Some("3600".to_owned());
        assert_eq!(flow.complete(&req).await.unwrap(), Completion::Completed);

        let tokens = flow
            .poll_token(&token_request(&codes.device_code))
            .await
            .unwrap();
        assert_eq!(tokens.expires_in, Some(3600));
    }
}
