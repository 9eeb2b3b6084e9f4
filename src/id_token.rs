//! Verification of user pool issued JWTs.
//!
//! Claims are only trusted after the signature is checked against the user pool JWKS and
//! `exp`, `iss`, the audience (`aud` for ID tokens, `client_id` for access tokens) and
//! `token_use` all match.

#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct CognitoClaims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(
        rename = "cognito:username",
        alias = "username",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub username: Option<String>,
    #[serde(
        rename = "cognito:preferred_role",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub preferred_role: Option<String>,
    #[serde(rename = "cognito:roles", default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
    #[serde(rename = "cognito:groups", default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<String>>,
    pub token_use: String,
    pub exp: i64,
    pub iss: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl CognitoClaims {
    /// Role session name candidate: email, else username, else subject.
    pub fn session_name_candidate(&self) -> &str {
        self.email
            .as_deref()
            .or(self.username.as_deref())
            .unwrap_or(&self.sub)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenUse {
    Id,
    Access,
}

impl TokenUse {
    fn as_str(&self) -> &'static str {
        match self {
            TokenUse::Id => "id",
            TokenUse::Access => "access",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TokenVerifier {
    issuer: String,
    client_id: String,
    algorithms: Vec<jsonwebtoken::Algorithm>,
}

impl TokenVerifier {
    pub fn new(user_pool: &crate::config::UserPoolConfig) -> Self {
        Self {
            issuer: user_pool.issuer(),
            client_id: user_pool.client_id.clone(),
            algorithms: vec![jsonwebtoken::Algorithm::RS256],
        }
    }

    pub fn verify(
        &self,
        jwks: &jsonwebtoken::jwk::JwkSet,
        token: &secrecy::SecretString,
        expected: TokenUse,
    ) -> crate::Result<CognitoClaims> {
        use secrecy::ExposeSecret;
        let token = token.expose_secret();

        let header = jsonwebtoken::decode_header(token)?;
        if !self.algorithms.contains(&header.alg) {
            return Err(crate::Error::AuthError(format!(
                "unexpected JWT algorithm: {:?}",
                header.alg
            )));
        }
        let kid = header
            .kid
            .ok_or_else(|| crate::Error::AuthError("JWT header lacks kid".to_owned()))?;
        let jwk = jwks.find(&kid).ok_or_else(|| {
            crate::Error::AuthError(format!("JWT kid {kid} is not in the user pool JWKS"))
        })?;
        let key = jsonwebtoken::DecodingKey::from_jwk(jwk)?;

        let mut validation = jsonwebtoken::Validation::new(header.alg);
        validation.algorithms = self.algorithms.clone();
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        match expected {
            TokenUse::Id => validation.set_audience(&[&self.client_id]),
            TokenUse::Access => validation.validate_aud = false,
        }

        let data = jsonwebtoken::decode::<CognitoClaims>(token, &key, &validation)?;
        let claims = data.claims;
        if claims.token_use != expected.as_str() {
            return Err(crate::Error::AuthError(format!(
                "token_use is {}, expected {}",
                claims.token_use,
                expected.as_str()
            )));
        }
        if expected == TokenUse::Access && claims.client_id.as_deref() != Some(&self.client_id) {
            return Err(crate::Error::AuthError(
                "access token was issued to another client".to_owned(),
            ));
        }
        tracing::debug!(sub = %claims.sub, token_use = %claims.token_use, "Verified JWT");
        Ok(claims)
    }
}

pub async fn fetch_jwks(url: &url::Url) -> crate::Result<jsonwebtoken::jwk::JwkSet> {
    let resp = crate::client::http().get(url.clone()).send().await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(crate::Error::ApiError {
            url: url.clone(),
            status_code: status,
            message: "failed to fetch JWKS".to_owned(),
        });
    }
    Ok(resp.json().await?)
}
