use axum_extra::extract::cookie::{Cookie, SameSite};

pub const COOKIE_NAME: &str = "session";

/// Refresh tokens of Cognito user pools are valid for 30 days unless configured otherwise.
const MAX_AGE: i64 = 30 * 24 * 3600;

/// Browser-held state of a signed-in user. Carried as base64url JSON in one cookie.
#[derive(Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct SessionCookie {
    #[serde(default, with = "optional_secret")]
    pub refresh_token: Option<secrecy::SecretString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<chrono::DateTime<chrono::Utc>>,
}

impl std::fmt::Debug for SessionCookie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCookie")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("identity_id", &self.identity_id)
            .field("expiration", &self.expiration)
            .finish()
    }
}

mod optional_secret {
    pub fn serialize<S: serde::Serializer>(
        value: &Option<secrecy::SecretString>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        use secrecy::ExposeSecret;
        match value {
            Some(v) => serializer.serialize_some(v.expose_secret()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<secrecy::SecretString>, D::Error> {
        let v: Option<String> = serde::Deserialize::deserialize(deserializer)?;
        Ok(v.map(|x| x.into()))
    }
}

impl SessionCookie {
    pub fn from_outcome(outcome: &crate::sign_in::SignInOutcome) -> Self {
        Self {
            refresh_token: outcome.tokens.refresh_token.clone(),
            identity_id: Some(outcome.identity_id.0.clone()),
            expiration: Some(outcome.credential.expiration),
        }
    }

    pub fn encode(&self) -> crate::Result<String> {
        use base64::Engine;
        let json = zeroize::Zeroizing::new(serde_json::to_vec(self)?);
        Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(json.as_slice()))
    }

    pub fn decode(value: &str) -> crate::Result<Self> {
        use base64::Engine;
        let json = zeroize::Zeroizing::new(
            base64::engine::general_purpose::URL_SAFE_NO_PAD
                .decode(value)
                .map_err(|e| crate::Error::UserError(format!("malformed session cookie: {e}")))?,
        );
        Ok(serde_json::from_slice(&json)?)
    }

    /// Cookie storing this session.
    pub fn to_cookie(&self, secure: bool) -> crate::Result<Cookie<'static>> {
        Ok(Cookie::build((COOKIE_NAME, self.encode()?))
            .http_only(true)
            .secure(secure)
            .same_site(SameSite::Lax)
            .path("/")
            .max_age(time::Duration::seconds(MAX_AGE))
            .build())
    }

    /// Session carried in `jar`. Malformed values are ignored.
    pub fn from_jar(jar: &axum_extra::extract::CookieJar) -> Option<Self> {
        let value = jar.get(COOKIE_NAME)?;
        match Self::decode(value.value()) {
            Ok(s) => Some(s),
            Err(e) => {
                tracing::debug!(err = %e, "Ignoring malformed session cookie");
                None
            }
        }
    }
}

/// Expired cookie overwriting the session.
pub fn removal_cookie(secure: bool) -> Cookie<'static> {
    Cookie::build((COOKIE_NAME, ""))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(time::Duration::ZERO)
        .build()
}
