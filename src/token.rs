/// Tokens issued by the user pool for one sign-in.
#[derive(Clone)]
pub struct IdentityTokenSet {
    pub id_token: secrecy::SecretString,
    pub access_token: secrecy::SecretString,
    pub refresh_token: Option<secrecy::SecretString>,
    pub token_type: String,
    pub expires_in: Option<u64>,
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl std::fmt::Debug for IdentityTokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityTokenSet")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .finish()
    }
}

impl IdentityTokenSet {
    pub(crate) fn from_token_response(
        resp: crate::ext_oauth2::SecrecyTokenResponse,
    ) -> crate::Result<Self> {
        use oauth2::TokenResponse;

        let expires_at = expires_at_from(resp.expires_in);
        let token_type = resp.token_type().as_ref().to_owned();
        let id_token = resp.id_token.ok_or_else(|| {
            crate::Error::AuthError("token endpoint response lacks id_token".to_owned())
        })?;
        Ok(Self {
            id_token,
            access_token: resp.access_token,
            refresh_token: resp.refresh_token,
            token_type,
            expires_in: resp.expires_in,
            expires_at,
        })
    }

    pub(crate) fn from_authentication_result(
        result: aws_sdk_cognitoidentityprovider::types::AuthenticationResultType,
    ) -> crate::Result<Self> {
        let expires_in = u64::try_from(result.expires_in()).ok();
        let id_token = result.id_token.ok_or_else(|| {
            crate::client::Error::incomplete("InitiateAuth returned no IdToken".to_owned())
        })?;
        let access_token = result.access_token.ok_or_else(|| {
            crate::client::Error::incomplete("InitiateAuth returned no AccessToken".to_owned())
        })?;
        Ok(Self {
            id_token: id_token.into(),
            access_token: access_token.into(),
            refresh_token: result.refresh_token.map(|x| x.into()),
            token_type: result.token_type.unwrap_or_else(|| "Bearer".to_owned()),
            expires_in,
            expires_at: expires_at_from(expires_in),
        })
    }

    /// Keeps the presented refresh token when a refresh response does not rotate it.
    pub(crate) fn or_refresh_token(mut self, presented: &secrecy::SecretString) -> Self {
        if self.refresh_token.is_none() {
            self.refresh_token = Some(presented.clone());
        }
        self
    }
}

fn expires_at_from(expires_in: Option<u64>) -> Option<chrono::DateTime<chrono::Utc>> {
    expires_in
        .and_then(|s| i64::try_from(s).ok())
        .and_then(chrono::Duration::try_seconds)
        .and_then(|d| chrono::Utc::now().checked_add_signed(d))
}
