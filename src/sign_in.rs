/// What the caller presented to sign in.
pub enum AuthorizationGrant {
    Code(String),
    RefreshToken(secrecy::SecretString),
}

impl std::fmt::Debug for AuthorizationGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthorizationGrant::Code(_) => f.write_str("AuthorizationGrant::Code"),
            AuthorizationGrant::RefreshToken(_) => f.write_str("AuthorizationGrant::RefreshToken"),
        }
    }
}

impl AuthorizationGrant {
    /// A fresh authorization code takes precedence over a stored refresh token.
    pub fn select(
        code: Option<String>,
        refresh_token: Option<secrecy::SecretString>,
    ) -> Option<AuthorizationGrant> {
        use secrecy::ExposeSecret;
        match (code.filter(|c| !c.is_empty()), refresh_token) {
            (Some(c), _) => Some(AuthorizationGrant::Code(c)),
            (None, Some(rt)) if !rt.expose_secret().is_empty() => {
                Some(AuthorizationGrant::RefreshToken(rt))
            }
            (None, _) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleSource {
    PreferredClaim,
    IdentityPoolDefault,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RoleSelection {
    pub role_arn: String,
    pub source: RoleSource,
}

#[derive(Debug)]
pub struct SignInOutcome {
    pub credential: crate::client::TemporaryCredential,
    pub tokens: crate::token::IdentityTokenSet,
    pub identity_id: crate::identity_pool::FederatedIdentity,
    /// Absent when the identity pool picked the role on its own
    /// (credentials_for_identity without a preferred role).
    pub role: Option<RoleSelection>,
    pub claims: crate::id_token::CognitoClaims,
}

pub struct SignIn<B: crate::federation::FederationBackend> {
    backend: B,
    config: crate::config::SignInConfig,
    verifier: crate::id_token::TokenVerifier,
    redirect_url: url::Url,
}

impl<B: crate::federation::FederationBackend> std::fmt::Debug for SignIn<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignIn")
            .field("identity_pool_id", &self.config.identity_pool_id)
            .field("role_resolution", &self.config.role_resolution)
            .field("credential_strategy", &self.config.credential_strategy)
            .field("redirect_url", &self.redirect_url.as_str())
            .finish()
    }
}

impl<B: crate::federation::FederationBackend> SignIn<B> {
    pub fn new(
        backend: B,
        user_pool: &crate::config::UserPoolConfig,
        config: &crate::config::SignInConfig,
        redirect_url: url::Url,
    ) -> Self {
        Self {
            backend,
            config: config.clone(),
            verifier: crate::id_token::TokenVerifier::new(user_pool),
            redirect_url,
        }
    }

    pub fn redirect_url(&self) -> &url::Url {
        &self.redirect_url
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[tracing::instrument(skip_all, fields(grant = ?grant))]
    pub async fn perform(&self, grant: AuthorizationGrant) -> crate::Result<SignInOutcome> {
        let tokens = match grant {
            AuthorizationGrant::Code(ref code) => {
                self.backend.exchange_code(code, &self.redirect_url).await
            }
            AuthorizationGrant::RefreshToken(ref rt) => self.backend.refresh(rt).await,
        }
        .inspect_err(|e| tracing::error!(err = ?e, "Failed to obtain identity tokens"))?;

        let claims = self
            .verify(&tokens.id_token, crate::id_token::TokenUse::Id)
            .await
            .inspect_err(|e| tracing::error!(err = ?e, "ID token verification failed"))?;

        let identity_id = self
            .backend
            .get_id(&tokens.id_token)
            .await
            .inspect_err(|e| tracing::error!(err = ?e, "GetId failed"))?;

        let credential = match self.config.credential_strategy {
            crate::config::CredentialStrategy::WebIdentity => {
                let role = self.resolve_role(&claims).await?;
                let session_name =
                    crate::sts_assume_role::session_name_from(claims.session_name_candidate());
                let web_identity_token = self
                    .backend
                    .get_open_id_token(&identity_id, &tokens.id_token)
                    .await
                    .inspect_err(|e| tracing::error!(err = ?e, "GetOpenIdToken failed"))?;
                let credential = self
                    .backend
                    .assume_role_with_web_identity(
                        &role.role_arn,
                        &session_name,
                        &web_identity_token,
                    )
                    .await
                    .inspect_err(|e| {
                        tracing::error!(err = ?e, role = ?role, "AssumeRoleWithWebIdentity failed")
                    })?;
                (credential, Some(role))
            }
            crate::config::CredentialStrategy::CredentialsForIdentity => {
                let role = self.preferred_role(&claims);
                let credential = self
                    .backend
                    .get_credentials_for_identity(
                        &identity_id,
                        &tokens.id_token,
                        role.as_ref().map(|r| r.role_arn.as_str()),
                    )
                    .await
                    .inspect_err(|e| {
                        tracing::error!(err = ?e, role = ?role, "GetCredentialsForIdentity failed")
                    })?;
                (credential, role)
            }
        };
        let (credential, role) = credential;

        tracing::info!(
            sub = %claims.sub,
            identity_id = %identity_id,
            role = ?role,
            access_key_id = %credential.access_key_id,
            "Signed in"
        );
        Ok(SignInOutcome {
            credential,
            tokens,
            identity_id,
            role,
            claims,
        })
    }

    /// Verifies a user pool token against the current JWKS.
    pub async fn verify(
        &self,
        token: &secrecy::SecretString,
        expected: crate::id_token::TokenUse,
    ) -> crate::Result<crate::id_token::CognitoClaims> {
        let jwks = self.backend.jwks().await?;
        self.verifier.verify(&jwks, token, expected)
    }

    /// Refreshes with `refresh_token` to obtain an access token, then revokes every session of
    /// the user. Failures are logged only.
    #[tracing::instrument(skip_all)]
    pub async fn sign_out(&self, refresh_token: &secrecy::SecretString) {
        let tokens = match self.backend.refresh(refresh_token).await {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(err = ?e, "Failed to refresh tokens for sign-out");
                return;
            }
        };
        match self.backend.global_sign_out(&tokens.access_token).await {
            Ok(_) => tracing::info!("Signed out"),
            Err(e) => tracing::warn!(err = ?e, "GlobalSignOut failed"),
        }
    }

    fn preferred_role(&self, claims: &crate::id_token::CognitoClaims) -> Option<RoleSelection> {
        match self.config.role_resolution {
            crate::config::RoleResolution::PreferredClaim => {
                claims.preferred_role.as_ref().map(|arn| RoleSelection {
                    role_arn: arn.to_owned(),
                    source: RoleSource::PreferredClaim,
                })
            }
            crate::config::RoleResolution::IdentityPoolDefault => None,
        }
    }

    async fn resolve_role(
        &self,
        claims: &crate::id_token::CognitoClaims,
    ) -> crate::Result<RoleSelection> {
        if let Some(role) = self.preferred_role(claims) {
            return Ok(role);
        }
        let role_arn = self
            .backend
            .default_authenticated_role()
            .await
            .inspect_err(|e| tracing::error!(err = ?e, "GetIdentityPoolRoles failed"))?;
        Ok(RoleSelection {
            role_arn,
            source: RoleSource::IdentityPoolDefault,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::federation::tests::{Failure, FakeBackend};

    fn sign_in_config() -> crate::config::SignInConfig {
        serde_json::from_value(serde_json::json!({
            "identity_pool_id": "us-west-2:00000000-0000-0000-0000-000000000000",
        }))
        .unwrap()
    }

    fn subject(
        backend: FakeBackend,
        config: crate::config::SignInConfig,
    ) -> SignIn<FakeBackend> {
        SignIn::new(
            backend,
            &crate::config::tests::user_pool(),
            &config,
            url::Url::parse("https://api.example.com/signin").unwrap(),
        )
    }

    #[test]
    fn test_grant_select() {
        assert!(AuthorizationGrant::select(None, None).is_none());
        assert!(AuthorizationGrant::select(Some("".to_owned()), Some("".into())).is_none());
        assert!(matches!(
            AuthorizationGrant::select(Some("c".to_owned()), Some("rt".into())),
            Some(AuthorizationGrant::Code(c)) if c == "c"
        ));
        assert!(matches!(
            AuthorizationGrant::select(None, Some("rt".into())),
            Some(AuthorizationGrant::RefreshToken(_))
        ));
    }

    #[tokio::test]
    async fn test_code_with_pool_default_role() {
        use secrecy::ExposeSecret;
        let up = crate::config::tests::user_pool();
        let s = subject(FakeBackend::new(&up), sign_in_config());
        let outcome = s
            .perform(AuthorizationGrant::Code("thecode".to_owned()))
            .await
            .unwrap();
        assert_eq!(outcome.credential.access_key_id, "ASIAWEBIDENTITY");
        assert_eq!(
            outcome.role,
            Some(RoleSelection {
                role_arn: "arn:aws:iam::123456789012:role/Authenticated".to_owned(),
                source: RoleSource::IdentityPoolDefault,
            })
        );
        assert_eq!(outcome.identity_id.0, "us-west-2:identity");
        assert_eq!(
            outcome.tokens.refresh_token.unwrap().expose_secret(),
            "rt-new"
        );
        assert_eq!(
            s.backend().calls(),
            vec![
                "exchange_code:thecode:https://api.example.com/signin".to_owned(),
                "get_id".to_owned(),
                "default_authenticated_role".to_owned(),
                "get_open_id_token:us-west-2:identity".to_owned(),
                "assume_role_with_web_identity:arn:aws:iam::123456789012:role/Authenticated:user@example.com".to_owned(),
            ]
        );
    }

    #[tokio::test]
    async fn test_preferred_role_claim() {
        let up = crate::config::tests::user_pool();
        let mut backend = FakeBackend::new(&up);
        let claims = backend.id_claims.as_mut().unwrap();
        claims["cognito:preferred_role"] = "arn:aws:iam::123456789012:role/Admin".into();
        claims.as_object_mut().unwrap().remove("email");
        let s = subject(backend, sign_in_config());

        let outcome = s
            .perform(AuthorizationGrant::RefreshToken("rt-old".into()))
            .await
            .unwrap();
        assert_eq!(outcome.role.unwrap().source, RoleSource::PreferredClaim);
        let calls = s.backend().calls();
        assert_eq!(calls[0], "refresh:rt-old");
        assert!(!calls.contains(&"default_authenticated_role".to_owned()));
        assert_eq!(
            calls.last().unwrap(),
            "assume_role_with_web_identity:arn:aws:iam::123456789012:role/Admin:user"
        );
    }

    #[tokio::test]
    async fn test_refresh_keeps_refresh_token() {
        use secrecy::ExposeSecret;
        let up = crate::config::tests::user_pool();
        let s = subject(FakeBackend::new(&up), sign_in_config());
        let outcome = s
            .perform(AuthorizationGrant::RefreshToken("rt-old".into()))
            .await
            .unwrap();
        assert_eq!(
            outcome.tokens.refresh_token.unwrap().expose_secret(),
            "rt-old"
        );
    }

    #[tokio::test]
    async fn test_credentials_for_identity() {
        let up = crate::config::tests::user_pool();
        let mut config = sign_in_config();
        config.credential_strategy = crate::config::CredentialStrategy::CredentialsForIdentity;
        let s = subject(FakeBackend::new(&up), config);
        let outcome = s
            .perform(AuthorizationGrant::Code("c".to_owned()))
            .await
            .unwrap();
        assert_eq!(outcome.credential.access_key_id, "ASIAFORIDENTITY");
        assert!(outcome.role.is_none());
        assert_eq!(
            s.backend().calls().last().unwrap(),
            "get_credentials_for_identity:us-west-2:identity:-"
        );
    }

    #[tokio::test]
    async fn test_identity_pool_default_ignores_claim() {
        let up = crate::config::tests::user_pool();
        let mut backend = FakeBackend::new(&up);
        backend.id_claims.as_mut().unwrap()["cognito:preferred_role"] =
            "arn:aws:iam::123456789012:role/Admin".into();
        let mut config = sign_in_config();
        config.role_resolution = crate::config::RoleResolution::IdentityPoolDefault;
        let s = subject(backend, config);
        let outcome = s
            .perform(AuthorizationGrant::Code("c".to_owned()))
            .await
            .unwrap();
        assert_eq!(outcome.role.unwrap().source, RoleSource::IdentityPoolDefault);
    }

    #[tokio::test]
    async fn test_untrusted_id_token_stops_exchange() {
        let up = crate::config::tests::user_pool();
        let mut backend = FakeBackend::new(&up);
        backend.id_claims.as_mut().unwrap()["aud"] = "otherclient".into();
        let s = subject(backend, sign_in_config());
        let err = s
            .perform(AuthorizationGrant::Code("c".to_owned()))
            .await
            .unwrap_err();
        assert!(err.is_grant_rejection());
        assert_eq!(s.backend().calls().len(), 1);
    }

    #[tokio::test]
    async fn test_failures_propagate() {
        let up = crate::config::tests::user_pool();
        let mut backend = FakeBackend::new(&up);
        backend.failure = Failure::RejectGrant;
        let s = subject(backend, sign_in_config());
        let err = s
            .perform(AuthorizationGrant::Code("c".to_owned()))
            .await
            .unwrap_err();
        assert!(err.is_grant_rejection());

        let mut backend = FakeBackend::new(&up);
        backend.failure = Failure::Upstream;
        let s = subject(backend, sign_in_config());
        let err = s
            .perform(AuthorizationGrant::Code("c".to_owned()))
            .await
            .unwrap_err();
        assert!(!err.is_grant_rejection());
    }

    #[tokio::test]
    async fn test_sign_out() {
        let up = crate::config::tests::user_pool();
        let s = subject(FakeBackend::new(&up), sign_in_config());
        s.sign_out(&"rt".into()).await;
        assert_eq!(s.backend().calls(), vec!["refresh:rt", "global_sign_out"]);

        let mut backend = FakeBackend::new(&up);
        backend.failure = Failure::RejectGrant;
        let s = subject(backend, sign_in_config());
        s.sign_out(&"rt".into()).await;
        assert_eq!(s.backend().calls(), vec!["refresh:rt"]);
    }
}
