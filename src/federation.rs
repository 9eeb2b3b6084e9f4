/// Remote operations the sign-in exchange depends on. [`AwsFederationBackend`] talks to Cognito
/// and STS; tests substitute a fake.
#[async_trait::async_trait]
pub trait FederationBackend: Send + Sync {
    async fn exchange_code(
        &self,
        code: &str,
        redirect_url: &url::Url,
    ) -> crate::Result<crate::token::IdentityTokenSet>;

    async fn refresh(
        &self,
        refresh_token: &secrecy::SecretString,
    ) -> crate::Result<crate::token::IdentityTokenSet>;

    async fn jwks(&self) -> crate::Result<jsonwebtoken::jwk::JwkSet>;

    async fn get_id(
        &self,
        id_token: &secrecy::SecretString,
    ) -> crate::Result<crate::identity_pool::FederatedIdentity>;

    async fn default_authenticated_role(&self) -> crate::Result<String>;

    async fn get_open_id_token(
        &self,
        identity: &crate::identity_pool::FederatedIdentity,
        id_token: &secrecy::SecretString,
    ) -> crate::Result<secrecy::SecretString>;

    async fn assume_role_with_web_identity(
        &self,
        role_arn: &str,
        session_name: &str,
        web_identity_token: &secrecy::SecretString,
    ) -> crate::Result<crate::client::TemporaryCredential>;

    async fn get_credentials_for_identity(
        &self,
        identity: &crate::identity_pool::FederatedIdentity,
        id_token: &secrecy::SecretString,
        custom_role_arn: Option<&str>,
    ) -> crate::Result<crate::client::TemporaryCredential>;

    async fn global_sign_out(&self, access_token: &secrecy::SecretString) -> crate::Result<()>;
}

pub struct AwsFederationBackend {
    user_pool: crate::config::UserPoolConfig,
    sign_in: crate::config::SignInConfig,
    identity_provider: String,
    cognito_idp: aws_sdk_cognitoidentityprovider::Client,
    cognito_identity: aws_sdk_cognitoidentity::Client,
    sts: aws_sdk_sts::Client,
}

impl AwsFederationBackend {
    pub async fn new(
        user_pool: &crate::config::UserPoolConfig,
        sign_in: &crate::config::SignInConfig,
    ) -> Self {
        let sdk_config = crate::client::sdk_config(&user_pool.region).await;
        Self {
            user_pool: user_pool.clone(),
            sign_in: sign_in.clone(),
            identity_provider: sign_in.identity_provider(user_pool),
            cognito_idp: aws_sdk_cognitoidentityprovider::Client::new(&sdk_config),
            cognito_identity: aws_sdk_cognitoidentity::Client::new(&sdk_config),
            sts: aws_sdk_sts::Client::new(&sdk_config),
        }
    }
}

#[async_trait::async_trait]
impl FederationBackend for AwsFederationBackend {
    async fn exchange_code(
        &self,
        code: &str,
        redirect_url: &url::Url,
    ) -> crate::Result<crate::token::IdentityTokenSet> {
        crate::oauth_code::OAuthCodeExchange::new(&self.user_pool, redirect_url)
            .perform(code)
            .await
    }

    async fn refresh(
        &self,
        refresh_token: &secrecy::SecretString,
    ) -> crate::Result<crate::token::IdentityTokenSet> {
        match self.sign_in.refresh_strategy {
            crate::config::RefreshStrategy::InitiateAuth => {
                crate::oauth_refresh_token::initiate_auth(
                    &self.cognito_idp,
                    &self.user_pool,
                    refresh_token,
                )
                .await
            }
            crate::config::RefreshStrategy::TokenEndpoint => {
                crate::oauth_refresh_token::OAuthRefreshTokenFlow::new(&self.user_pool)
                    .perform(refresh_token)
                    .await
            }
        }
    }

    async fn jwks(&self) -> crate::Result<jsonwebtoken::jwk::JwkSet> {
        crate::id_token::fetch_jwks(&self.user_pool.jwks_uri()?).await
    }

    async fn get_id(
        &self,
        id_token: &secrecy::SecretString,
    ) -> crate::Result<crate::identity_pool::FederatedIdentity> {
        crate::identity_pool::get_id(
            &self.cognito_identity,
            &self.sign_in.identity_pool_id,
            &self.identity_provider,
            id_token,
        )
        .await
    }

    async fn default_authenticated_role(&self) -> crate::Result<String> {
        crate::identity_pool::get_authenticated_role(
            &self.cognito_identity,
            &self.sign_in.identity_pool_id,
        )
        .await
    }

    async fn get_open_id_token(
        &self,
        identity: &crate::identity_pool::FederatedIdentity,
        id_token: &secrecy::SecretString,
    ) -> crate::Result<secrecy::SecretString> {
        crate::identity_pool::get_open_id_token(
            &self.cognito_identity,
            identity,
            &self.identity_provider,
            id_token,
        )
        .await
    }

    async fn assume_role_with_web_identity(
        &self,
        role_arn: &str,
        session_name: &str,
        web_identity_token: &secrecy::SecretString,
    ) -> crate::Result<crate::client::TemporaryCredential> {
        crate::sts_assume_role::assume_role_with_web_identity(
            &self.sts,
            role_arn,
            session_name,
            web_identity_token,
            self.sign_in.session_duration,
        )
        .await
    }

    async fn get_credentials_for_identity(
        &self,
        identity: &crate::identity_pool::FederatedIdentity,
        id_token: &secrecy::SecretString,
        custom_role_arn: Option<&str>,
    ) -> crate::Result<crate::client::TemporaryCredential> {
        crate::identity_pool::get_credentials_for_identity(
            &self.cognito_identity,
            identity,
            &self.identity_provider,
            id_token,
            custom_role_arn,
        )
        .await
    }

    async fn global_sign_out(&self, access_token: &secrecy::SecretString) -> crate::Result<()> {
        crate::oauth_refresh_token::global_sign_out(&self.cognito_idp, access_token).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    //! In-process stand-in for Cognito and STS.

    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub(crate) enum Failure {
        #[default]
        None,
        RejectGrant,
        Upstream,
    }

    #[derive(Default)]
    pub(crate) struct FakeBackend {
        pub(crate) user_pool: Option<crate::config::UserPoolConfig>,
        pub(crate) id_claims: Option<serde_json::Value>,
        pub(crate) issue_refresh_token: bool,
        pub(crate) failure: Failure,
        pub(crate) calls: std::sync::Mutex<Vec<String>>,
    }

    impl FakeBackend {
        pub(crate) fn new(user_pool: &crate::config::UserPoolConfig) -> Self {
            Self {
                user_pool: Some(user_pool.clone()),
                id_claims: Some(crate::id_token::tests::id_claims(user_pool)),
                issue_refresh_token: true,
                ..Default::default()
            }
        }

        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        fn tokens(&self, refresh_token: Option<&str>) -> crate::token::IdentityTokenSet {
            let up = self.user_pool.as_ref().unwrap();
            crate::token::IdentityTokenSet {
                id_token: crate::id_token::tests::sign(self.id_claims.as_ref().unwrap()),
                access_token: crate::id_token::tests::sign(
                    &crate::id_token::tests::access_claims(up),
                ),
                refresh_token: refresh_token.map(|x| x.into()),
                token_type: "Bearer".to_owned(),
                expires_in: Some(3600),
                expires_at: None,
            }
        }

        fn credential(&self, key: &str) -> crate::client::TemporaryCredential {
            crate::client::TemporaryCredential {
                access_key_id: key.to_owned(),
                secret_access_key: "secret".into(),
                session_token: "session".to_owned(),
                expiration: chrono::Utc::now() + chrono::Duration::hours(1),
            }
        }

        fn fail(&self) -> crate::Result<()> {
            match self.failure {
                Failure::None => Ok(()),
                Failure::RejectGrant => Err(crate::Error::OAuthError {
                    error: "invalid_grant".to_owned(),
                    description: None,
                }),
                Failure::Upstream => Err(crate::Error::UnknownError("boom".to_owned())),
            }
        }
    }

    #[async_trait::async_trait]
    impl super::FederationBackend for FakeBackend {
        async fn exchange_code(
            &self,
            code: &str,
            redirect_url: &url::Url,
        ) -> crate::Result<crate::token::IdentityTokenSet> {
            self.record(format!("exchange_code:{code}:{redirect_url}"));
            self.fail()?;
            Ok(self.tokens(self.issue_refresh_token.then_some("rt-new")))
        }

        async fn refresh(
            &self,
            refresh_token: &secrecy::SecretString,
        ) -> crate::Result<crate::token::IdentityTokenSet> {
            use secrecy::ExposeSecret;
            self.record(format!("refresh:{}", refresh_token.expose_secret()));
            self.fail()?;
            Ok(self.tokens(None).or_refresh_token(refresh_token))
        }

        async fn jwks(&self) -> crate::Result<jsonwebtoken::jwk::JwkSet> {
            Ok(crate::id_token::tests::jwks())
        }

        async fn get_id(
            &self,
            _id_token: &secrecy::SecretString,
        ) -> crate::Result<crate::identity_pool::FederatedIdentity> {
            self.record("get_id".to_owned());
            Ok(crate::identity_pool::FederatedIdentity(
                "us-west-2:identity".to_owned(),
            ))
        }

        async fn default_authenticated_role(&self) -> crate::Result<String> {
            self.record("default_authenticated_role".to_owned());
            Ok("arn:aws:iam::123456789012:role/Authenticated".to_owned())
        }

        async fn get_open_id_token(
            &self,
            identity: &crate::identity_pool::FederatedIdentity,
            _id_token: &secrecy::SecretString,
        ) -> crate::Result<secrecy::SecretString> {
            self.record(format!("get_open_id_token:{identity}"));
            Ok("openid-token".into())
        }

        async fn assume_role_with_web_identity(
            &self,
            role_arn: &str,
            session_name: &str,
            _web_identity_token: &secrecy::SecretString,
        ) -> crate::Result<crate::client::TemporaryCredential> {
            self.record(format!("assume_role_with_web_identity:{role_arn}:{session_name}"));
            Ok(self.credential("ASIAWEBIDENTITY"))
        }

        async fn get_credentials_for_identity(
            &self,
            identity: &crate::identity_pool::FederatedIdentity,
            _id_token: &secrecy::SecretString,
            custom_role_arn: Option<&str>,
        ) -> crate::Result<crate::client::TemporaryCredential> {
            self.record(format!(
                "get_credentials_for_identity:{identity}:{}",
                custom_role_arn.unwrap_or("-")
            ));
            Ok(self.credential("ASIAFORIDENTITY"))
        }

        async fn global_sign_out(
            &self,
            _access_token: &secrecy::SecretString,
        ) -> crate::Result<()> {
            self.record("global_sign_out".to_owned());
            Ok(())
        }
    }
}
