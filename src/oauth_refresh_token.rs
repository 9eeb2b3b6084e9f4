/// grant_type=refresh_token against the user pool token endpoint.
#[derive(Debug)]
pub struct OAuthRefreshTokenFlow {
    user_pool: crate::config::UserPoolConfig,
}

impl OAuthRefreshTokenFlow {
    pub fn new(user_pool: &crate::config::UserPoolConfig) -> Self {
        Self {
            user_pool: user_pool.clone(),
        }
    }

    pub async fn perform(
        &self,
        refresh_token: &secrecy::SecretString,
    ) -> crate::Result<crate::token::IdentityTokenSet> {
        use secrecy::ExposeSecret;
        tracing::info!(flow = ?self, "Refreshing tokens at token endpoint");
        let client = crate::ext_oauth2::client_from_user_pool(&self.user_pool)?;
        let rt = oauth2::RefreshToken::new(refresh_token.expose_secret().to_string());
        let req = client.exchange_refresh_token(&rt).add_scopes(
            self.user_pool
                .scope
                .iter()
                .map(|x| oauth2::Scope::new(x.to_owned())),
        );
        let resp = req.request_async(&crate::client::http()).await?;
        Ok(crate::token::IdentityTokenSet::from_token_response(resp)?
            .or_refresh_token(refresh_token))
    }
}

/// cognito-idp:InitiateAuth with REFRESH_TOKEN_AUTH.
pub async fn initiate_auth(
    client: &aws_sdk_cognitoidentityprovider::Client,
    user_pool: &crate::config::UserPoolConfig,
    refresh_token: &secrecy::SecretString,
) -> crate::Result<crate::token::IdentityTokenSet> {
    use secrecy::ExposeSecret;
    tracing::info!(client_id = %user_pool.client_id, "Refreshing tokens with InitiateAuth");
    let resp = client
        .initiate_auth()
        .auth_flow(aws_sdk_cognitoidentityprovider::types::AuthFlowType::RefreshTokenAuth)
        .client_id(&user_pool.client_id)
        .auth_parameters("REFRESH_TOKEN", refresh_token.expose_secret())
        .send()
        .await
        .map_err(|e| {
            crate::client::map_sdk_error!(
                "cognito-idp",
                "InitiateAuth",
                e.into_service_error(),
                "NotAuthorizedException" => Unauthenticated,
                "UserNotFoundException" => Unauthenticated,
                "InvalidParameterException" => InvalidArgument,
                "TooManyRequestsException" => ResourceExhausted,
                "ResourceNotFoundException" => NotFound,
            )
        })?;
    let result = resp.authentication_result.ok_or_else(|| {
        crate::client::Error::incomplete(
            "InitiateAuth returned no AuthenticationResult (challenge required?)".to_owned(),
        )
    })?;
    Ok(crate::token::IdentityTokenSet::from_authentication_result(result)?
        .or_refresh_token(refresh_token))
}

/// cognito-idp:GlobalSignOut; invalidates every refresh token of the user.
pub async fn global_sign_out(
    client: &aws_sdk_cognitoidentityprovider::Client,
    access_token: &secrecy::SecretString,
) -> crate::Result<()> {
    use secrecy::ExposeSecret;
    client
        .global_sign_out()
        .access_token(access_token.expose_secret())
        .send()
        .await
        .map_err(|e| {
            crate::client::map_sdk_error!(
                "cognito-idp",
                "GlobalSignOut",
                e.into_service_error(),
                "NotAuthorizedException" => Unauthenticated,
                "TooManyRequestsException" => ResourceExhausted,
            )
        })?;
    Ok(())
}
