pub type SecrecyClient<
    HasAuthUrl = oauth2::EndpointNotSet,
    HasTokenUrl = oauth2::EndpointSet,
> = oauth2::Client<
    oauth2::basic::BasicErrorResponse,
    SecrecyTokenResponse,
    oauth2::basic::BasicTokenIntrospectionResponse,
    oauth2::StandardRevocableToken,
    oauth2::basic::BasicRevocationErrorResponse,
    HasAuthUrl,
    oauth2::EndpointNotSet,
    oauth2::EndpointNotSet,
    oauth2::EndpointNotSet,
    HasTokenUrl,
>;

/// Token endpoint response of a Cognito user pool. Unlike the stock oauth2 response, all tokens
/// stay in [`secrecy::SecretString`] and the OpenID Connect `id_token` is carried along.
#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct SecrecyTokenResponse {
    #[serde(skip_serializing)]
    pub access_token: secrecy::SecretString,
    #[serde(skip_serializing)]
    pub id_token: Option<secrecy::SecretString>,
    #[serde(deserialize_with = "oauth2::helpers::deserialize_untagged_enum_case_insensitive")]
    pub token_type: oauth2::basic::BasicTokenType,
    pub expires_in: Option<u64>,
    #[serde(skip_serializing)]
    pub refresh_token: Option<secrecy::SecretString>,

    #[serde(default = "default_dummy_at", skip_serializing)]
    dummy_at: oauth2::AccessToken,
}

fn default_dummy_at() -> oauth2::AccessToken {
    oauth2::AccessToken::new("dummyaccesstokendummy".to_owned())
}

impl oauth2::TokenResponse for SecrecyTokenResponse {
    type TokenType = oauth2::basic::BasicTokenType;

    fn access_token(&self) -> &oauth2::AccessToken {
        &self.dummy_at
    }

    fn token_type(&self) -> &oauth2::basic::BasicTokenType {
        &self.token_type
    }

    fn expires_in(&self) -> Option<std::time::Duration> {
        self.expires_in.map(std::time::Duration::from_secs)
    }

    fn refresh_token(&self) -> Option<&oauth2::RefreshToken> {
        None
    }

    fn scopes(&self) -> Option<&Vec<oauth2::Scope>> {
        None
    }
}

/// Builds an oauth2 client for the user pool app client, pointing at the hosted UI token
/// endpoint.
pub(crate) fn client_from_user_pool(
    user_pool: &crate::config::UserPoolConfig,
) -> crate::Result<SecrecyClient> {
    let mut client = SecrecyClient::<oauth2::EndpointNotSet, oauth2::EndpointNotSet>::new(
        oauth2::ClientId::new(user_pool.client_id.clone()),
    )
    .set_token_uri(oauth2::TokenUrl::from_url(user_pool.token_endpoint()?));
    if let Some(ref secret) = user_pool.client_secret {
        client = client.set_client_secret(oauth2::ClientSecret::new(secret.to_owned()));
    }
    Ok(client)
}
