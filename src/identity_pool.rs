/// Identity pool identity ID (`<region>:<uuid>`).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(transparent)]
pub struct FederatedIdentity(pub String);

impl std::fmt::Display for FederatedIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

pub(crate) async fn get_id(
    client: &aws_sdk_cognitoidentity::Client,
    identity_pool_id: &str,
    identity_provider: &str,
    id_token: &secrecy::SecretString,
) -> crate::Result<FederatedIdentity> {
    use secrecy::ExposeSecret;
    let resp = client
        .get_id()
        .identity_pool_id(identity_pool_id)
        .logins(identity_provider, id_token.expose_secret())
        .send()
        .await
        .map_err(|e| map_error("GetId", e.into_service_error()))?;
    let identity_id = resp
        .identity_id()
        .ok_or_else(|| crate::client::Error::incomplete("GetId returned no IdentityId".to_owned()))?;
    tracing::debug!(identity_id = %identity_id, "GetId completed");
    Ok(FederatedIdentity(identity_id.to_owned()))
}

pub(crate) async fn get_open_id_token(
    client: &aws_sdk_cognitoidentity::Client,
    identity: &FederatedIdentity,
    identity_provider: &str,
    id_token: &secrecy::SecretString,
) -> crate::Result<secrecy::SecretString> {
    use secrecy::ExposeSecret;
    let resp = client
        .get_open_id_token()
        .identity_id(&identity.0)
        .logins(identity_provider, id_token.expose_secret())
        .send()
        .await
        .map_err(|e| map_error("GetOpenIdToken", e.into_service_error()))?;
    let token = resp.token().ok_or_else(|| {
        crate::client::Error::incomplete("GetOpenIdToken returned no Token".to_owned())
    })?;
    Ok(token.into())
}

pub(crate) async fn get_credentials_for_identity(
    client: &aws_sdk_cognitoidentity::Client,
    identity: &FederatedIdentity,
    identity_provider: &str,
    id_token: &secrecy::SecretString,
    custom_role_arn: Option<&str>,
) -> crate::Result<crate::client::TemporaryCredential> {
    use secrecy::ExposeSecret;
    let resp = client
        .get_credentials_for_identity()
        .identity_id(&identity.0)
        .logins(identity_provider, id_token.expose_secret())
        .set_custom_role_arn(custom_role_arn.map(|x| x.to_owned()))
        .send()
        .await
        .map_err(|e| map_error("GetCredentialsForIdentity", e.into_service_error()))?;

    let incomplete = |field: &str| {
        crate::client::Error::incomplete(format!(
            "GetCredentialsForIdentity returned no {field}"
        ))
    };
    let creds = resp.credentials().ok_or_else(|| incomplete("Credentials"))?;
    let exp = creds.expiration().ok_or_else(|| incomplete("Expiration"))?;
    let expiration = chrono::DateTime::from_timestamp(exp.secs(), exp.subsec_nanos())
        .ok_or_else(|| {
            crate::Error::UnknownError(format!(
                "Failed to parse expiration timestamp: {}",
                exp
            ))
        })?;
    Ok(crate::client::TemporaryCredential {
        access_key_id: creds
            .access_key_id()
            .ok_or_else(|| incomplete("AccessKeyId"))?
            .to_owned(),
        secret_access_key: creds
            .secret_key()
            .ok_or_else(|| incomplete("SecretKey"))?
            .into(),
        session_token: creds
            .session_token()
            .ok_or_else(|| incomplete("SessionToken"))?
            .to_owned(),
        expiration,
    })
}

/// Default authenticated role of the identity pool.
pub(crate) async fn get_authenticated_role(
    client: &aws_sdk_cognitoidentity::Client,
    identity_pool_id: &str,
) -> crate::Result<String> {
    let resp = client
        .get_identity_pool_roles()
        .identity_pool_id(identity_pool_id)
        .send()
        .await
        .map_err(|e| map_error("GetIdentityPoolRoles", e.into_service_error()))?;
    resp.roles()
        .and_then(|r| r.get("authenticated"))
        .map(|x| x.to_owned())
        .ok_or_else(|| {
            crate::Error::ConfigError(format!(
                "Identity pool {identity_pool_id} has no authenticated role"
            ))
        })
}

fn map_error<E>(context: &str, err: E) -> crate::Error
where
    E: std::error::Error
        + aws_smithy_types::error::metadata::ProvideErrorMetadata
        + Send
        + Sync
        + 'static,
{
    crate::client::map_sdk_error!(
        "cognito-identity",
        context,
        err,
        "NotAuthorizedException" => Unauthenticated,
        "InvalidIdentityPoolConfigurationException" => InvalidArgument,
        "InvalidParameterException" => InvalidArgument,
        "ResourceNotFoundException" => NotFound,
        "TooManyRequestsException" => ResourceExhausted,
        "LimitExceededException" => ResourceExhausted,
        "ResourceConflictException" => PermissionDenied,
    )
}
