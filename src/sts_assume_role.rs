/// Exchange a Cognito-issued OpenID token for temporary credentials of `role_arn`.
pub(crate) async fn assume_role_with_web_identity(
    sts: &aws_sdk_sts::Client,
    role_arn: &str,
    session_name: &str,
    web_identity_token: &secrecy::SecretString,
    duration_seconds: Option<i32>,
) -> crate::Result<crate::client::TemporaryCredential> {
    use secrecy::ExposeSecret;

    tracing::debug!(
        role_arn = role_arn,
        session_name = session_name,
        "Performing AssumeRoleWithWebIdentity"
    );

    let resp = sts
        .assume_role_with_web_identity()
        .role_arn(role_arn)
        .role_session_name(session_name)
        .web_identity_token(web_identity_token.expose_secret())
        .set_duration_seconds(duration_seconds)
        .send()
        .await
        .map_err(|e| {
            crate::client::map_sdk_error!(
                "AWS STS",
                "AssumeRoleWithWebIdentity",
                e.into_service_error(),
                "AccessDenied" => PermissionDenied,
                "ExpiredTokenException" => Unauthenticated,
                "InvalidIdentityToken" => Unauthenticated,
                "IDPRejectedClaim" => Unauthenticated,
                "IDPCommunicationError" => Unknown,
                "MalformedPolicyDocument" => InvalidArgument,
                "PackedPolicyTooLarge" => InvalidArgument,
                "RegionDisabledException" => InvalidArgument,
                "ValidationError" => InvalidArgument,
            )
        })?;

    let creds = resp.credentials().ok_or_else(|| {
        crate::client::Error::incomplete(
            "STS AssumeRoleWithWebIdentity returned empty credentials".to_owned(),
        )
    })?;

    let exp = creds.expiration();
    let expiration = chrono::DateTime::from_timestamp(exp.secs(), exp.subsec_nanos())
        .ok_or_else(|| {
            crate::Error::UnknownError(format!(
                "Failed to parse expiration timestamp: {}",
                exp
            ))
        })?;

    tracing::debug!(
        role_arn = role_arn,
        access_key_id = creds.access_key_id(),
        expiration = ?expiration,
        "AssumeRoleWithWebIdentity completed successfully"
    );

    Ok(crate::client::TemporaryCredential {
        access_key_id: creds.access_key_id().to_owned(),
        secret_access_key: creds.secret_access_key().into(),
        session_token: creds.session_token().to_owned(),
        expiration,
    })
}

/// Role session name appears in CloudTrail logs. STS accepts `[\w+=,.@-]{2,64}`; other
/// characters are replaced with `-`.
pub fn session_name_from(candidate: &str) -> String {
    let mut name: String = candidate
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '+' | '=' | ',' | '.' | '@' | '-') {
                c
            } else {
                '-'
            }
        })
        .take(64)
        .collect();
    while name.len() < 2 {
        name.push('-');
    }
    name
}
