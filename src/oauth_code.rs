/// Exchanges an authorization code at the user pool token endpoint.
#[derive(Debug)]
pub struct OAuthCodeExchange {
    user_pool: crate::config::UserPoolConfig,
    redirect_url: url::Url,
}

impl OAuthCodeExchange {
    pub fn new(user_pool: &crate::config::UserPoolConfig, redirect_url: &url::Url) -> Self {
        Self {
            user_pool: user_pool.clone(),
            redirect_url: redirect_url.clone(),
        }
    }

    pub async fn perform(&self, code: &str) -> crate::Result<crate::token::IdentityTokenSet> {
        tracing::info!(flow = ?self, "Exchanging OAuth 2.0 authorization code");
        if code.is_empty() {
            return Err(crate::Error::AuthError(
                "authorization code is empty".to_owned(),
            ));
        }
        let client = crate::ext_oauth2::client_from_user_pool(&self.user_pool)?
            .set_redirect_uri(oauth2::RedirectUrl::from_url(self.redirect_url.clone()));
        let req = client.exchange_code(oauth2::AuthorizationCode::new(code.to_owned()));
        let resp = req.request_async(&crate::client::http()).await?;
        crate::token::IdentityTokenSet::from_token_response(resp)
    }
}

/// Hosted UI `/login` URL which comes back to `redirect_url` with a `code`.
pub fn login_url(
    user_pool: &crate::config::UserPoolConfig,
    redirect_url: &url::Url,
) -> crate::Result<url::Url> {
    let mut url = user_pool.login_endpoint()?;
    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", &user_pool.client_id)
        .append_pair("redirect_uri", redirect_url.as_str());
    Ok(url)
}

pub struct AuthorizeRequest<'a> {
    pub response_type: crate::config::ResponseType,
    pub redirect_url: &'a url::Url,
    pub state: &'a str,
    pub identity_provider: Option<&'a str>,
}

/// Hosted UI `/oauth2/authorize` URL.
pub fn authorize_url(
    user_pool: &crate::config::UserPoolConfig,
    req: &AuthorizeRequest<'_>,
) -> crate::Result<url::Url> {
    let mut url = user_pool.authorize_endpoint()?;
    {
        let mut q = url.query_pairs_mut();
        q.append_pair("response_type", req.response_type.as_str())
            .append_pair("client_id", &user_pool.client_id)
            .append_pair("redirect_uri", req.redirect_url.as_str())
            .append_pair("state", req.state)
            .append_pair("scope", &user_pool.scope.join(" "));
        if let Some(idp) = req.identity_provider {
            q.append_pair("identity_provider", idp);
        }
    }
    Ok(url)
}
