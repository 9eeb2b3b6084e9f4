//! HTTP surface: console sign-in, credential and token endpoints, and the device
//! authorization grant.

#[derive(Debug)]
pub struct Server<B, S>
where
    B: crate::federation::FederationBackend,
    S: crate::device_store::DeviceCodeStore,
{
    inner: std::sync::Arc<ServerInner<B, S>>,
}

impl<B, S> Clone for Server<B, S>
where
    B: crate::federation::FederationBackend,
    S: crate::device_store::DeviceCodeStore,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

#[derive(Debug)]
struct ServerInner<B, S>
where
    B: crate::federation::FederationBackend,
    S: crate::device_store::DeviceCodeStore,
{
    user_pool: crate::config::UserPoolConfig,
    sign_in: Option<crate::sign_in::SignIn<B>>,
    console: Option<crate::console_signin::ConsoleSignIn>,
    device_flow: Option<crate::device_flow::DeviceFlow<S>>,
    pages: crate::pages::Pages,
    secure_cookie: bool,
}

impl<B, S> ServerInner<B, S>
where
    B: crate::federation::FederationBackend,
    S: crate::device_store::DeviceCodeStore,
{
    fn sign_in(&self) -> crate::Result<&crate::sign_in::SignIn<B>> {
        self.sign_in
            .as_ref()
            .ok_or_else(|| crate::Error::ConfigError("sign_in is not configured".to_owned()))
    }

    fn device_flow(&self) -> crate::Result<&crate::device_flow::DeviceFlow<S>> {
        self.device_flow
            .as_ref()
            .ok_or_else(|| crate::Error::ConfigError("device_flow is not configured".to_owned()))
    }

    fn login_url(&self) -> crate::Result<url::Url> {
        crate::oauth_code::login_url(&self.user_pool, self.sign_in()?.redirect_url())
    }
}

impl<B, S> Server<B, S>
where
    B: crate::federation::FederationBackend + 'static,
    S: crate::device_store::DeviceCodeStore + 'static,
{
    pub fn new(
        config: &crate::config::Config,
        backend: Option<B>,
        store: Option<S>,
    ) -> crate::Result<Self> {
        let sign_in = match (&config.sign_in, backend) {
            (Some(c), Some(b)) => Some(crate::sign_in::SignIn::new(
                b,
                &config.user_pool,
                c,
                config.public_url_for("/signin")?,
            )),
            (None, _) => None,
            (Some(_), None) => {
                return Err(crate::Error::ConfigError(
                    "sign_in is configured but no federation backend was given".to_owned(),
                ))
            }
        };
        let console = config.sign_in.as_ref().map(|c| {
            crate::console_signin::ConsoleSignIn::new(&c.console, &config.public_url)
                .with_session_duration(c.session_duration)
        });
        let device_flow = match (&config.device_flow, store) {
            (Some(_), Some(s)) => Some(crate::device_flow::DeviceFlow::new(s, config)?),
            (None, _) => None,
            (Some(_), None) => {
                return Err(crate::Error::ConfigError(
                    "device_flow is configured but no device code store was given".to_owned(),
                ))
            }
        };
        let pages = crate::pages::Pages::new(
            device_flow
                .as_ref()
                .and_then(|d: &crate::device_flow::DeviceFlow<S>| d.pages_dir()),
        );
        Ok(Self {
            inner: std::sync::Arc::new(ServerInner {
                user_pool: config.user_pool.clone(),
                sign_in,
                console,
                device_flow,
                pages,
                secure_cookie: config.public_url.scheme() == "https",
            }),
        })
    }

    pub fn router(&self) -> axum::Router {
        let mut router = axum::Router::new();
        if self.inner.sign_in.is_some() {
            router = router
                .route("/signin", axum::routing::get(handle_signin::<B, S>))
                .route(
                    "/credentials",
                    axum::routing::get(handle_credentials::<B, S>),
                )
                .route("/userinfo", axum::routing::get(handle_userinfo::<B, S>))
                .route("/signout", axum::routing::post(handle_signout::<B, S>));
        }
        if self.inner.device_flow.is_some() {
            router = router
                .route(
                    "/oauth/device/code",
                    axum::routing::post(handle_device_code::<B, S>)
                        .get(handle_device_code::<B, S>),
                )
                .route("/oauth/token", axum::routing::post(handle_token::<B, S>))
                .route(
                    "/oauth/device/activate",
                    axum::routing::get(handle_activate::<B, S>)
                        .post(handle_activate::<B, S>),
                )
                .route(
                    "/oauth/complete",
                    axum::routing::get(handle_complete::<B, S>),
                )
                .route("/favicon.ico", axum::routing::get(handle_not_found))
                .fallback(handle_resource::<B, S>);
        }
        router.layer(axum::extract::Extension(self.inner.clone()))
    }
}

type Inner<B, S> = axum::extract::Extension<std::sync::Arc<ServerInner<B, S>>>;

fn found(location: &url::Url) -> axum::response::Response {
    use axum::response::IntoResponse;
    (
        axum::http::StatusCode::FOUND,
        [(axum::http::header::LOCATION, location.to_string())],
    )
        .into_response()
}

fn server_error(e: &crate::Error) -> axum::response::Response {
    use axum::response::IntoResponse;
    tracing::error!(err = ?e, "Request failed");
    (
        axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        axum::Json(serde_json::json!({"error": "server_error"})),
    )
        .into_response()
}

/// JSON error body of the OAuth 2.0 endpoints.
fn oauth_error_response(e: crate::Error) -> axum::response::Response {
    use axum::response::IntoResponse;
    match e {
        crate::Error::OAuthError { error, description } => {
            tracing::info!(error = %error, description = ?description, "Rejected OAuth request");
            (
                axum::http::StatusCode::BAD_REQUEST,
                axum::Json(serde_json::json!({
                    "error": error,
                    "error_description": description,
                })),
            )
                .into_response()
        }
        crate::Error::AuthNotReadyError { slow_down } => (
            axum::http::StatusCode::BAD_REQUEST,
            axum::Json(if slow_down {
                serde_json::json!({"error": "slow_down"})
            } else {
                serde_json::json!({
                    "error": "authorization_pending",
                    "error_description": "OAuth 2.0 device flow error. Authorization is pending. Continue polling.",
                })
            }),
        )
            .into_response(),
        e => server_error(&e),
    }
}

fn html(status: axum::http::StatusCode, body: String) -> axum::response::Response {
    use axum::response::IntoResponse;
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "text/html; charset=utf-8")],
        body,
    )
        .into_response()
}

#[derive(Debug, serde::Deserialize)]
struct SignInQuery {
    code: Option<String>,
}

#[tracing::instrument(skip_all)]
async fn handle_signin<B, S>(
    axum::extract::Extension(inner): Inner<B, S>,
    axum::extract::Query(query): axum::extract::Query<SignInQuery>,
    crate::ext_axum::ExtractSession(jar, session): crate::ext_axum::ExtractSession,
) -> axum::response::Response
where
    B: crate::federation::FederationBackend + 'static,
    S: crate::device_store::DeviceCodeStore + 'static,
{
    use axum::response::IntoResponse;
    let (sign_in, console, login_url) = match (
        inner.sign_in(),
        inner.console.as_ref(),
        inner.login_url(),
    ) {
        (Ok(s), Some(c), Ok(l)) => (s, c, l),
        (Err(e), _, _) | (_, _, Err(e)) => return server_error(&e),
        (_, None, _) => {
            return server_error(&crate::Error::ConfigError(
                "console sign-in is not configured".to_owned(),
            ))
        }
    };
    let Some(grant) = crate::sign_in::AuthorizationGrant::select(
        query.code,
        session.and_then(|s| s.refresh_token),
    ) else {
        tracing::debug!("No grant presented; redirecting to login");
        return found(&login_url);
    };

    let outcome = match sign_in.perform(grant).await {
        Ok(o) => o,
        Err(e) if e.is_grant_rejection() => {
            tracing::warn!(err = ?e, "Grant rejected; redirecting to login");
            let jar = jar.add(crate::session_cookie::removal_cookie(inner.secure_cookie));
            return (jar, found(&login_url)).into_response();
        }
        Err(e) => return server_error(&e),
    };

    let console_url = match console.console_url(&outcome.credential).await {
        Ok(u) => u,
        Err(e) => return server_error(&e),
    };
    match crate::session_cookie::SessionCookie::from_outcome(&outcome).to_cookie(inner.secure_cookie)
    {
        Ok(c) => (jar.add(c), found(&console_url)).into_response(),
        Err(e) => server_error(&e),
    }
}

#[tracing::instrument(skip_all)]
async fn handle_credentials<B, S>(
    axum::extract::Extension(inner): Inner<B, S>,
    axum::extract::Query(query): axum::extract::Query<SignInQuery>,
    crate::ext_axum::ExtractSession(jar, session): crate::ext_axum::ExtractSession,
) -> axum::response::Response
where
    B: crate::federation::FederationBackend + 'static,
    S: crate::device_store::DeviceCodeStore + 'static,
{
    use axum::response::IntoResponse;
    let sign_in = match inner.sign_in() {
        Ok(s) => s,
        Err(e) => return server_error(&e),
    };
    let unauthorized = || {
        (
            axum::http::StatusCode::UNAUTHORIZED,
            axum::Json(serde_json::json!({"error": "unauthorized"})),
        )
    };

    let Some(grant) = crate::sign_in::AuthorizationGrant::select(
        query.code,
        session.and_then(|s| s.refresh_token),
    ) else {
        return unauthorized().into_response();
    };
    let outcome = match sign_in.perform(grant).await {
        Ok(o) => o,
        Err(e) if e.is_grant_rejection() => {
            tracing::warn!(err = ?e, "Grant rejected");
            let jar = jar.add(crate::session_cookie::removal_cookie(inner.secure_cookie));
            return (jar, unauthorized()).into_response();
        }
        Err(e) => return server_error(&e),
    };
    let cookie = match crate::session_cookie::SessionCookie::from_outcome(&outcome)
        .to_cookie(inner.secure_cookie)
    {
        Ok(c) => c,
        Err(e) => return server_error(&e),
    };
    (
        jar.add(cookie),
        axum::Json(crate::client::CredentialProcessResponse::from(
            &outcome.credential,
        )),
    )
        .into_response()
}

#[tracing::instrument(skip_all)]
async fn handle_userinfo<B, S>(
    axum::extract::Extension(inner): Inner<B, S>,
    bearer: crate::ext_axum::ExtractBearer,
) -> axum::response::Response
where
    B: crate::federation::FederationBackend + 'static,
    S: crate::device_store::DeviceCodeStore + 'static,
{
    use axum::response::IntoResponse;
    let sign_in = match inner.sign_in() {
        Ok(s) => s,
        Err(e) => return server_error(&e),
    };
    match sign_in
        .verify(&bearer.value, crate::id_token::TokenUse::Access)
        .await
    {
        Ok(claims) => axum::Json(claims).into_response(),
        Err(e) if e.is_grant_rejection() => {
            tracing::info!(err = ?e, source = ?bearer.source, "Rejected access token");
            (
                axum::http::StatusCode::UNAUTHORIZED,
                [(
                    axum::http::header::WWW_AUTHENTICATE,
                    "Bearer error=\"invalid_token\"",
                )],
                axum::Json(serde_json::json!({"error": "invalid_token"})),
            )
                .into_response()
        }
        Err(e) => server_error(&e),
    }
}

#[tracing::instrument(skip_all)]
async fn handle_signout<B, S>(
    axum::extract::Extension(inner): Inner<B, S>,
    crate::ext_axum::ExtractSession(jar, session): crate::ext_axum::ExtractSession,
) -> axum::response::Response
where
    B: crate::federation::FederationBackend + 'static,
    S: crate::device_store::DeviceCodeStore + 'static,
{
    use axum::response::IntoResponse;
    if let (Ok(sign_in), Some(rt)) = (inner.sign_in(), session.and_then(|s| s.refresh_token)) {
        sign_in.sign_out(&rt).await;
    }
    (
        axum::http::StatusCode::NO_CONTENT,
        jar.add(crate::session_cookie::removal_cookie(inner.secure_cookie)),
    )
        .into_response()
}

#[tracing::instrument(skip_all)]
async fn handle_device_code<B, S>(
    axum::extract::Extension(inner): Inner<B, S>,
    params: crate::ext_axum::ExtractParams,
) -> axum::response::Response
where
    B: crate::federation::FederationBackend + 'static,
    S: crate::device_store::DeviceCodeStore + 'static,
{
    use axum::response::IntoResponse;
    let flow = match inner.device_flow() {
        Ok(f) => f,
        Err(e) => return server_error(&e),
    };
    match flow.issue_codes(params.get("client_id")).await {
        Ok(r) => axum::Json(r).into_response(),
        Err(e) => oauth_error_response(e),
    }
}

#[tracing::instrument(skip_all)]
async fn handle_token<B, S>(
    axum::extract::Extension(inner): Inner<B, S>,
    params: crate::ext_axum::ExtractParams,
) -> axum::response::Response
where
    B: crate::federation::FederationBackend + 'static,
    S: crate::device_store::DeviceCodeStore + 'static,
{
    use axum::response::IntoResponse;
    let flow = match inner.device_flow() {
        Ok(f) => f,
        Err(e) => return server_error(&e),
    };
    let req = crate::device_flow::TokenRequest {
        grant_type: params.get("grant_type").map(|x| x.to_owned()),
        device_code: params.get("device_code").map(|x| x.to_owned()),
        client_id: params.get("client_id").map(|x| x.to_owned()),
    };
    match flow.poll_token(&req).await {
        Ok(r) => (
            [(axum::http::header::CACHE_CONTROL, "no-store")],
            axum::Json(r),
        )
            .into_response(),
        Err(e) => oauth_error_response(e),
    }
}

#[tracing::instrument(skip_all)]
async fn handle_activate<B, S>(
    axum::extract::Extension(inner): Inner<B, S>,
    params: crate::ext_axum::ExtractParams,
) -> axum::response::Response
where
    B: crate::federation::FederationBackend + 'static,
    S: crate::device_store::DeviceCodeStore + 'static,
{
    let flow = match inner.device_flow() {
        Ok(f) => f,
        Err(e) => return server_error(&e),
    };
    match flow.activate(params.get("user_code")).await {
        Ok(crate::device_flow::Activation::Prompt) => html(
            axum::http::StatusCode::OK,
            inner.pages.page(crate::pages::Page::Index).await,
        ),
        Ok(crate::device_flow::Activation::UnknownUserCode) => html(
            axum::http::StatusCode::OK,
            inner.pages.page(crate::pages::Page::Error).await,
        ),
        Ok(crate::device_flow::Activation::Redirect(url)) => found(&url),
        Err(e) => server_error(&e),
    }
}

#[tracing::instrument(skip_all)]
async fn handle_complete<B, S>(
    axum::extract::Extension(inner): Inner<B, S>,
    axum::extract::Query(req): axum::extract::Query<crate::device_flow::CompletionRequest>,
) -> axum::response::Response
where
    B: crate::federation::FederationBackend + 'static,
    S: crate::device_store::DeviceCodeStore + 'static,
{
    let flow = match inner.device_flow() {
        Ok(f) => f,
        Err(e) => return server_error(&e),
    };
    match flow.complete(&req).await {
        Ok(crate::device_flow::Completion::Retry(url)) => found(&url),
        Ok(crate::device_flow::Completion::Rejected) => html(
            axum::http::StatusCode::OK,
            inner.pages.page(crate::pages::Page::Error).await,
        ),
        Ok(crate::device_flow::Completion::Completed) => html(
            axum::http::StatusCode::OK,
            inner.pages.page(crate::pages::Page::Complete).await,
        ),
        Err(e) => server_error(&e),
    }
}

async fn handle_not_found() -> axum::http::StatusCode {
    axum::http::StatusCode::NOT_FOUND
}

#[tracing::instrument(skip_all)]
async fn handle_resource<B, S>(
    axum::extract::Extension(inner): Inner<B, S>,
    uri: axum::http::Uri,
) -> axum::response::Response
where
    B: crate::federation::FederationBackend + 'static,
    S: crate::device_store::DeviceCodeStore + 'static,
{
    use axum::response::IntoResponse;
    match inner.pages.resource(uri.path()).await {
        Some((mime, body)) => (
            [(axum::http::header::CONTENT_TYPE, mime)],
            body,
        )
            .into_response(),
        None => html(
            axum::http::StatusCode::NOT_FOUND,
            inner.pages.page(crate::pages::Page::Index).await,
        ),
    }
}

pub async fn bind_tcp(addr: std::net::SocketAddr) -> crate::Result<tokio::net::TcpListener> {
    let sock = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %sock.local_addr()?, "Listening TCP");
    Ok(sock)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device_store::DeviceCodeStore;
    use crate::federation::tests::{Failure, FakeBackend};
    use tower::ServiceExt; // for `oneshot`

    type TestServer = Server<FakeBackend, crate::device_store::InMemoryDeviceCodeStore>;

    fn config(federation_endpoint: Option<url::Url>) -> crate::config::Config {
        let mut config = crate::device_flow::tests::config(None);
        let mut sign_in: crate::config::SignInConfig = serde_json::from_value(serde_json::json!({
            "identity_pool_id": "us-west-2:00000000-0000-0000-0000-000000000000",
        }))
        .unwrap();
        if let Some(f) = federation_endpoint {
            sign_in.console.federation_endpoint = f;
        }
        config.sign_in = Some(sign_in);
        config
    }

    fn server(config: &crate::config::Config, backend: FakeBackend) -> TestServer {
        Server::new(
            config,
            Some(backend),
            Some(crate::device_store::InMemoryDeviceCodeStore::new()),
        )
        .unwrap()
    }

    fn default_server() -> TestServer {
        let config = config(None);
        server(&config, FakeBackend::new(&config.user_pool))
    }

    async fn spawn_federation_endpoint() -> url::Url {
        let app = axum::Router::new().route(
            "/federation",
            axum::routing::get(|| async {
                axum::Json(serde_json::json!({"SigninToken": "signintoken"}))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        url::Url::parse(&format!("http://{addr}/federation")).unwrap()
    }

    fn get(uri: &str, cookie: Option<&str>) -> axum::http::Request<axum::body::Body> {
        let mut b = axum::http::Request::builder().uri(uri);
        if let Some(c) = cookie {
            b = b.header("Cookie", c);
        }
        b.body(axum::body::Body::empty()).unwrap()
    }

    fn post_form(uri: &str, body: &str) -> axum::http::Request<axum::body::Body> {
        axum::http::Request::builder()
            .method("POST")
            .uri(uri)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(axum::body::Body::from(body.to_owned()))
            .unwrap()
    }

    async fn json_body(resp: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn text_body(resp: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn location(resp: &axum::response::Response) -> String {
        resp.headers()["location"].to_str().unwrap().to_owned()
    }

    fn session_cookie(resp: &axum::response::Response) -> String {
        resp.headers()["set-cookie"].to_str().unwrap().to_owned()
    }

    #[tokio::test]
    async fn test_signin_without_grant_redirects_to_login() {
        let resp = default_server()
            .router()
            .oneshot(get("/signin", None))
            .await
            .unwrap();
        assert_eq!(resp.status(), 302);
        assert_eq!(
            location(&resp),
            "https://example.auth.us-west-2.amazoncognito.com/login?response_type=code&client_id=clientid&redirect_uri=https%3A%2F%2Fapi.example.com%2Fsignin"
        );
    }

    #[tokio::test]
    async fn test_signin_with_code() {
        let config = config(Some(spawn_federation_endpoint().await));
        let s = server(&config, FakeBackend::new(&config.user_pool));
        let resp = s
            .router()
            .oneshot(get("/signin?code=thecode", None))
            .await
            .unwrap();
        assert_eq!(resp.status(), 302);
        let loc = url::Url::parse(&location(&resp)).unwrap();
        let q: std::collections::HashMap<_, _> = loc.query_pairs().into_owned().collect();
        assert_eq!(q["Action"], "login");
        assert_eq!(q["SigninToken"], "signintoken");
        assert_eq!(q["Issuer"], "https://api.example.com/");

        let cookie = session_cookie(&resp);
        assert!(cookie.starts_with("session="));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Secure"));
        let value = cookie
            .trim_start_matches("session=")
            .split(';')
            .next()
            .unwrap();
        let decoded = crate::session_cookie::SessionCookie::decode(value).unwrap();
        use secrecy::ExposeSecret;
        assert_eq!(decoded.refresh_token.unwrap().expose_secret(), "rt-new");
    }

    #[tokio::test]
    async fn test_signin_rejected_grant_clears_cookie() {
        let config = config(None);
        let mut backend = FakeBackend::new(&config.user_pool);
        backend.failure = Failure::RejectGrant;
        let cookie = crate::session_cookie::SessionCookie {
            refresh_token: Some("revoked".into()),
            ..Default::default()
        }
        .encode()
        .unwrap();
        let resp = server(&config, backend)
            .router()
            .oneshot(get("/signin", Some(&format!("session={cookie}"))))
            .await
            .unwrap();
        assert_eq!(resp.status(), 302);
        assert!(location(&resp).contains("/login?"));
        assert!(session_cookie(&resp).contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn test_signin_upstream_failure() {
        let config = config(None);
        let mut backend = FakeBackend::new(&config.user_pool);
        backend.failure = Failure::Upstream;
        let resp = server(&config, backend)
            .router()
            .oneshot(get("/signin?code=c", None))
            .await
            .unwrap();
        assert_eq!(resp.status(), 500);
        assert_eq!(json_body(resp).await, serde_json::json!({"error": "server_error"}));
    }

    #[tokio::test]
    async fn test_credentials() {
        let resp = default_server()
            .router()
            .oneshot(get("/credentials", None))
            .await
            .unwrap();
        assert_eq!(resp.status(), 401);

        let resp = default_server()
            .router()
            .oneshot(get("/credentials?code=c", None))
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert!(session_cookie(&resp).starts_with("session="));
        let body = json_body(resp).await;
        assert_eq!(body["Version"], 1);
        assert_eq!(body["AccessKeyId"], "ASIAWEBIDENTITY");
        assert_eq!(body["SecretAccessKey"], "secret");
    }

    #[tokio::test]
    async fn test_userinfo() {
        let config = config(None);
        let token = crate::id_token::tests::sign(&crate::id_token::tests::access_claims(
            &config.user_pool,
        ));
        let req = {
            use secrecy::ExposeSecret;
            axum::http::Request::builder()
                .uri("/userinfo")
                .header("Authorization", format!("Bearer {}", token.expose_secret()))
                .body(axum::body::Body::empty())
                .unwrap()
        };
        let resp = default_server().router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), 200);
        let body = json_body(resp).await;
        assert_eq!(body["token_use"], "access");
        assert_eq!(body["client_id"], "clientid");

        let id_token = {
            use secrecy::ExposeSecret;
            crate::id_token::tests::sign(&crate::id_token::tests::id_claims(&config.user_pool))
                .expose_secret()
                .to_owned()
        };
        let resp = default_server()
            .router()
            .oneshot(get(&format!("/userinfo?access_token={id_token}"), None))
            .await
            .unwrap();
        assert_eq!(resp.status(), 401);

        let resp = default_server()
            .router()
            .oneshot(get("/userinfo", None))
            .await
            .unwrap();
        assert_eq!(resp.status(), 401);
    }

    #[tokio::test]
    async fn test_signout() {
        let cookie = crate::session_cookie::SessionCookie {
            refresh_token: Some("rt".into()),
            ..Default::default()
        }
        .encode()
        .unwrap();
        let s = default_server();
        let req = axum::http::Request::builder()
            .method("POST")
            .uri("/signout")
            .header("Cookie", format!("session={cookie}"))
            .body(axum::body::Body::empty())
            .unwrap();
        let resp = s.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), 204);
        assert!(session_cookie(&resp).contains("Max-Age=0"));
        assert_eq!(
            s.inner.sign_in.as_ref().unwrap().backend().calls(),
            vec!["refresh:rt", "global_sign_out"]
        );

        let req = axum::http::Request::builder()
            .method("POST")
            .uri("/signout")
            .body(axum::body::Body::empty())
            .unwrap();
        let resp = default_server().router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), 204);
    }

    #[tokio::test]
    async fn test_device_code_endpoint() {
        let router = default_server().router();

        let resp = router
            .clone()
            .oneshot(post_form("/oauth/device/code", "client_id=clientid"))
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body = json_body(resp).await;
        assert_eq!(body["expires_in"], 300);
        assert_eq!(
            body["verification_uri"],
            "https://api.example.com/oauth/device/activate"
        );
        assert_eq!(body["user_code"].as_str().unwrap().len(), 9);

        let resp = router
            .clone()
            .oneshot(post_form("/oauth/device/code", ""))
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        let body = json_body(resp).await;
        assert_eq!(body["error"], "invalid_request");
        assert_eq!(
            body["error_description"],
            "The request body must contain the following parameter: 'client_id'."
        );

        let resp = router
            .clone()
            .oneshot(post_form("/oauth/device/code", "client_id=other"))
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        let body = json_body(resp).await;
        assert_eq!(body["error"], "unauthorized_client");
        assert_eq!(body["error_description"], "Unauthorized or unknown client");

        let resp = router
            .clone()
            .oneshot(get("/oauth/device/code?client_id=other", None))
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        let body = json_body(resp).await;
        assert_eq!(body["error"], "unauthorized_client");

        let resp = router
            .oneshot(get("/oauth/device/code?client_id=clientid", None))
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(json_body(resp).await["interval"], 5);
    }

    #[tokio::test]
    async fn test_token_endpoint_pending_then_once() {
        let s = default_server();
        let router = s.router();
        let body = json_body(
            router
                .clone()
                .oneshot(post_form("/oauth/device/code", "client_id=clientid"))
                .await
                .unwrap(),
        )
        .await;
        let device_code = body["device_code"].as_str().unwrap().to_owned();
        let user_code = body["user_code"].as_str().unwrap().to_owned();
        let poll = format!(
            "grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Adevice_code&device_code={device_code}&client_id=clientid"
        );

        let resp = router
            .clone()
            .oneshot(post_form("/oauth/token", &poll))
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        assert_eq!(json_body(resp).await["error"], "authorization_pending");

        let flow = s.inner.device_flow.as_ref().unwrap();
        let record = flow
            .store()
            .find_by_user_code(&user_code)
            .await
            .unwrap()
            .unwrap();
        flow.store()
            .attach_tokens(
                &record,
                &crate::device_store::DeviceTokens {
                    id_token: "idt".into(),
                    access_token: "at".into(),
                    token_type: "Bearer".to_owned(),
                    expires_in: Some(3600),
                },
            )
            .await
            .unwrap();

        let resp = router
            .clone()
            .oneshot(post_form("/oauth/token", &poll))
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(
            json_body(resp).await,
            serde_json::json!({"id_token": "idt", "access_token": "at", "token_type": "Bearer", "expires_in": 3600})
        );

        let resp = router
            .oneshot(post_form("/oauth/token", &poll))
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        let body = json_body(resp).await;
        assert_eq!(body["error"], "invalid_grant");
        assert_eq!(body["error_description"], "Invalid or expired device code.");
    }

    #[tokio::test]
    async fn test_token_endpoint_unsupported_grant_type() {
        let resp = default_server()
            .router()
            .oneshot(post_form(
                "/oauth/token",
                "grant_type=password&device_code=x&client_id=clientid",
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        assert_eq!(json_body(resp).await["error"], "unsupported_grant_type");
    }

    #[tokio::test]
    async fn test_activate() {
        let s = default_server();
        let router = s.router();

        let resp = router
            .clone()
            .oneshot(get("/oauth/device/activate", None))
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert!(text_body(resp).await.contains("name=\"user_code\""));

        let resp = router
            .clone()
            .oneshot(post_form("/oauth/device/activate", "user_code=0000-0000"))
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert!(text_body(resp).await.contains("Invalid code"));

        let body = json_body(
            router
                .clone()
                .oneshot(post_form("/oauth/device/code", "client_id=clientid"))
                .await
                .unwrap(),
        )
        .await;
        let user_code = body["user_code"].as_str().unwrap();
        let resp = router
            .oneshot(post_form(
                "/oauth/device/activate",
                &format!("user_code={user_code}"),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), 302);
        let loc = url::Url::parse(&location(&resp)).unwrap();
        assert_eq!(loc.path(), "/oauth2/authorize");
        let q: std::collections::HashMap<_, _> = loc.query_pairs().into_owned().collect();
        assert_eq!(
            crate::device_flow::decode_state(&q["state"]).as_deref(),
            Some(user_code)
        );
    }

    #[tokio::test]
    async fn test_complete_without_code_redirects_to_retry() {
        let resp = default_server()
            .router()
            .oneshot(get("/oauth/complete?state=dXNlcl9jb2RlPUFCQ0QtRUYwMQ", None))
            .await
            .unwrap();
        assert_eq!(resp.status(), 302);
        assert_eq!(
            location(&resp),
            "https://api.example.com/oauth/device/activate"
        );
    }

    #[tokio::test]
    async fn test_resources() {
        let router = default_server().router();
        let resp = router
            .clone()
            .oneshot(get("/favicon.ico", None))
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);

        let resp = router.oneshot(get("/app.js", None)).await.unwrap();
        assert_eq!(resp.status(), 404);
        assert!(text_body(resp).await.contains("Device activation"));
    }

    #[tokio::test]
    async fn test_device_only_server_has_no_signin() {
        let config = crate::device_flow::tests::config(None);
        let s: TestServer = Server::new(
            &config,
            None,
            Some(crate::device_store::InMemoryDeviceCodeStore::new()),
        )
        .unwrap();
        let resp = s.router().oneshot(get("/credentials", None)).await.unwrap();
        assert_eq!(resp.status(), 404);
    }
}
