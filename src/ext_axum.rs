/// Bearer token per [RFC 6750][], from the `Authorization` header or the `access_token` query
/// parameter. Giving both, or either one twice, is rejected.
///
/// [RFC 6750]: https://datatracker.ietf.org/doc/html/rfc6750
#[derive(Debug)]
pub(crate) struct ExtractBearer {
    pub(crate) source: BearerSource,
    pub(crate) value: secrecy::SecretString,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum BearerSource {
    Header,
    Query,
}

const ACCESS_TOKEN: &str = "access_token";

fn bearer_from_query(
    parts: &axum::http::request::Parts,
) -> Result<Option<String>, ExtractBearerRejection> {
    let Some(query) = parts.uri.query() else {
        return Ok(None);
    };
    let mut values = url::form_urlencoded::parse(query.as_bytes())
        .filter(|(k, _)| k == ACCESS_TOKEN)
        .map(|(_, v)| v.into_owned());
    match (values.next(), values.next()) {
        (None, _) => Ok(None),
        (Some(v), None) => Ok(Some(v)),
        (Some(_), Some(_)) => Err(ExtractBearerRejection::Ambiguous),
    }
}

fn bearer_from_header(
    parts: &axum::http::request::Parts,
) -> Result<Option<String>, ExtractBearerRejection> {
    use headers::Header;
    type Bearer = headers::Authorization<headers::authorization::Bearer>;

    let values: Vec<_> = parts.headers.get_all(Bearer::name()).iter().collect();
    match values.len() {
        0 => Ok(None),
        1 => Bearer::decode(&mut values.into_iter())
            .map(|b| Some(b.token().to_owned()))
            .map_err(ExtractBearerRejection::Error),
        _ => Err(ExtractBearerRejection::Ambiguous),
    }
}

impl<S> axum::extract::FromRequestParts<S> for ExtractBearer
where
    S: Send + Sync,
{
    type Rejection = ExtractBearerRejection;

    #[tracing::instrument(skip_all)]
    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        match (bearer_from_query(parts)?, bearer_from_header(parts)?) {
            (None, None) => Err(ExtractBearerRejection::Missing),
            (Some(_), Some(_)) => Err(ExtractBearerRejection::Ambiguous),
            (Some(q), None) => Ok(ExtractBearer {
                source: BearerSource::Query,
                value: q.into(),
            }),
            (None, Some(h)) => Ok(ExtractBearer {
                source: BearerSource::Header,
                value: h.into(),
            }),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum ExtractBearerRejection {
    #[error(
        "bearer token was missing, must be given through Authorization header or access_token query parameter"
    )]
    Missing,
    /// [RFC 6750 Section 2.](https://datatracker.ietf.org/doc/html/rfc6750#section-2)
    #[error("multiple bearer tokens were given")]
    Ambiguous,
    #[error(transparent)]
    Error(headers::Error),
}

impl axum::response::IntoResponse for ExtractBearerRejection {
    fn into_response(self) -> axum::response::Response {
        match self {
            ExtractBearerRejection::Missing => (
                axum::http::StatusCode::UNAUTHORIZED,
                [(axum::http::header::WWW_AUTHENTICATE, "Bearer")],
                self.to_string(),
            )
                .into_response(),
            _ => (
                axum::http::StatusCode::BAD_REQUEST,
                [(
                    axum::http::header::WWW_AUTHENTICATE,
                    "Bearer error=\"invalid_request\"",
                )],
                self.to_string(),
            )
                .into_response(),
        }
    }
}

/// Request cookies together with the session they carry, if it is well-formed.
#[derive(Debug)]
pub(crate) struct ExtractSession(
    pub(crate) axum_extra::extract::CookieJar,
    pub(crate) Option<crate::session_cookie::SessionCookie>,
);

impl<S> axum::extract::FromRequestParts<S> for ExtractSession
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        let jar = axum_extra::extract::CookieJar::from_headers(&parts.headers);
        let session = crate::session_cookie::SessionCookie::from_jar(&jar);
        Ok(ExtractSession(jar, session))
    }
}

/// `application/x-www-form-urlencoded` parameters from the query string for GET/HEAD and from the
/// body otherwise. The body is parsed whatever its content type says. First occurrence wins.
#[derive(Debug, Default)]
pub(crate) struct ExtractParams(pub(crate) std::collections::HashMap<String, String>);

impl ExtractParams {
    pub(crate) fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(|x| x.as_str())
    }

    fn parse(input: &[u8]) -> Self {
        let mut map = std::collections::HashMap::new();
        for (k, v) in url::form_urlencoded::parse(input) {
            map.entry(k.into_owned()).or_insert_with(|| v.into_owned());
        }
        ExtractParams(map)
    }
}

impl<S> axum::extract::FromRequest<S> for ExtractParams
where
    S: Send + Sync,
{
    type Rejection = axum::extract::rejection::BytesRejection;

    async fn from_request(
        req: axum::extract::Request,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        if matches!(
            *req.method(),
            axum::http::Method::GET | axum::http::Method::HEAD
        ) {
            return Ok(Self::parse(req.uri().query().unwrap_or_default().as_bytes()));
        }
        let body =
            <axum::body::Bytes as axum::extract::FromRequest<S>>::from_request(req, state).await?;
        Ok(Self::parse(&body))
    }
}
