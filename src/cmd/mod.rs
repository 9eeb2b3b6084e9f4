pub mod console_url;
pub mod credential_process;
pub mod device_login;
pub mod serve;

#[derive(clap::Args, Debug)]
pub struct ConfigArgs {
    /// JSON configuration file. Falls back to environment variables when omitted.
    #[arg(long, env = crate::config::ENV_CONFIG_PATH)]
    pub config: Option<std::path::PathBuf>,
}

impl ConfigArgs {
    pub async fn load(&self) -> crate::Result<crate::config::Config> {
        let config = match self.config {
            Some(ref path) => crate::config::Config::read_from_file(path).await?,
            None => crate::config::Config::from_env()?,
        };
        config.validate()?;
        Ok(config)
    }
}

#[derive(clap::Args, Debug)]
pub struct SignInArgs {
    #[clap(flatten)]
    pub config: ConfigArgs,

    /// Refresh token from a previous sign-in.
    #[arg(long, env = "COGNITO_FEDERATION_REFRESH_TOKEN", hide_env_values = true)]
    pub refresh_token: String,
}

/// Runs the sign-in exchange with a refresh token against the live AWS backends.
pub(crate) async fn sign_in_with_refresh_token(
    args: &SignInArgs,
) -> Result<(crate::config::Config, crate::sign_in::SignInOutcome), anyhow::Error> {
    let config = args.config.load().await?;
    let Some(ref sign_in_config) = config.sign_in else {
        anyhow::bail!("sign_in is not configured");
    };
    let backend =
        crate::federation::AwsFederationBackend::new(&config.user_pool, sign_in_config).await;
    let sign_in = crate::sign_in::SignIn::new(
        backend,
        &config.user_pool,
        sign_in_config,
        config.public_url_for("/signin")?,
    );

    let refresh_token: secrecy::SecretString = args.refresh_token.clone().into();
    let Some(grant) = crate::sign_in::AuthorizationGrant::select(None, Some(refresh_token)) else {
        anyhow::bail!("refresh token is empty");
    };
    match sign_in.perform(grant).await {
        Ok(outcome) => Ok((config, outcome)),
        Err(e) if e.is_grant_rejection() => {
            tracing::debug!(err = ?e, "Refresh token rejected");
            let product = env!("CARGO_PKG_NAME");
            let url = config.public_url_for("/signin")?;
            crate::terminal::send(&indoc::formatdoc! {"
                :: {product} :: Sign-in needed; the refresh token was rejected ({e}) :::::::
                :: {product} :: Open the following URL to sign in again
                :: {product} ::   {url}
            "})
            .await;
            Err(crate::Error::FailureButSilentlyExit.into())
        }
        Err(e) => Err(e.into()),
    }
}
