#[derive(clap::Args, Debug)]
pub struct DeviceLoginArgs {
    /// Base URL of the device authorization service.
    server_url: url::Url,

    /// User pool app client ID registered for the device flow.
    #[arg(long, env = "COGNITO_FEDERATION_CLIENT_ID")]
    client_id: String,

    #[arg(long)]
    scope: Vec<String>,
}

#[tokio::main]
pub async fn run(args: &DeviceLoginArgs) -> Result<(), anyhow::Error> {
    let client = crate::device_client::DeviceCodeClient::new(&args.server_url, &args.client_id)?;
    let flow = client.initiate(&args.scope).await?;
    tracing::debug!(flow = ?flow, "Device code issued");

    let product = env!("CARGO_PKG_NAME");
    let user_code = &flow.user_code;
    let verification_uri = &flow.verification_uri;
    let expires_at = flow.expires_at.with_timezone(&chrono::Local);
    crate::terminal::send(&indoc::formatdoc! {"
        :: {product} :: Open the following URL and enter the code to sign in :::::::
        :: {product} ::
        :: {product} ::   URL:  {verification_uri}
        :: {product} ::   Code: {user_code}
        :: {product} ::
        :: {product} :: The code expires at {expires_at}
    "})
    .await;
    if let Some(ref complete) = flow.verification_uri_complete {
        crate::terminal::send(&format!(":: {product} :: Or open {complete}")).await;
    }

    let tokens = match flow.wait().await {
        Ok(t) => t,
        Err(e) => {
            tracing::debug!(err = ?e, "Device flow failed");
            crate::terminal::send(&format!(":: {product} :: ERROR: {e}")).await;
            return Err(crate::Error::FailureButSilentlyExit.into());
        }
    };
    crate::terminal::send(&format!(":: {product} :: Signed in")).await;

    use secrecy::ExposeSecret;
    let resp = crate::device_flow::DeviceTokenResponse {
        id_token: tokens.id_token.expose_secret().to_owned(),
        access_token: tokens.access_token.expose_secret().to_owned(),
        token_type: tokens.token_type.clone(),
        expires_in: tokens.expires_in,
    };
    serde_json::to_writer(std::io::stdout(), &resp)?;
    Ok(())
}
