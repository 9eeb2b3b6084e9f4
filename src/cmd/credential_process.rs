#[derive(clap::Args, Debug)]
pub struct CredentialProcessArgs {
    #[clap(flatten)]
    sign_in: crate::cmd::SignInArgs,
}

#[tokio::main]
pub async fn run(args: &CredentialProcessArgs) -> Result<(), anyhow::Error> {
    let (_config, outcome) = crate::cmd::sign_in_with_refresh_token(&args.sign_in).await?;
    serde_json::to_writer(
        std::io::stdout(),
        &crate::client::CredentialProcessResponse::from(&outcome.credential),
    )?;
    Ok(())
}
