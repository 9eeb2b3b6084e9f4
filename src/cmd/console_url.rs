#[derive(clap::Args, Debug)]
pub struct ConsoleUrlArgs {
    #[clap(flatten)]
    sign_in: crate::cmd::SignInArgs,
}

#[tokio::main]
pub async fn run(args: &ConsoleUrlArgs) -> Result<(), anyhow::Error> {
    let (config, outcome) = crate::cmd::sign_in_with_refresh_token(&args.sign_in).await?;
    let Some(ref sign_in_config) = config.sign_in else {
        anyhow::bail!("sign_in is not configured");
    };
    let console = crate::console_signin::ConsoleSignIn::new(&sign_in_config.console, &config.public_url)
        .with_session_duration(sign_in_config.session_duration);
    let url = console.console_url(&outcome.credential).await?;
    println!("{url}");
    Ok(())
}
