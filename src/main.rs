#[derive(clap::Parser)]
#[clap(author, version, long_about = None)]
#[clap(about = "Cognito federated sign-in and OAuth 2.0 device authorization service")]
#[clap(propagate_version = true)]
struct Cli {
    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum LogFormat {
    Text,
    Json,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Serves the sign-in and device authorization endpoints.
    Serve(cognito_federation::cmd::serve::ServeArgs),
    /// Obtains tokens through the device authorization grant.
    DeviceLogin(cognito_federation::cmd::device_login::DeviceLoginArgs),
    /// Prints AWS credentials in the credential_process format.
    CredentialProcess(cognito_federation::cmd::credential_process::CredentialProcessArgs),
    /// Prints an AWS Management Console sign-in URL.
    ConsoleUrl(cognito_federation::cmd::console_url::ConsoleUrlArgs),
}

fn main() -> Result<std::process::ExitCode, anyhow::Error> {
    use clap::Parser;
    let cli = Cli::parse();

    enable_tracing(cli.log_format);
    let retval = match &cli.command {
        Commands::Serve(args) => cognito_federation::cmd::serve::run(args),
        Commands::DeviceLogin(args) => cognito_federation::cmd::device_login::run(args),
        Commands::CredentialProcess(args) => cognito_federation::cmd::credential_process::run(args),
        Commands::ConsoleUrl(args) => cognito_federation::cmd::console_url::run(args),
    };
    match retval {
        Ok(_) => Ok(std::process::ExitCode::SUCCESS),
        Err(e) => match e.downcast_ref::<cognito_federation::Error>() {
            Some(cognito_federation::Error::FailureButSilentlyExit) => {
                Ok(std::process::ExitCode::FAILURE)
            }
            _ => Err(e),
        },
    }
}

fn enable_tracing(format: LogFormat) {
    let filter = match std::env::var("COGNITO_FEDERATION_LOG") {
        Ok(l) => tracing_subscriber::EnvFilter::new(l),
        Err(_) => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("cognito_federation=info")),
    };

    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
