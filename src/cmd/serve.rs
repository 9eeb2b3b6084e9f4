#[derive(clap::Args, Debug)]
pub struct ServeArgs {
    #[clap(flatten)]
    config: crate::cmd::ConfigArgs,

    /// Overrides the listen address in the configuration.
    #[arg(long)]
    listen: Option<std::net::SocketAddr>,
}

type Store = std::sync::Arc<dyn crate::device_store::DeviceCodeStore>;

#[tokio::main]
pub async fn run(args: &ServeArgs) -> Result<(), anyhow::Error> {
    let mut config = args.config.load().await?;
    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    tracing::info!(config = ?config, "Server starting");

    let backend = match config.sign_in {
        Some(ref s) => {
            Some(crate::federation::AwsFederationBackend::new(&config.user_pool, s).await)
        }
        None => None,
    };
    let store: Option<Store> = match config.device_flow {
        Some(ref d) => match d.table_name {
            Some(ref table) => Some(std::sync::Arc::new(
                crate::device_store::DynamoDbDeviceCodeStore::from_region(
                    &config.user_pool.region,
                    table,
                )
                .await,
            ) as Store),
            None => {
                tracing::warn!("device_flow.table_name is not set; device codes are kept in memory of this process");
                Some(std::sync::Arc::new(
                    crate::device_store::InMemoryDeviceCodeStore::new(),
                ) as Store)
            }
        },
        None => None,
    };

    let server = crate::server::Server::new(&config, backend, store)?;
    let listener = crate::server::bind_tcp(config.listen).await?;
    axum::serve(listener, server.router())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(_) => tracing::info!("Shutting down"),
        Err(e) => tracing::error!(err = ?e, "Failed to listen for Ctrl-C"),
    }
}
