use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use clap::Parser;
use vernissage::state::AppState;
use vernissage::storage::StoreConfig;

#[derive(Parser, Debug)]
#[command(version)]
struct Cli {
    #[arg(long, default_value = "./vernissage.sqlite")]
    sqlite_path: String,

    /// S3 bucket holding the uploaded images.
    #[arg(long)]
    bucket: String,

    /// Domain the bucket is publicly served from.
    #[arg(long, default_value = "s3.amazonaws.com")]
    public_domain: String,

    #[arg(long, default_value_t = 8000)]
    port: u16,

    #[arg(long, default_value = "127.0.0.1")]
    bind_address: String,
}

#[tokio::main]
async fn main() -> Result<(), axum::BoxError> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let jwt_secret = std::env::var("JWT_SECRET")
        .map_err(|_| "JWT_SECRET environment variable is required")?;

    tokio::fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&cli.sqlite_path)
        .await?;

    let store_config = StoreConfig {
        bucket: cli.bucket,
        public_domain: cli.public_domain,
    };
    let state = AppState::new(&cli.sqlite_path, store_config, &jwt_secret).await?;
    state.db.migrate().await?;

    let addr = IpAddr::from_str(&cli.bind_address)?;
    let addr = SocketAddr::from((addr, cli.port));
    let app = vernissage::app::build(state);

    tracing::info!("Listening on {}", addr);
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
