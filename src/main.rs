use std::path::PathBuf;

use clap::Parser;
use s7_backend::{
    api::{AppState, build_router},
    auth::JwtKeys,
    utils::init_log,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to database file
    #[arg(short, long, default_value = "./database/s7.db")]
    database: PathBuf,

    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Directory for daily-rotated log files; stdout when absent
    #[arg(short, long)]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Cli::parse();
    let _guard = init_log(args.log_dir.clone());

    let secret = std::env::var("JWT_SECRET")
        .map_err(|_| anyhow::anyhow!("JWT_SECRET must be set"))?;

    let options = SqliteConnectOptions::new()
        .filename(&args.database)
        .create_if_missing(true)
        .foreign_keys(true);
    let db = SqlitePoolOptions::new().connect_with(options).await?;
    sqlx::migrate!().run(&db).await?;

    let state = AppState {
        db,
        jwt: JwtKeys::from_secret(secret.as_bytes()),
    };
    let app = build_router(state);

    let addr = format!("{}:{}", args.host, args.port);
    tracing::info!("listening on http://{addr}");
    tracing::info!("swagger ui at http://{addr}/swagger-ui/");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
