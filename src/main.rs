use actix_web::{web, App, HttpServer};
use arcana::api::middleware::BearerIdentity;
use arcana::auth::TokenAuthority;
use arcana::catalog::CardCatalog;
use arcana::cli::{commands::{Cli, Commands}, run_cli};
use arcana::config::AppConfig;
use arcana::db;
use arcana::llm::ProviderFactory;
use arcana::reading::ReadingService;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    if !matches!(cli.command, Commands::Serve) {
        if let Err(e) = run_cli(cli.command, cli.config).await {
            error!("{:#}", e);
            std::process::exit(1);
        }
        return Ok(());
    }

    info!("Starting Arcana Tarot Server...");

    let config = match AppConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let db_pool = match db::get_connection(&config.database) {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };

    let catalog = match CardCatalog::load(config.reading.catalog_path.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load card catalog: {}", e);
            std::process::exit(1);
        }
    };
    info!("Card catalog loaded with {} cards", catalog.len());

    let llm_provider = match ProviderFactory::create_default(&config) {
        Ok(p) => p,
        Err(e) => {
            error!("Failed to initialize LLM provider: {}", e);
            std::process::exit(1);
        }
    };
    info!("Using LLM provider {}", llm_provider.name());

    let service = web::Data::new(ReadingService::from_config(&config, db_pool, catalog, llm_provider));
    let authority = web::Data::new(TokenAuthority::from_config(&config.auth));

    let host = config.server.host.clone();
    let port = config.server.port;

    info!("Server listening on {}:{}", host, port);

    HttpServer::new(move || {
        App::new()
            .app_data(service.clone())
            .app_data(authority.clone())
            .wrap(BearerIdentity)
            .configure(arcana::api::routes::configure)
    })
    .bind((host, port))?
    .run()
    .await
}
