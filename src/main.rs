use std::str::FromStr;
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware::Compress, web, App, HttpServer};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::{info, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

use forum::openapi::ApiDoc;
use forum::repo::sqlite::SqliteRepo;
use forum::routes::{config, AppState};
use forum::storage::build_file_store;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env automatically only in debug builds to reduce manual setup
    // overhead; deployments set real environment variables.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Bootstrapping forum server");

    let db_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://forum.db".to_string());
    let options = SqliteConnectOptions::from_str(&db_url)
        .expect("invalid DATABASE_URL")
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .expect("Failed to open database");
    info!("Database ready at {db_url}");

    let repo = SqliteRepo::new(pool);
    repo.init_schema().await.expect("Failed to create schema");
    repo.seed_if_empty().await.expect("Failed to seed database");

    let file_store = build_file_store();
    let openapi = ApiDoc::openapi();

    let server = HttpServer::new(move || {
        // the API contract permits cross-origin requests from any origin
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(cors)
            .configure(config)
            .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()))
            .app_data(web::Data::new(AppState {
                repo: Arc::new(repo.clone()),
                file_store: file_store.clone(),
            }))
    })
    .bind(("0.0.0.0", 8000))?;

    info!("Listening on http://0.0.0.0:8000");

    server.run().await
}
