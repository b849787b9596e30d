use actix_web::{middleware::Compress, middleware::NormalizePath, App, HttpServer};
use actix_cors::Cors;
use utoipa_swagger_ui::SwaggerUi;

use passreg::config::AppConfig;
use passreg::openapi::ApiDoc;
use passreg::routes::{config as routes_config, AppState};
use passreg::storage::build_photo_store;

use std::sync::Arc;
use tracing::{info, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Environment variables must be set externally (shell, systemd, Docker...).
    // Load .env automatically only in debug builds to reduce manual setup.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let cfg = match AppConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("configuration error: {e:#}");
            std::process::exit(1);
        }
    };

    info!("Bootstrapping passreg server");
    info!("Upload directory: {}", cfg.upload_dir.display());

    #[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
    let repo: Arc<dyn passreg::repo::Repo> = {
        info!("Using in-memory repository backend");
        Arc::new(passreg::repo::inmem::InMemRepo::new(&cfg.data_dir))
    };

    #[cfg(feature = "postgres-store")]
    let repo: Arc<dyn passreg::repo::Repo> = {
        use sqlx::postgres::PgPoolOptions;
        let db_url = cfg
            .database_url
            .clone()
            .expect("DATABASE_URL must be set for postgres-store");
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await
            .expect("Failed to create Pg pool");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run migrations");
        info!("Using Postgres repository backend");
        Arc::new(passreg::repo::pg::PgRepo::new(pool))
    };

    let photo_store = match build_photo_store(&cfg.upload_dir, cfg.s3.as_ref()).await {
        Ok(store) => store,
        Err(e) => {
            eprintln!("photo storage init failed: {e:#}");
            std::process::exit(1);
        }
    };

    let openapi = ApiDoc::openapi();
    let state = AppState::new(repo, photo_store);
    let bind = cfg.bind.clone();

    let server = HttpServer::new(move || {
        let cors = {
            let mut c = Cors::default()
                .allowed_origin("http://localhost:5173")
                .allowed_origin("http://127.0.0.1:5173")
                .allow_any_header()
                .allowed_methods(["GET", "POST", "PATCH", "OPTIONS"])
                .supports_credentials()
                .max_age(3600);
            if let Some(front) = cfg.frontend_url.as_deref() {
                c = c.allowed_origin(front);
            }
            c
        };

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(NormalizePath::trim())
            .wrap(cors)
            .configure(routes_config)
            .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()))
            .app_data(actix_web::web::Data::new(state.clone()))
    })
    .bind(&bind)?;

    info!("Listening on http://{bind}");

    server.run().await
}
