use std::io;
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};

use todo_auth::auth::oauth::GoogleProvider;
use todo_auth::auth::TokenService;
use todo_auth::config::Config;
use todo_auth::routes;
use todo_auth::store::{IdentityStore, MemoryIdentityStore, PgIdentityStore};
use todo_auth::{AppState, AuthSettings};

fn startup_error(error: impl std::fmt::Display) -> io::Error {
    io::Error::new(io::ErrorKind::Other, error.to_string())
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = Config::from_env().map_err(startup_error)?;

    let store: Arc<dyn IdentityStore> = match &config.database_url {
        Some(url) => Arc::new(PgIdentityStore::connect(url).await.map_err(startup_error)?),
        None => {
            log::warn!("DATABASE_URL not set; identities are kept in memory only");
            Arc::new(MemoryIdentityStore::new())
        }
    };

    let mut state = AppState::new(
        store,
        TokenService::new(&config.jwt_secret, config.token_policy),
    )
    .with_settings(AuthSettings {
        app_base_url: config.app_base_url.clone(),
        require_verified_login: config.require_verified_login,
    });
    if let Some(google) = &config.google {
        state = state.with_provider(Arc::new(GoogleProvider::new(google)));
    }
    let state = web::Data::new(state);

    log::info!(
        "Starting server at {} (store: {}, providers: {:?})",
        config.server_url(),
        state.store.backend(),
        state.providers.names()
    );

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .max_age(3600),
            )
            .wrap(Logger::default())
            .configure(routes::config)
    })
    .bind((config.server_host.as_str(), config.server_port))?
    .run()
    .await
}
