#[macro_use]
extern crate rocket;

mod api;
mod config;
mod downloads;
mod identity;
mod models;
mod proxy;
mod scrapers;

use std::env;

use config::AppConfig;
use dotenv::dotenv;
use env_logger::Env;
use log::info;
use rocket::fs::FileServer;
use rocket::{
    figment::{
        providers::{Format, Toml},
        Figment, Profile,
    },
    Config,
};
use scrapgram::cors::CORS;

#[launch]
async fn rocket() -> _ {
    dotenv().ok();

    // Load config
    let mut figment = Figment::from(Config::default()).merge(Toml::file("App.toml").nested());

    // Merge proxies if available from environment
    if let Ok(proxies) = env::var("PROXIES") {
        figment = figment.merge(("proxies", config::parse_proxy_list(&proxies)));
    }

    figment = figment.select(Profile::from_env_or("APP_PROFILE", "default"));

    // App config
    let config = figment.extract::<AppConfig>().unwrap();

    // Initialize logger
    env_logger::init_from_env(Env::default().default_filter_or("info"));

    info!("Configuration loaded successfully");

    match &config.proxies {
        Some(proxies) if !proxies.is_empty() => {
            info!("Proxy rotation enabled with {} proxies", proxies.len())
        }
        _ => info!("Proxy rotation disabled - no proxies configured"),
    }

    // Download directory must exist before the file server mounts over it
    std::fs::create_dir_all(&config.download_dir).expect("Failed to create download directory");

    info!(
        "Starting Scrapgram API server on {}:{}",
        config.address, config.port
    );

    // Build Rocket instance
    rocket::custom(figment)
        .attach(CORS)
        .manage(config.clone())
        .mount(
            "/api/v1",
            routes![
                api::instagram::get_profile,
                api::instagram::get_posts,
                api::instagram::export_posts,
                api::instagram::get_media,
                api::instagram::preview_media,
                api::instagram::download_media,
            ],
        )
        .mount("/downloads", FileServer::from(&config.download_dir))
}
