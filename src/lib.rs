use std::fs;
use std::os::unix::prelude::PermissionsExt;
use std::sync::Arc;
use rocket::{Build, Rocket};
use rocket_okapi::openapi_get_routes;
use rocket_okapi::rapidoc::{make_rapidoc, GeneralConfig, HideShowConfig, Layout, LayoutConfig, RapiDocConfig, RenderStyle, SchemaConfig, SchemaStyle};
use rocket_okapi::settings::UrlObject;
use tracing::info;
use tracing_subscriber::EnvFilter;
use crate::api::*;
use crate::constants::{API_PORT, EASYCA_VERSION};
use crate::data::objects::AppState;
use crate::service::CaService;
use crate::settings::Settings;

pub mod db;
pub mod cert;
pub mod crypto;
pub mod settings;
pub mod data;
pub mod service;
mod helper;
pub mod constants;
mod api;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // A subscriber may already be installed by the embedding application
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn mount_api(rocket: Rocket<Build>, service: CaService) -> Rocket<Build> {
    let app_state = AppState {
        service: Arc::new(service),
    };

    rocket
        .manage(app_state)
        .mount(
            "/v1",
            openapi_get_routes![
                index,
                version,
                get_ca,
                initialize_ca,
                download_ca,
                list_requests,
                sign_request,
                submit_request,
                get_request,
                sign_stored_request,
                list_signed,
                get_signed,
                list_self_signed,
                create_self_signed
            ],
        )
}

pub async fn create_rocket() -> anyhow::Result<Rocket<Build>> {
    init_logging();
    info!("Starting EasyCA {EASYCA_VERSION}");

    let settings = Settings::load_from_file(None)?;

    let db_path = settings.db_path();
    let db_initialized = db_path.exists();
    info!("Using database at {}", db_path.display());
    let service = CaService::open(&settings)?;
    if !db_initialized {
        info!("New database. Set initial database file permissions to 0600");
        let mut perms = fs::metadata(&db_path)?.permissions();
        perms.set_mode(0o600);
        fs::set_permissions(&db_path, perms)?;
    }

    info!("Initialization complete.");

    let rocket = rocket::build()
        .configure(rocket::Config::figment().merge(("port", API_PORT)));

    Ok(mount_api(rocket, service)
        .mount(
            "/v1/docs",
            make_rapidoc(&RapiDocConfig {
                general: GeneralConfig {
                    spec_urls: vec![UrlObject::new("General", "/v1/openapi.json")],
                    ..Default::default()
                },
                layout: LayoutConfig {
                    layout: Layout::Row,
                    render_style: RenderStyle::View,
                    response_area_height: "300px".to_string(),
                },
                schema: SchemaConfig {
                    schema_style: SchemaStyle::Table,
                    ..Default::default()
                },
                hide_show: HideShowConfig {
                    allow_spec_url_load: false,
                    allow_spec_file_load: false,
                    ..Default::default()
                },
                ..Default::default()
            }),
        ))
}

/// Rocket instance on an in-memory store with default settings
pub async fn create_test_rocket() -> anyhow::Result<Rocket<Build>> {
    let service = CaService::in_memory(&Settings::default())?;
    Ok(mount_api(rocket::build(), service))
}
