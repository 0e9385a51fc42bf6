use actix_cors::Cors;
use actix_server::ServerHandle;
use actix_web::{
    App, HttpServer,
    web::{self, Data},
};
use actix_web_static_files::ResourceFiles;
use anyhow::{Context, Result};
use env_logger::{Builder, Env, Target};
use log::{debug, error, info};
use std::io::Write;
use tokio::signal::unix::{SignalKind, signal};
use wifi_portal::{
    api::Api,
    config::AppConfig,
    services::{
        controller::{ControllerSettings, NetworkModeController},
        executor::ProcessExecutor,
    },
};

// Include the generated static files from build.rs
include!(concat!(env!("OUT_DIR"), "/generated.rs"));

#[inline(always)]
fn static_files() -> std::collections::HashMap<&'static str, static_files::Resource> {
    generate()
}

type UiApi = Api<ProcessExecutor>;

#[actix_web::main]
async fn main() {
    if let Err(e) = run().await {
        error!("application error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    initialize();

    let config = AppConfig::load().context("failed to load configuration")?;

    let mut sigterm =
        signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;

    let controller = NetworkModeController::new(
        ProcessExecutor::new(config.transition.command_timeout),
        ControllerSettings::from_config(config),
    );

    if let Some(failure) = controller.transition_failure() {
        info!("previous client transition failed: {failure}");
    }

    let mode = controller.determine_startup_mode().await;
    info!("starting in {mode:?} mode");

    let (server_handle, server_task) = run_server(controller.clone())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            debug!("ctrl-c received");
        },
        _ = sigterm.recv() => {
            debug!("SIGTERM received");
        },
        result = server_task => {
            match result {
                Ok(Ok(())) => debug!("server stopped normally"),
                Ok(Err(e)) => error!("server stopped with error: {e}"),
                Err(e) => error!("server task panicked: {e}"),
            }
        },
    }

    info!("shutting down");

    // a scheduled switch must not be cut off halfway
    controller.wait_for_scheduled_transition().await;
    server_handle.stop(true).await;

    info!("shutdown complete");
    Ok(())
}

fn initialize() {
    log_panics::init();

    let mut builder = if cfg!(debug_assertions) {
        Builder::from_env(Env::default().default_filter_or("debug"))
    } else {
        Builder::from_env(Env::default().default_filter_or("info"))
    };

    builder.format(|f, record| match record.level() {
        log::Level::Error => {
            eprintln!("{}", record.args());
            Ok(())
        }
        _ => {
            writeln!(f, "{}", record.args())
        }
    });

    builder.target(Target::Stdout).init();

    info!(
        "module version: {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_SHORT_REV")
    );
}

fn run_server(
    controller: NetworkModeController<ProcessExecutor>,
) -> Result<(
    ServerHandle,
    tokio::task::JoinHandle<Result<(), std::io::Error>>,
)> {
    let api = UiApi::new(controller);
    let ui_port = AppConfig::get().ui.port;

    let server = HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_header()
                    .allowed_methods(vec!["GET", "POST"])
                    .max_age(3600),
            )
            .app_data(Data::new(api.clone()))
            .app_data(Data::new(static_files()))
            .route("/", web::get().to(UiApi::index))
            .route("/connect", web::post().to(UiApi::connect))
            .route("/api/wifi/connect", web::post().to(UiApi::connect_portal))
            .route("/api/wifi-status", web::get().to(UiApi::wifi_status))
            .route("/api/ping", web::get().to(UiApi::ping))
            .route("/version", web::get().to(UiApi::version))
            .route("/healthcheck", web::get().to(UiApi::healthcheck))
            .route(
                "/ack-transition-failure",
                web::post().to(UiApi::ack_transition_failure),
            )
            .service(ResourceFiles::new("/static", static_files()))
            .default_service(web::route().to(UiApi::index))
    })
    .bind(format!("0.0.0.0:{ui_port}"))
    .context("failed to bind server")?
    .disable_signals()
    .run();

    info!("portal listening on port {ui_port}");

    Ok((server.handle(), tokio::spawn(server)))
}
