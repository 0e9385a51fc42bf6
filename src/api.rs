use crate::{
    http_response::{error_response, handle_service_result, log_error, status_code},
    services::{
        controller::{Mode, NetworkModeController},
        executor::CommandExecutor,
        wpa_supplicant::WiFiCredentials,
    },
};
use actix_web::{Either, HttpResponse, Responder, web};
use log::debug;
use serde::Serialize;
use std::collections::HashMap;

pub type StaticResources = HashMap<&'static str, static_files::Resource>;

const CONFIRMATION_HTML: &str = "<h2>WiFi saved! Switching networks...</h2>";

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WifiStatus {
    pub connected: bool,
    pub mode: Mode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_id: Option<String>,
    pub transition_failed: bool,
}

#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct HealthcheckInfo {
    pub version: &'static str,
    pub mode: Mode,
    pub transition_pending: bool,
    pub transition_running: bool,
    pub client_transition_failed: Option<String>,
}

/// Reply format of the original portal page's `/api/wifi/connect` call
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct PortalReply {
    pub success: bool,
    pub message: String,
}

#[derive(Clone)]
pub struct Api<Executor>
where
    Executor: CommandExecutor,
{
    pub controller: NetworkModeController<Executor>,
}

impl<Executor> Api<Executor>
where
    Executor: CommandExecutor + Send + Sync + 'static,
{
    pub fn new(controller: NetworkModeController<Executor>) -> Self {
        Api { controller }
    }

    pub async fn index(
        static_resources: web::Data<StaticResources>,
    ) -> actix_web::Result<HttpResponse> {
        debug!("index() called");

        let Some(index_html) = static_resources.get("index.html") else {
            return Err(actix_web::error::ErrorNotFound(
                "index.html not found in embedded resources",
            ));
        };

        Ok(HttpResponse::Ok()
            .content_type(index_html.mime_type)
            .body(index_html.data.to_vec()))
    }

    pub async fn connect(
        body: Either<web::Json<WiFiCredentials>, web::Form<WiFiCredentials>>,
        api: web::Data<Self>,
    ) -> impl Responder {
        debug!("connect() called");

        match body {
            Either::Left(web::Json(credentials)) => handle_service_result(
                api.controller.apply_credentials(credentials).await,
                "connect",
            ),
            Either::Right(web::Form(credentials)) => {
                match api.controller.apply_credentials(credentials).await {
                    Ok(_) => HttpResponse::Ok()
                        .content_type("text/html; charset=utf-8")
                        .body(CONFIRMATION_HTML),
                    Err(e) => error_response(e, "connect"),
                }
            }
        }
    }

    pub async fn connect_portal(
        body: web::Json<WiFiCredentials>,
        api: web::Data<Self>,
    ) -> impl Responder {
        debug!("connect_portal() called");

        match api.controller.apply_credentials(body.into_inner()).await {
            Ok(accepted) => HttpResponse::Ok().json(PortalReply {
                success: true,
                message: format!(
                    "Credentials saved, switching networks in {}s",
                    accepted.settle_delay_seconds
                ),
            }),
            Err(e) => {
                log_error(&e, "connect_portal");
                HttpResponse::build(status_code(&e)).json(PortalReply {
                    success: false,
                    message: e.to_string(),
                })
            }
        }
    }

    pub async fn wifi_status(api: web::Data<Self>) -> impl Responder {
        debug!("wifi_status() called");

        let controller = &api.controller;
        let result = controller.query_status().await.map(|status| WifiStatus {
            connected: status.connected,
            mode: controller.mode(),
            network_id: status.network_id,
            transition_failed: controller.transition_failure().is_some(),
        });

        handle_service_result(result, "wifi_status")
    }

    pub async fn ping() -> impl Responder {
        HttpResponse::Ok().body("pong")
    }

    pub async fn version() -> impl Responder {
        HttpResponse::Ok().body(env!("CARGO_PKG_VERSION"))
    }

    pub async fn healthcheck(api: web::Data<Self>) -> impl Responder {
        debug!("healthcheck() called");

        let controller = &api.controller;

        HttpResponse::Ok().json(HealthcheckInfo {
            version: env!("CARGO_PKG_VERSION"),
            mode: controller.mode(),
            transition_pending: controller.transition_pending(),
            transition_running: controller.transition_running(),
            client_transition_failed: controller.transition_failure(),
        })
    }

    pub async fn ack_transition_failure(api: web::Data<Self>) -> impl Responder {
        debug!("ack_transition_failure() called");
        api.controller.acknowledge_transition_failure();
        HttpResponse::Ok().finish()
    }
}
