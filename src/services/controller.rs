//! Network mode controller
//!
//! Owns the current [`Mode`] of the radio and is the only place that changes
//! it. Every transition runs under one transition lock, so start/stop
//! sequences of the OS services never interleave.

use crate::{
    config::AppConfig,
    services::{
        executor::{CommandExecutor, ExecError, SystemCommand},
        marker::MarkerFile,
        probe::{self, ConnectivityStatus},
        wpa_supplicant::{ConfigError, WiFiCredentials, WpaSupplicantConfig},
    },
};
use log::{debug, error, info, warn};
use serde::Serialize;
use serde_valid::Validate;
use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use thiserror::Error;
use tokio::{
    runtime::Handle,
    sync::{Mutex, watch},
    task::{self, JoinHandle},
    time::sleep,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Mode {
    /// Joined to an existing network as a station
    #[serde(rename = "ClientMode")]
    Client,
    /// Broadcasting the setup network
    #[serde(rename = "APMode")]
    AccessPoint,
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("failed to persist credentials: {0}")]
    PersistenceFailed(#[source] ConfigError),

    #[error("transition step failed: {0}")]
    ProcessFailed(#[source] ExecError),

    #[error("connectivity probe failed: {0}")]
    ProbeFailed(#[source] ExecError),

    #[error("a network mode transition is in progress")]
    TransitionInProgress,
}

impl From<ConfigError> for ControllerError {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::UnsupportedCharacter { .. } | ConfigError::InvalidLength { .. } => {
                Self::InvalidCredentials(e.to_string())
            }
            ConfigError::Write { .. } => Self::PersistenceFailed(e),
        }
    }
}

/// Acknowledgment of a credentials request, sent before the mode switch runs
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Accepted {
    pub ssid: String,
    pub settle_delay_seconds: u64,
    /// `true` if an already scheduled switch picks up these credentials
    pub coalesced: bool,
}

#[derive(Clone, Debug)]
pub struct ControllerSettings {
    pub interface: String,
    pub service_manager: String,
    pub status_tool: String,
    pub access_point_service: String,
    pub dhcp_dns_service: String,
    pub client_network_service: String,
    pub settle_delay: Duration,
    pub fallback_to_ap: bool,
    pub wpa_supplicant: WpaSupplicantConfig,
    pub transition_failed: MarkerFile,
}

impl ControllerSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            interface: config.wifi.interface.clone(),
            service_manager: config.services.service_manager.clone(),
            status_tool: config.services.status_tool.clone(),
            access_point_service: config.services.access_point.clone(),
            dhcp_dns_service: config.services.dhcp_dns.clone(),
            client_network_service: config.services.client_network.clone(),
            settle_delay: config.transition.settle_delay,
            fallback_to_ap: config.transition.fallback_to_ap,
            wpa_supplicant: WpaSupplicantConfig::new(
                &config.wifi.wpa_supplicant_conf,
                &config.wifi.country,
            ),
            transition_failed: MarkerFile::new(
                &config.paths.transition_failed_marker,
                "client transition failed",
            ),
        }
    }

    fn service(&self, action: &str, service: &str) -> SystemCommand {
        SystemCommand::new(&self.service_manager, [action, service])
    }

    fn status_probe(&self) -> SystemCommand {
        SystemCommand::new(&self.status_tool, [&self.interface])
    }

    fn access_point_sequence(&self) -> [SystemCommand; 2] {
        [
            self.service("start", &self.access_point_service),
            self.service("start", &self.dhcp_dns_service),
        ]
    }

    // the AP has to release the radio before the client service comes back
    fn client_sequence(&self) -> [SystemCommand; 3] {
        [
            self.service("stop", &self.access_point_service),
            self.service("stop", &self.dhcp_dns_service),
            self.service("restart", &self.client_network_service),
        ]
    }
}

struct Inner<E> {
    executor: E,
    settings: ControllerSettings,
    transition: Mutex<()>,
    mode: watch::Sender<Mode>,
    switch_scheduled: AtomicBool,
    scheduled: Mutex<Option<JoinHandle<()>>>,
    runtime: Handle,
}

pub struct NetworkModeController<E> {
    inner: Arc<Inner<E>>,
}

impl<E> Clone for NetworkModeController<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E> NetworkModeController<E>
where
    E: CommandExecutor + Send + Sync + 'static,
{
    /// Create a controller whose deferred transitions run on the current runtime
    ///
    /// The mode is [`Mode::AccessPoint`] until
    /// [`determine_startup_mode`](Self::determine_startup_mode) has probed the radio.
    ///
    /// # Panics
    /// Panics if called outside of a Tokio runtime.
    pub fn new(executor: E, settings: ControllerSettings) -> Self {
        let (mode, _) = watch::channel(Mode::AccessPoint);

        Self {
            inner: Arc::new(Inner {
                executor,
                settings,
                transition: Mutex::new(()),
                mode,
                switch_scheduled: AtomicBool::new(false),
                scheduled: Mutex::new(None),
                runtime: Handle::current(),
            }),
        }
    }

    pub fn mode(&self) -> Mode {
        *self.inner.mode.borrow()
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.inner.settings
    }

    /// Whether a client mode switch is waiting for its settle delay
    pub fn transition_pending(&self) -> bool {
        self.inner.switch_scheduled.load(Ordering::SeqCst)
    }

    /// Whether a transition currently holds the transition lock
    pub fn transition_running(&self) -> bool {
        self.inner.transition.try_lock().is_err()
    }

    /// Failure detail of the last client transition, until it is acknowledged
    pub fn transition_failure(&self) -> Option<String> {
        self.inner.settings.transition_failed.detail()
    }

    pub fn acknowledge_transition_failure(&self) {
        self.inner.settings.transition_failed.clear();
    }

    /// Probe the radio and settle on the mode to run in
    ///
    /// Anything but a confirmed association, a failing probe included, ends
    /// in [`Mode::AccessPoint`] with the access point services started.
    pub async fn determine_startup_mode(&self) -> Mode {
        let _guard = self.inner.transition.lock().await;

        match self.probe().await {
            Ok(ConnectivityStatus {
                connected: true,
                network_id,
            }) => {
                info!("connected to {network_id:?}, staying in client mode");
                self.inner.mode.send_replace(Mode::Client);
                return Mode::Client;
            }
            Ok(_) => info!("not connected to any network"),
            Err(e) => warn!("assuming not connected: {e}"),
        }

        if let Err(e) = self.access_point_mode_locked().await {
            error!("failed to enter access point mode: {e}");
        }

        Mode::AccessPoint
    }

    /// Query the radio association, never cached
    pub async fn query_status(&self) -> Result<ConnectivityStatus, ControllerError> {
        self.probe().await
    }

    /// Persist `credentials` and schedule the switch to client mode
    ///
    /// Returns as soon as the configuration file is written. The switch runs
    /// after the settle delay so the acknowledgment can still travel over the
    /// access point that the switch tears down.
    pub async fn apply_credentials(
        &self,
        credentials: WiFiCredentials,
    ) -> Result<Accepted, ControllerError> {
        credentials
            .validate()
            .map_err(|e| ControllerError::InvalidCredentials(e.to_string()))?;
        WpaSupplicantConfig::check(&credentials)?;

        let Ok(_guard) = self.inner.transition.try_lock() else {
            warn!("rejecting credentials for {:?}: transition in progress", credentials.ssid);
            return Err(ControllerError::TransitionInProgress);
        };

        let ssid = credentials.ssid.clone();
        let wpa_supplicant = self.inner.settings.wpa_supplicant.clone();
        let path = wpa_supplicant.path().to_path_buf();

        // fsync and rename block, keep them off the runtime workers
        task::spawn_blocking(move || wpa_supplicant.write(&credentials))
            .await
            .map_err(|e| ConfigError::Write {
                path: path.clone(),
                source: io::Error::other(e),
            })??;
        info!("credentials for {ssid:?} written to {path:?}");

        let coalesced = self.inner.switch_scheduled.swap(true, Ordering::SeqCst);

        if coalesced {
            info!("client mode switch already scheduled, it will use the new credentials");
        } else {
            self.schedule_client_mode().await;
        }

        Ok(Accepted {
            ssid,
            settle_delay_seconds: self.inner.settings.settle_delay.as_secs(),
            coalesced,
        })
    }

    /// Start the access point service, then the DHCP/DNS helper
    ///
    /// Waits for a running transition to finish first. A failing step is not
    /// retried; the services are left as the failure left them.
    pub async fn enter_ap_mode(&self) -> Result<(), ControllerError> {
        let _guard = self.inner.transition.lock().await;
        self.access_point_mode_locked().await
    }

    /// Stop the access point and the helper, then restart client networking
    pub async fn enter_client_mode(&self) -> Result<(), ControllerError> {
        let _guard = self.inner.transition.lock().await;
        self.client_mode_locked().await
    }

    /// Wait until a scheduled client mode switch has run
    pub async fn wait_for_scheduled_transition(&self) {
        let handle = self.inner.scheduled.lock().await.take();

        if let Some(handle) = handle {
            debug!("waiting for scheduled transition");
            if let Err(e) = handle.await {
                error!("scheduled transition task failed: {e}");
            }
        }
    }

    async fn schedule_client_mode(&self) {
        let controller = self.clone();
        let delay = self.inner.settings.settle_delay;

        info!("client mode switch scheduled in {}ms", delay.as_millis());

        let handle = self.inner.runtime.spawn(async move {
            sleep(delay).await;
            controller.run_scheduled_client_mode().await;
        });

        *self.inner.scheduled.lock().await = Some(handle);
    }

    async fn run_scheduled_client_mode(&self) {
        let _guard = self.inner.transition.lock().await;
        self.inner.switch_scheduled.store(false, Ordering::SeqCst);

        // nobody waits for this result anymore, the acknowledgment is long gone
        let Err(e) = self.client_mode_locked().await else {
            return;
        };

        error!("scheduled client mode transition failed: {e}");

        if self.inner.settings.fallback_to_ap {
            warn!("falling back to access point mode");
            if let Err(e) = self.access_point_mode_locked().await {
                error!("fallback to access point mode failed: {e}");
            }
        }
    }

    async fn access_point_mode_locked(&self) -> Result<(), ControllerError> {
        info!("entering access point mode");
        self.inner.mode.send_replace(Mode::AccessPoint);

        self.run_sequence(&self.inner.settings.access_point_sequence())
            .await?;

        info!("access point mode active");
        Ok(())
    }

    async fn client_mode_locked(&self) -> Result<(), ControllerError> {
        info!("entering client mode");
        let marker = &self.inner.settings.transition_failed;

        if let Err(e) = self
            .run_sequence(&self.inner.settings.client_sequence())
            .await
        {
            marker.set_or_log(&e.to_string());
            return Err(e);
        }

        self.inner.mode.send_replace(Mode::Client);
        marker.clear();

        info!("client mode active");
        Ok(())
    }

    async fn run_sequence(&self, steps: &[SystemCommand]) -> Result<(), ControllerError> {
        for step in steps {
            info!("run `{step}`");

            self.inner
                .executor
                .run(step)
                .await
                .map_err(ControllerError::ProcessFailed)?;
        }

        Ok(())
    }

    async fn probe(&self) -> Result<ConnectivityStatus, ControllerError> {
        match self.inner.executor.run(&self.inner.settings.status_probe()).await {
            Ok(output) => Ok(probe::parse_network_id(&output).into()),
            // the status tool exits nonzero while the radio is not associated
            Err(ExecError::Exit { detail, .. }) => {
                debug!("probe reports no association: {detail}");
                Ok(ConnectivityStatus::disconnected())
            }
            Err(e) => Err(ControllerError::ProbeFailed(e)),
        }
    }
}
