use anyhow::{Context, Result};
use std::{env, path::PathBuf, sync::OnceLock, time::Duration};

/// Application configuration loaded and validated at startup
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Portal server configuration
    pub ui: UiConfig,

    /// Radio and credentials file configuration
    pub wifi: WifiConfig,

    /// Names of the OS services and tools driven by the controller
    pub services: ServiceConfig,

    /// Timing and recovery behavior of mode transitions
    pub transition: TransitionConfig,

    /// Path configuration
    pub paths: PathConfig,
}

#[derive(Clone, Debug)]
pub struct UiConfig {
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct WifiConfig {
    pub interface: String,
    pub country: String,
    pub wpa_supplicant_conf: PathBuf,
}

#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub service_manager: String,
    pub status_tool: String,
    pub access_point: String,
    pub dhcp_dns: String,
    pub client_network: String,
}

#[derive(Clone, Debug)]
pub struct TransitionConfig {
    pub settle_delay: Duration,
    pub command_timeout: Duration,
    pub fallback_to_ap: bool,
}

#[derive(Clone, Debug)]
pub struct PathConfig {
    pub transition_failed_marker: PathBuf,
}

impl AppConfig {
    /// Get or load the application configuration
    ///
    /// Returns a reference to the cached configuration. On first call, it loads
    /// and validates all configuration from environment variables. Subsequent
    /// calls return the cached instance.
    ///
    /// # Panics
    /// Panics if configuration loading fails. Call [`AppConfig::load`] first to
    /// report the error instead.
    pub fn get() -> &'static Self {
        Self::load().expect("failed to load application configuration")
    }

    /// Load and cache the configuration, reporting invalid environment values
    pub fn load() -> Result<&'static Self> {
        static APP_CONFIG: OnceLock<AppConfig> = OnceLock::new();

        if let Some(config) = APP_CONFIG.get() {
            return Ok(config);
        }

        let config = Self::load_internal()?;
        Ok(APP_CONFIG.get_or_init(|| config))
    }

    fn load_internal() -> Result<Self> {
        let ui = UiConfig::load()?;
        let wifi = WifiConfig::load()?;
        let services = ServiceConfig::load();
        let transition = TransitionConfig::load()?;
        let paths = PathConfig::load();

        Ok(Self {
            ui,
            wifi,
            services,
            transition,
            paths,
        })
    }
}

impl UiConfig {
    fn load() -> Result<Self> {
        let port = env::var("UI_PORT")
            .unwrap_or_else(|_| "80".to_string())
            .parse::<u16>()
            .context("failed to parse UI_PORT: invalid format")?;

        Ok(Self { port })
    }
}

impl WifiConfig {
    fn load() -> Result<Self> {
        let interface = env::var("WIFI_INTERFACE").unwrap_or_else(|_| "wlan0".to_string());
        let country = env::var("WIFI_COUNTRY").unwrap_or_else(|_| "US".to_string());

        anyhow::ensure!(
            country.len() == 2 && country.chars().all(|c| c.is_ascii_uppercase()),
            "failed to parse WIFI_COUNTRY: expected ISO 3166-1 alpha-2 code, got {country:?}"
        );

        let wpa_supplicant_conf = env::var("WPA_SUPPLICANT_CONF")
            .unwrap_or_else(|_| "/etc/wpa_supplicant/wpa_supplicant.conf".to_string())
            .into();

        Ok(Self {
            interface,
            country,
            wpa_supplicant_conf,
        })
    }
}

impl ServiceConfig {
    fn load() -> Self {
        let var = |name: &str, default: &str| env::var(name).unwrap_or_else(|_| default.to_string());

        Self {
            service_manager: var("SERVICE_MANAGER", "systemctl"),
            status_tool: var("STATUS_TOOL", "iwgetid"),
            access_point: var("AP_SERVICE", "hostapd"),
            dhcp_dns: var("DHCP_DNS_SERVICE", "dnsmasq"),
            client_network: var("CLIENT_NETWORK_SERVICE", "dhcpcd"),
        }
    }
}

impl TransitionConfig {
    fn load() -> Result<Self> {
        let settle_delay = Duration::from_secs(
            env::var("SETTLE_DELAY_SECS")
                .unwrap_or_else(|_| "3".to_string())
                .parse::<u64>()
                .context("failed to parse SETTLE_DELAY_SECS: invalid format")?,
        );

        let command_timeout = Duration::from_secs(
            env::var("COMMAND_TIMEOUT_SECS")
                .unwrap_or_else(|_| "15".to_string())
                .parse::<u64>()
                .context("failed to parse COMMAND_TIMEOUT_SECS: invalid format")?,
        );

        anyhow::ensure!(
            !command_timeout.is_zero(),
            "failed to parse COMMAND_TIMEOUT_SECS: must be greater than zero"
        );

        let fallback_to_ap = env::var("FALLBACK_TO_AP")
            .unwrap_or_else(|_| "false".to_string())
            .parse::<bool>()
            .context("failed to parse FALLBACK_TO_AP: expected true or false")?;

        Ok(Self {
            settle_delay,
            command_timeout,
            fallback_to_ap,
        })
    }
}

impl PathConfig {
    fn load() -> Self {
        // lives in /tmp, so a reboot clears it
        Self {
            transition_failed_marker: PathBuf::from("/tmp/wifi_portal_client_transition_failed"),
        }
    }
}
