//! Client networking credentials file
//!
//! Renders WiFi credentials into the `wpa_supplicant.conf` format and replaces
//! the file atomically, so the client networking service never reads a
//! half-written configuration.

use serde::Deserialize;
use serde_valid::Validate;
use std::{
    fmt,
    fs::{self, Permissions},
    io::{self, Write},
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;
use thiserror::Error;

const CTRL_INTERFACE: &str = "DIR=/var/run/wpa_supplicant GROUP=netdev";
const SSID_MAX_BYTES: usize = 32;
const PASSPHRASE_MIN_LEN: usize = 8;
const PASSPHRASE_MAX_LEN: usize = 63;

/// Credentials submitted through the portal
///
/// Only lives for the duration of a connect request.
#[derive(Clone, Deserialize, Validate, PartialEq, Eq)]
pub struct WiFiCredentials {
    #[validate(min_length = 1)]
    pub ssid: String,
    #[validate(min_length = 8)]
    #[validate(max_length = 63)]
    #[serde(alias = "password")]
    pub psk: String,
}

impl WiFiCredentials {
    pub fn new(ssid: impl Into<String>, psk: impl Into<String>) -> Self {
        Self {
            ssid: ssid.into(),
            psk: psk.into(),
        }
    }
}

impl fmt::Debug for WiFiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WiFiCredentials")
            .field("ssid", &self.ssid)
            .field("psk", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} contains a character that cannot be stored in a quoted value")]
    UnsupportedCharacter { field: &'static str },

    #[error("{field} must be {min} to {max} bytes long, got {actual}")]
    InvalidLength {
        field: &'static str,
        min: usize,
        max: usize,
        actual: usize,
    },

    #[error("failed to write {path:?}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

/// Writer of the single configuration file read by the client networking service
#[derive(Clone, Debug)]
pub struct WpaSupplicantConfig {
    path: PathBuf,
    country: String,
}

impl WpaSupplicantConfig {
    pub fn new(path: impl Into<PathBuf>, country: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            country: country.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reject values `wpa_supplicant` would refuse to load
    ///
    /// Neither field may break out of its quotes. The SSID is limited to
    /// 32 bytes, the passphrase to 8..=63 printable ASCII characters.
    pub fn check(credentials: &WiFiCredentials) -> Result<(), ConfigError> {
        let ssid = &credentials.ssid;
        let psk = &credentials.psk;

        if ssid.chars().any(|c| c == '"' || c.is_control()) {
            return Err(ConfigError::UnsupportedCharacter { field: "ssid" });
        }

        if psk.chars().any(|c| c == '"' || !(c == ' ' || c.is_ascii_graphic())) {
            return Err(ConfigError::UnsupportedCharacter { field: "psk" });
        }

        if ssid.is_empty() || ssid.len() > SSID_MAX_BYTES {
            return Err(ConfigError::InvalidLength {
                field: "ssid",
                min: 1,
                max: SSID_MAX_BYTES,
                actual: ssid.len(),
            });
        }

        if !(PASSPHRASE_MIN_LEN..=PASSPHRASE_MAX_LEN).contains(&psk.len()) {
            return Err(ConfigError::InvalidLength {
                field: "psk",
                min: PASSPHRASE_MIN_LEN,
                max: PASSPHRASE_MAX_LEN,
                actual: psk.len(),
            });
        }

        Ok(())
    }

    /// Render the complete file: control interface, country and one network block
    pub fn render(&self, credentials: &WiFiCredentials) -> Result<String, ConfigError> {
        Self::check(credentials)?;

        Ok(format!(
            "ctrl_interface={CTRL_INTERFACE}\n\
             update_config=1\n\
             country={}\n\
             \n\
             network={{\n    \
                 ssid=\"{}\"\n    \
                 psk=\"{}\"\n\
             }}\n",
            self.country, credentials.ssid, credentials.psk
        ))
    }

    /// Replace the configuration file with the rendered credentials
    ///
    /// The content goes to a temporary file in the target directory first and
    /// is renamed over the old file after being synced. On any error the
    /// previous file is left untouched.
    pub fn write(&self, credentials: &WiFiCredentials) -> Result<(), ConfigError> {
        let content = self.render(credentials)?;
        let write_error = |source| ConfigError::Write {
            path: self.path.clone(),
            source,
        };

        let dir = self
            .path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or(Path::new("."));

        let mut tmp_file = NamedTempFile::new_in(dir).map_err(write_error)?;
        tmp_file
            .as_file()
            .set_permissions(Permissions::from_mode(0o600))
            .map_err(write_error)?;
        tmp_file
            .write_all(content.as_bytes())
            .map_err(write_error)?;
        tmp_file.as_file().sync_all().map_err(write_error)?;
        tmp_file
            .persist(&self.path)
            .map_err(|e| write_error(e.error))?;

        Ok(())
    }

    /// Read back the network block of the current file
    pub fn read(&self) -> Result<Option<WiFiCredentials>, ConfigError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(parse(&content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(ConfigError::Write {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

/// Parse the first `network={...}` block of a `wpa_supplicant.conf`
pub fn parse(content: &str) -> Option<WiFiCredentials> {
    let mut in_network = false;
    let mut ssid = None;
    let mut psk = None;

    for line in content.lines().map(str::trim) {
        if line == "network={" {
            in_network = true;
            continue;
        }

        if !in_network {
            continue;
        }

        if line == "}" {
            break;
        }

        let Some((key, value)) = line.split_once('=') else {
            continue;
        };

        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .map(str::to_string);

        match key {
            "ssid" => ssid = value,
            "psk" => psk = value,
            _ => {}
        }
    }

    Some(WiFiCredentials::new(ssid?, psk?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> WpaSupplicantConfig {
        WpaSupplicantConfig::new(dir.path().join("wpa_supplicant.conf"), "US")
    }

    #[test]
    fn render_writes_all_sections() {
        let dir = TempDir::new().expect("should create temp dir");
        let config = config_in(&dir);

        let content = config
            .render(&WiFiCredentials::new("HomeNet", "longpassword1"))
            .expect("should render");

        assert_eq!(
            content,
            "ctrl_interface=DIR=/var/run/wpa_supplicant GROUP=netdev\n\
             update_config=1\n\
             country=US\n\
             \n\
             network={\n    \
                 ssid=\"HomeNet\"\n    \
                 psk=\"longpassword1\"\n\
             }\n"
        );
    }

    #[test]
    fn written_file_parses_back_to_same_credentials() {
        let dir = TempDir::new().expect("should create temp dir");
        let config = config_in(&dir);

        for (ssid, psk) in [
            ("HomeNet", "longpassword1"),
            ("  spaced ssid ", "p=ss word"),
            ("Caf\u{e9} \u{1f4f6}", "back\\slash{}"),
            ("x", "8chars!!"),
            (&*"s".repeat(32), &*"p".repeat(63)),
        ] {
            let credentials = WiFiCredentials::new(ssid, psk);
            config.write(&credentials).expect("should write");

            assert_eq!(config.read().expect("should read"), Some(credentials));
        }
    }

    #[test]
    fn write_restricts_permissions() {
        let dir = TempDir::new().expect("should create temp dir");
        let config = config_in(&dir);

        config
            .write(&WiFiCredentials::new("HomeNet", "longpassword1"))
            .expect("should write");

        let mode = fs::metadata(config.path())
            .expect("should stat")
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn quotes_and_control_characters_are_rejected_without_touching_the_file() {
        let dir = TempDir::new().expect("should create temp dir");
        let config = config_in(&dir);
        let original = WiFiCredentials::new("HomeNet", "longpassword1");
        config.write(&original).expect("should write");

        for credentials in [
            WiFiCredentials::new("Home\"Net", "longpassword1"),
            WiFiCredentials::new("HomeNet", "long\npassword"),
            WiFiCredentials::new("Home\rNet", "longpassword1"),
            WiFiCredentials::new("HomeNet", "tab\there"),
        ] {
            assert!(matches!(
                config.write(&credentials),
                Err(ConfigError::UnsupportedCharacter { .. })
            ));
        }

        assert_eq!(config.read().expect("should read"), Some(original));
    }

    #[test]
    fn write_into_missing_directory_fails() {
        let dir = TempDir::new().expect("should create temp dir");
        let config =
            WpaSupplicantConfig::new(dir.path().join("missing").join("wpa.conf"), "US");

        let result = config.write(&WiFiCredentials::new("HomeNet", "longpassword1"));

        assert!(matches!(result, Err(ConfigError::Write { .. })));
        assert!(!config.path().exists());
    }

    #[test]
    fn read_of_missing_file_is_none() {
        let dir = TempDir::new().expect("should create temp dir");
        assert_eq!(config_in(&dir).read().expect("should read"), None);
    }

    #[test]
    fn parse_ignores_other_keys_and_requires_both_fields() {
        let content = "country=DE\nnetwork={\n\tssid=\"Lab\"\n\tkey_mgmt=WPA-PSK\n\tpsk=\"secret12\"\n}\n";
        assert_eq!(parse(content), Some(WiFiCredentials::new("Lab", "secret12")));

        assert_eq!(parse("network={\n    ssid=\"Lab\"\n}\n"), None);
        assert_eq!(parse("update_config=1\n"), None);
    }

    #[test]
    fn debug_output_hides_psk() {
        let debug = format!("{:?}", WiFiCredentials::new("HomeNet", "longpassword1"));

        assert!(debug.contains("HomeNet"));
        assert!(!debug.contains("longpassword1"));
    }

    #[test]
    fn validation_rejects_empty_fields() {
        assert!(WiFiCredentials::new("", "longpassword1").validate().is_err());
        assert!(WiFiCredentials::new("HomeNet", "").validate().is_err());
        assert!(WiFiCredentials::new("HomeNet", "x").validate().is_err());
        assert!(WiFiCredentials::new("HomeNet", "p".repeat(64)).validate().is_err());
        assert!(WiFiCredentials::new("HomeNet", "longpassword1").validate().is_ok());
    }

    #[test]
    fn check_enforces_ssid_and_passphrase_limits() {
        let check = |ssid: &str, psk: &str| {
            WpaSupplicantConfig::check(&WiFiCredentials::new(ssid, psk))
        };

        assert!(check(&"s".repeat(32), "longpassword1").is_ok());
        assert!(check("HomeNet", &"p".repeat(8)).is_ok());
        assert!(check("HomeNet", &"p".repeat(63)).is_ok());
        assert!(check("HomeNet", "pass word with spaces").is_ok());

        // 16 two-byte characters fill the SSID exactly
        assert!(check(&"\u{e9}".repeat(16), "longpassword1").is_ok());

        for (ssid, psk, field) in [
            ("s".repeat(33), "longpassword1".to_string(), "ssid"),
            ("\u{e9}".repeat(17), "longpassword1".to_string(), "ssid"),
            ("HomeNet".to_string(), "p".repeat(7), "psk"),
            ("HomeNet".to_string(), "p".repeat(64), "psk"),
        ] {
            match check(&ssid, &psk) {
                Err(ConfigError::InvalidLength { field: rejected, .. }) => {
                    assert_eq!(rejected, field)
                }
                other => panic!("unexpected result for {ssid:?}: {other:?}"),
            }
        }

        assert!(matches!(
            check("HomeNet", "p\u{e4}ssword123"),
            Err(ConfigError::UnsupportedCharacter { field: "psk" })
        ));
    }
}
