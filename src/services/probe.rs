//! Radio association probe output parsing

use serde::Serialize;

const ESSID_FIELD: &str = "ESSID:";

/// Result of looking for the network identifier in the status tool output
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProbeMatch {
    /// No quoted identifier field in the output
    NoMatch,
    /// The field is present but quotes nothing
    Empty,
    /// The associated network
    Found(String),
}

/// Extract the quoted `ESSID:"..."` field from `iwgetid`/`iwconfig` style output
///
/// The identifier ends at the last quote of the line, so identifiers which
/// themselves contain quotes are kept whole. Unquoted values such as
/// `ESSID:off/any` are reported as [`ProbeMatch::NoMatch`].
pub fn parse_network_id(output: &str) -> ProbeMatch {
    for line in output.lines() {
        let Some(pos) = line.find(ESSID_FIELD) else {
            continue;
        };

        let Some(quoted) = line[pos + ESSID_FIELD.len()..].strip_prefix('"') else {
            continue;
        };

        let Some(end) = quoted.rfind('"') else {
            continue;
        };

        return match &quoted[..end] {
            "" => ProbeMatch::Empty,
            id => ProbeMatch::Found(id.to_string()),
        };
    }

    ProbeMatch::NoMatch
}

/// Current association of the radio, recomputed on every query
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectivityStatus {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_id: Option<String>,
}

impl ConnectivityStatus {
    pub fn disconnected() -> Self {
        Self {
            connected: false,
            network_id: None,
        }
    }
}

impl From<ProbeMatch> for ConnectivityStatus {
    fn from(probe: ProbeMatch) -> Self {
        match probe {
            ProbeMatch::Found(id) => Self {
                connected: true,
                network_id: Some(id),
            },
            ProbeMatch::NoMatch | ProbeMatch::Empty => Self::disconnected(),
        }
    }
}
