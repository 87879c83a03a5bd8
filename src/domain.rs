use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

// ==============================================================================
// snapshot - what the shadow api hands back
// ==============================================================================

/// the device's current reported state, split into named services
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Snapshot {
    #[allow(dead_code)]
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub shadow: Vec<ServiceRecord>,
}

/// one service block, e.g. "TRH" or "VIS-1"
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct ServiceRecord {
    pub service_id: String,
    #[serde(default)]
    pub reported: ReportedState,
    #[allow(dead_code)]
    #[serde(default)]
    pub version: Option<u64>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct ReportedState {
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(default)]
    pub event_time: Option<String>,
}

impl ServiceRecord {
    pub fn event_time(&self) -> Option<&str> {
        self.reported.event_time.as_deref()
    }
}

// ==============================================================================
// reading - the flattened record
// ==============================================================================

/// six spectral channels in their declared letter order.
///
/// serialized as the values that were actually reported, in letter order,
/// so a payload carrying only V, B and G comes out as a three element array.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpectralBands(pub [Option<f64>; 6]);

impl SpectralBands {
    pub const VIS_KEYS: [&'static str; 6] = ["V", "B", "G", "Y", "O", "R"];
    pub const NIR_KEYS: [&'static str; 6] = ["R", "S", "T", "U", "V", "W"];

    pub fn get(&self, index: usize) -> Option<f64> {
        self.0.get(index).copied().flatten()
    }

    pub fn present(&self) -> Vec<f64> {
        self.0.iter().flatten().copied().collect()
    }
}

impl Serialize for SpectralBands {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter().flatten())
    }
}

/// one sensor reading flattened out of a snapshot.
/// every measurement is optional; absence means the service was not reported.
#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct Reading {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub vis: SpectralBands,
    pub nir: SpectralBands,
    #[serde(rename = "DW", skip_serializing_if = "Option::is_none")]
    pub dw: Option<f64>,
    #[serde(rename = "SC", skip_serializing_if = "Option::is_none")]
    pub sc: Option<f64>,
    #[serde(rename = "L", skip_serializing_if = "Option::is_none")]
    pub l_star: Option<f64>,
    #[serde(rename = "a", skip_serializing_if = "Option::is_none")]
    pub a_star: Option<f64>,
    #[serde(rename = "b", skip_serializing_if = "Option::is_none")]
    pub b_star: Option<f64>,
    #[serde(rename = "LB", skip_serializing_if = "Option::is_none")]
    pub lb: Option<f64>,
    #[serde(rename = "BI", skip_serializing_if = "Option::is_none")]
    pub bi: Option<f64>,
}

// ==============================================================================
// history rows
// ==============================================================================

/// temperature/humidity row for the time-window history view
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct RecentRow {
    pub timestamp: String,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
}

/// thinned chart point for the L/B and BI history view
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ChartPoint {
    pub timestamp: String,
    #[serde(rename = "LB")]
    pub lb: Option<f64>,
    #[serde(rename = "BI")]
    pub bi: Option<f64>,
    pub id: i64,
}
