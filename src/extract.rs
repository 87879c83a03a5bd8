//! flattens a shadow snapshot into a [`Reading`].
//!
//! services are matched by id: "TRH" exactly, "VIS*" and "NIR*" by prefix,
//! and the derived metric groups "DW&SC", "Lab", "LB&BI" exactly. records for
//! anything else are ignored. when a service shows up twice the later record
//! wins for the properties it carries.

use crate::domain::{Reading, ServiceRecord, Snapshot, SpectralBands};
use crate::error::ParseError;
use serde_json::Value;

const TRH: &str = "TRH";

/// event time of the TRH record, the dedup key used by the poller
pub fn trh_event_time(snapshot: &Snapshot) -> Option<&str> {
    snapshot
        .shadow
        .iter()
        .rev()
        .find(|record| record.service_id == TRH)
        .and_then(ServiceRecord::event_time)
}

pub fn extract(snapshot: &Snapshot) -> Result<Reading, ParseError> {
    let mut reading = Reading::default();

    for record in &snapshot.shadow {
        let id = record.service_id.as_str();
        match id {
            TRH => {
                reading.temperature = number(record, &["temperature"])?;
                reading.humidity = number(record, &["humidity"])?;
                reading.timestamp = record.event_time().map(str::to_string);
            }
            "DW&SC" => {
                reading.dw = number(record, &["DW"])?;
                reading.sc = number(record, &["SC"])?;
            }
            "Lab" => {
                reading.l_star = number(record, &["L*", "L"])?;
                reading.a_star = number(record, &["a*", "a"])?;
                reading.b_star = number(record, &["b*", "b"])?;
            }
            "LB&BI" => {
                reading.lb = number(record, &["L/B", "LB"])?;
                reading.bi = number(record, &["BI"])?;
            }
            _ if id.starts_with("VIS") => {
                fill_bands(&mut reading.vis, &SpectralBands::VIS_KEYS, record)?;
            }
            _ if id.starts_with("NIR") => {
                fill_bands(&mut reading.nir, &SpectralBands::NIR_KEYS, record)?;
            }
            _ => {}
        }
    }

    Ok(reading)
}

fn fill_bands(
    bands: &mut SpectralBands,
    keys: &[&str; 6],
    record: &ServiceRecord,
) -> Result<(), ParseError> {
    for (slot, key) in bands.0.iter_mut().zip(keys) {
        if let Some(value) = number(record, &[*key])? {
            *slot = Some(value);
        }
    }
    Ok(())
}

/// first present key wins; json null counts as absent
fn number(record: &ServiceRecord, keys: &[&str]) -> Result<Option<f64>, ParseError> {
    let props = &record.reported.properties;
    let Some((key, value)) = keys
        .iter()
        .find_map(|key| props.get(*key).map(|value| (*key, value)))
    else {
        return Ok(None);
    };

    let parsed = match value {
        Value::Null => return Ok(None),
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    parsed.map(Some).ok_or_else(|| ParseError {
        service: record.service_id.clone(),
        field: key.to_string(),
        value: value.to_string(),
    })
}
