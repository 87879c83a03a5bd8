use crate::domain::Snapshot;
use crate::error::FetchError;
use crate::shadow::ShadowSource;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Mutex;

/// hands out queued fetch results in order; an empty queue is a fetch error
#[derive(Default)]
pub struct CannedShadow {
    queue: Mutex<VecDeque<Result<Snapshot, FetchError>>>,
}

impl CannedShadow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, result: Result<Snapshot, FetchError>) {
        self.queue.lock().unwrap().push_back(result);
    }

    pub fn push_snapshot(&self, snapshot: Snapshot) {
        self.push(Ok(snapshot));
    }

    pub fn push_failure(&self) {
        self.push(Err(FetchError::Status {
            status: 503,
            body: "service unavailable".to_string(),
        }));
    }
}

impl ShadowSource for CannedShadow {
    async fn fetch(&self) -> Result<Snapshot, FetchError> {
        self.queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(FetchError::MissingCredentials))
    }
}

/// TRH + VIS-1 snapshot with the given event time
pub fn trh_snapshot(event_time: Option<&str>, temperature: f64, humidity: f64) -> Snapshot {
    serde_json::from_value(json!({
        "device_id": "dev_potato",
        "shadow": [
            {
                "service_id": "TRH",
                "reported": {
                    "properties": { "temperature": temperature, "humidity": humidity },
                    "event_time": event_time
                }
            },
            {
                "service_id": "VIS-1",
                "reported": { "properties": { "V": 1, "B": 2, "G": 3 } }
            },
            {
                "service_id": "LB&BI",
                "reported": { "properties": { "L/B": 2.5, "BI": 40.0 } }
            }
        ]
    }))
    .unwrap()
}
