use chrono::NaiveDateTime;
use serde::Serialize;

/// Identifier returned by the sink for a written event.
pub type EventId = u64;

/// Free-form name/value carried on an event row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdditionalData {
    pub name: String,
    pub value: String,
}

/// One decoded tracker event.
///
/// `Option` fields are range-checked; `None` is written as a null.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackerEvent {
    pub tracker_id: String,
    pub tag: &'static str,
    pub sequence: i32,
    pub timestamp: NaiveDateTime,
    pub driver_id: Option<String>,
    pub creation_code: Option<i16>,
    pub latitude: f64,
    pub longitude: f64,
    pub heading: Option<i16>,
    pub speed: Option<i16>,
    pub altitude: Option<i16>,
    pub satellites: Option<u8>,
    pub signal_strength: Option<u8>,
    pub system_status: Option<u8>,
    pub battery_level: Option<u8>,
    pub external_voltage: Option<u8>,
    pub digitals: Option<u8>,
    pub analogs: [i16; 6],
    pub odometer_gps: i32,
    pub odometer_road: i32,
    pub odometer_dash: i32,
    pub trip_distance: i32,
    pub max_speed: Option<i16>,
    pub fuel_level: Option<u8>,
    pub tacho_status: Option<u8>,
    pub can_status: Option<u8>,
    pub hardware_status: Option<u8>,
    pub additional: Option<AdditionalData>,
}

impl TrackerEvent {
    /// An event with only the record header filled in.
    pub fn new(
        tracker_id: impl Into<String>,
        tag: &'static str,
        sequence: i32,
        timestamp: NaiveDateTime,
    ) -> Self {
        Self {
            tracker_id: tracker_id.into(),
            tag,
            sequence,
            timestamp,
            driver_id: None,
            creation_code: None,
            latitude: 0.0,
            longitude: 0.0,
            heading: None,
            speed: None,
            altitude: None,
            satellites: None,
            signal_strength: None,
            system_status: None,
            battery_level: None,
            external_voltage: None,
            digitals: None,
            analogs: [0; 6],
            odometer_gps: 0,
            odometer_road: 0,
            odometer_dash: 0,
            trip_distance: 0,
            max_speed: None,
            fuel_level: None,
            tacho_status: None,
            can_status: None,
            hardware_status: None,
            additional: None,
        }
    }
}

/// A named value attached to a previously written event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventData {
    pub tracker_id: String,
    pub driver_id: Option<String>,
    pub timestamp: NaiveDateTime,
    pub name: String,
    pub text: Option<String>,
    pub int_value: Option<i32>,
    pub float_value: Option<f64>,
    pub flag: Option<bool>,
    pub creation_code: Option<i16>,
}

impl EventData {
    /// A data row for `event` with no values set.
    pub fn for_event(event: &TrackerEvent, name: impl Into<String>) -> Self {
        Self {
            tracker_id: event.tracker_id.clone(),
            driver_id: event.driver_id.clone(),
            timestamp: event.timestamp,
            name: name.into(),
            text: None,
            int_value: None,
            float_value: None,
            flag: None,
            creation_code: event.creation_code,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_int(mut self, value: i32) -> Self {
        self.int_value = Some(value);
        self
    }

    pub fn with_float(mut self, value: f64) -> Self {
        self.float_value = Some(value);
        self
    }
}

/// Parse pipeline statistics written on every cleanup sweep.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseLog {
    pub port: u16,
    pub listener_name: String,
    pub logged_at: NaiveDateTime,
    /// Frames waiting in the incoming collection.
    pub raw: usize,
    /// Frames in flight.
    pub parsing: usize,
    /// Frames processed by the last pass.
    pub parse_index: usize,
    pub prev_duration_secs: u64,
    pub prev_avg_ms: f64,
}
