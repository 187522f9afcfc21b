use std::fmt::{Display, Write};

use crate::matchers::CandidateAlert;

fn or_na<T: Display>(value: Option<T>) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| v.to_string())
}

/// Plain-text body shared by every alert class
pub fn build_alert_message(alert: &CandidateAlert) -> String {
    let s = &alert.snapshot;
    let mut body = String::new();

    // Writing to a String cannot fail
    let _ = writeln!(body, "{} Alert!", alert.class.title());
    let _ = writeln!(body, "Hex: {}", alert.hex);
    let _ = writeln!(body, "{}", alert.detail);
    let _ = writeln!(body, "Flight: {}", or_na(s.flight.as_deref()));
    let _ = writeln!(body, "Altitude: {} ft", or_na(s.altitude));
    let _ = writeln!(body, "Ground Speed: {} knots", or_na(s.ground_speed));
    let _ = writeln!(body, "Track: {}", or_na(s.track));
    let _ = writeln!(body, "Latitude: {}", or_na(s.latitude));
    let _ = write!(body, "Longitude: {}", or_na(s.longitude));

    if let Some(context) = &alert.context {
        let _ = write!(
            body,
            "\n\nOperator: {}\nType: {}\nImage: {}",
            or_na(context.operator.as_deref()),
            or_na(context.aircraft_type.as_deref()),
            or_na(context.image_link.as_deref()),
        );
    }

    body
}
