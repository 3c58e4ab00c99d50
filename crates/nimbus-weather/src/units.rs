//! Unit conversions between provider units and the canonical model.

pub const MAX_VISIBILITY_M: u32 = 10_000;

pub fn inches_to_mm(inches: f64) -> f64 {
    inches * 25.4
}

pub fn feet_to_meters(feet: f64) -> f64 {
    feet * 0.3048
}

/// Visibility in metres, clamped to the range providers can report.
pub fn cap_visibility(meters: f64) -> u32 {
    if !meters.is_finite() || meters <= 0.0 {
        return 0;
    }
    (meters.round() as u32).min(MAX_VISIBILITY_M)
}

pub fn mph_to_kmh(mph: f64) -> f64 {
    mph * 1.609_344
}

pub fn fahrenheit_to_celsius(f: f64) -> f64 {
    (f - 32.0) / 1.8
}

/// Whole Kelvin, truncated toward zero.
pub fn fahrenheit_to_kelvin(f: f64) -> i32 {
    ((f - 32.0) * 5.0 / 9.0 + 273.15) as i32
}

/// Clamp a possibly fractional percentage into 0-100.
pub fn percent(value: f64) -> u8 {
    if !value.is_finite() {
        return 0;
    }
    value.round().clamp(0.0, 100.0) as u8
}

/// Bearing normalized into 0-359.
pub fn bearing(degrees: f64) -> u16 {
    if !degrees.is_finite() {
        return 0;
    }
    (degrees.round() as i64).rem_euclid(360) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precipitation_inches_to_mm() {
        assert!((inches_to_mm(1.0) - 25.4).abs() < 1e-9);
        assert!((inches_to_mm(0.02) - 0.508).abs() < 1e-9);
    }

    #[test]
    fn test_visibility_capped() {
        assert_eq!(cap_visibility(feet_to_meters(1000.0)), 305);
        assert_eq!(cap_visibility(feet_to_meters(80_000.0)), 10_000);
        assert_eq!(cap_visibility(-3.0), 0);
    }

    #[test]
    fn test_kelvin_truncates() {
        assert_eq!(fahrenheit_to_kelvin(32.0), 273);
        assert_eq!(fahrenheit_to_kelvin(212.0), 373);
        assert_eq!(fahrenheit_to_kelvin(80.0), 299);
    }

    #[test]
    fn test_percent_and_bearing() {
        assert_eq!(percent(42.4), 42);
        assert_eq!(percent(130.0), 100);
        assert_eq!(percent(f64::NAN), 0);
        assert_eq!(bearing(360.0), 0);
        assert_eq!(bearing(-90.0), 270);
    }

    #[test]
    fn test_speed_and_celsius() {
        assert!((mph_to_kmh(10.0) - 16.09344).abs() < 1e-9);
        assert!((fahrenheit_to_celsius(50.0) - 10.0).abs() < 1e-9);
    }
}
