//! Moon rise, set and phase.
//!
//! Low-precision ephemeris (a few minutes of error), good enough for a
//! forecast card. Based on the approximations in "Astronomy Answers" by
//! Aphelion and the formulae popularised by SunCalc.

use chrono::{DateTime, Utc};
use std::f64::consts::PI;

const RAD: f64 = PI / 180.0;
const SECONDS_PER_DAY: f64 = 86_400.0;
const J1970: f64 = 2_440_588.0;
const J2000: f64 = 2_451_545.0;
/// Obliquity of the ecliptic
const OBLIQUITY: f64 = RAD * 23.4397;
const SUN_DISTANCE_KM: f64 = 149_598_000.0;
/// Apparent radius of the moon plus refraction at the horizon
const MOON_HORIZON: f64 = 0.133 * RAD;

#[derive(Debug, Clone, Copy, PartialEq)]
struct EquatorialPosition {
    right_ascension: f64,
    declination: f64,
    distance_km: f64,
}

/// Rise and set within the 24 hours following a start instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MoonTimes {
    pub rise: Option<i64>,
    pub set: Option<i64>,
}

fn days_since_j2000(epoch_secs: f64) -> f64 {
    epoch_secs / SECONDS_PER_DAY - 0.5 + J1970 - J2000
}

fn right_ascension(l: f64, b: f64) -> f64 {
    (l.sin() * OBLIQUITY.cos() - b.tan() * OBLIQUITY.sin()).atan2(l.cos())
}

fn declination(l: f64, b: f64) -> f64 {
    (b.sin() * OBLIQUITY.cos() + b.cos() * OBLIQUITY.sin() * l.sin()).asin()
}

fn sidereal_time(d: f64, lw: f64) -> f64 {
    RAD * (280.16 + 360.985_623_5 * d) - lw
}

fn altitude(hour_angle: f64, phi: f64, dec: f64) -> f64 {
    (phi.sin() * dec.sin() + phi.cos() * dec.cos() * hour_angle.cos()).asin()
}

fn refraction(h: f64) -> f64 {
    let h = h.max(0.0);
    0.000_296_7 / (h + 0.003_125_36 / (h + 0.089_011_79)).tan()
}

fn sun_coords(d: f64) -> EquatorialPosition {
    let m = RAD * (357.5291 + 0.985_600_28 * d);
    let center = RAD * (1.9148 * m.sin() + 0.02 * (2.0 * m).sin() + 0.0003 * (3.0 * m).sin());
    let perihelion = RAD * 102.9372;
    let l = m + center + perihelion + PI;
    EquatorialPosition {
        right_ascension: right_ascension(l, 0.0),
        declination: declination(l, 0.0),
        distance_km: SUN_DISTANCE_KM,
    }
}

fn moon_coords(d: f64) -> EquatorialPosition {
    let mean_longitude = RAD * (218.316 + 13.176_396 * d);
    let mean_anomaly = RAD * (134.963 + 13.064_993 * d);
    let mean_distance = RAD * (93.272 + 13.229_350 * d);

    let l = mean_longitude + RAD * 6.289 * mean_anomaly.sin();
    let b = RAD * 5.128 * mean_distance.sin();
    EquatorialPosition {
        right_ascension: right_ascension(l, b),
        declination: declination(l, b),
        distance_km: 385_001.0 - 20_905.0 * mean_anomaly.cos(),
    }
}

/// Apparent altitude of the moon (radians) at an instant.
fn moon_altitude(epoch_secs: f64, latitude: f64, longitude: f64) -> f64 {
    let lw = RAD * -longitude;
    let phi = RAD * latitude;
    let d = days_since_j2000(epoch_secs);
    let c = moon_coords(d);
    let h = altitude(sidereal_time(d, lw) - c.right_ascension, phi, c.declination);
    h + refraction(h)
}

/// Moon rise and set in the 24 hours starting at `day_start`.
///
/// Samples the altitude every two hours and fits a parabola through each
/// triple to find horizon crossings. Either event may be absent on a given
/// day; at high latitudes both can be.
pub fn moon_times(day_start: DateTime<Utc>, latitude: f64, longitude: f64) -> MoonTimes {
    let t0 = day_start.timestamp() as f64;
    let alt_at = |hours: f64| moon_altitude(t0 + hours * 3600.0, latitude, longitude) - MOON_HORIZON;

    let mut rise: Option<f64> = None;
    let mut set: Option<f64> = None;
    let mut h0 = alt_at(0.0);

    let mut i = 1.0;
    while i <= 24.0 {
        let h1 = alt_at(i);
        let h2 = alt_at(i + 1.0);

        let a = (h0 + h2) / 2.0 - h1;
        let b = (h2 - h0) / 2.0;
        let xe = -b / (2.0 * a);
        let ye = (a * xe + b) * xe + h1;
        let discriminant = b * b - 4.0 * a * h1;

        let mut roots = 0;
        let mut x1 = 0.0;
        let mut x2 = 0.0;
        if discriminant >= 0.0 && a != 0.0 {
            let dx = discriminant.sqrt() / (a.abs() * 2.0);
            x1 = xe - dx;
            x2 = xe + dx;
            if x1.abs() <= 1.0 {
                roots += 1;
            }
            if x2.abs() <= 1.0 {
                roots += 1;
            }
            if x1 < -1.0 {
                x1 = x2;
            }
        }

        if roots == 1 {
            if h0 < 0.0 {
                rise = Some(i + x1);
            } else {
                set = Some(i + x1);
            }
        } else if roots == 2 {
            rise = Some(i + if ye < 0.0 { x2 } else { x1 });
            set = Some(i + if ye < 0.0 { x1 } else { x2 });
        }

        if rise.is_some() && set.is_some() {
            break;
        }

        h0 = h2;
        i += 2.0;
    }

    let to_epoch = |hours: f64| (t0 + hours * 3600.0).round() as i64;
    MoonTimes {
        rise: rise.map(to_epoch),
        set: set.map(to_epoch),
    }
}

/// Lunation fraction at an instant: 0 new, 0.25 first quarter, 0.5 full,
/// 0.75 last quarter.
pub fn moon_phase(at: DateTime<Utc>) -> f64 {
    let d = days_since_j2000(at.timestamp() as f64);
    let s = sun_coords(d);
    let m = moon_coords(d);

    let elongation = (s.declination.sin() * m.declination.sin()
        + s.declination.cos() * m.declination.cos() * (s.right_ascension - m.right_ascension).cos())
    .acos();
    let inclination = (s.distance_km * elongation.sin())
        .atan2(m.distance_km - s.distance_km * elongation.cos());
    let angle = (s.declination.cos() * (s.right_ascension - m.right_ascension).sin()).atan2(
        s.declination.sin() * m.declination.cos()
            - s.declination.cos() * m.declination.sin() * (s.right_ascension - m.right_ascension).cos(),
    );

    let sign = if angle < 0.0 { -1.0 } else { 1.0 };
    (0.5 + 0.5 * inclination * sign / PI).rem_euclid(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn phase_distance(a: f64, b: f64) -> f64 {
        let d = (a - b).abs();
        d.min(1.0 - d)
    }

    #[test]
    fn test_known_full_moon() {
        // Full moon: 2024-01-25 17:54 UTC
        let at = Utc.with_ymd_and_hms(2024, 1, 25, 18, 0, 0).unwrap();
        assert!(phase_distance(moon_phase(at), 0.5) < 0.03, "{}", moon_phase(at));
    }

    #[test]
    fn test_known_new_moon() {
        // New moon: 2024-02-09 22:59 UTC
        let at = Utc.with_ymd_and_hms(2024, 2, 9, 23, 0, 0).unwrap();
        assert!(phase_distance(moon_phase(at), 0.0) < 0.03, "{}", moon_phase(at));
    }

    #[test]
    fn test_phase_waxes_after_new_moon() {
        let at = Utc.with_ymd_and_hms(2024, 2, 16, 15, 0, 0).unwrap();
        let phase = moon_phase(at);
        assert!((0.15..0.35).contains(&phase), "{phase}");
    }

    #[test]
    fn test_moon_times_within_day() {
        // Atlanta, local midnight EST
        let start = Utc.with_ymd_and_hms(2024, 1, 25, 5, 0, 0).unwrap();
        let times = moon_times(start, 33.749, -84.388);
        let begin = start.timestamp();
        let end = begin + 86_400;
        assert!(times.rise.is_some() || times.set.is_some());
        for t in [times.rise, times.set].into_iter().flatten() {
            assert!((begin..=end + 3600).contains(&t), "{t}");
        }
    }

    #[test]
    fn test_full_moon_rises_near_sunset() {
        // On the day of a full moon the moon rises in the evening, local time.
        let start = Utc.with_ymd_and_hms(2024, 1, 25, 5, 0, 0).unwrap();
        let times = moon_times(start, 33.749, -84.388);
        let rise = times.rise.unwrap();
        let hours_after_midnight = (rise - start.timestamp()) as f64 / 3600.0;
        assert!((15.0..21.0).contains(&hours_after_midnight), "{hours_after_midnight}");
    }
}
