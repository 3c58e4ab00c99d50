//! Long-form condition text built from a data point's measurements.

use crate::types::DataPoint;

const SEPARATOR: &str = ", ";
const HUMID_DEW_POINT_F: f64 = 60.0;
const DRY_DEW_POINT_F: f64 = 35.0;
const STRONG_WIND_MPH: f64 = 25.3;
const BREEZY_MPH: f64 = 8.05;

/// Short description followed by humidity, wind and precipitation remarks.
///
/// "Humid" is only added when nothing is falling, since wet conditions make
/// the remark redundant.
pub fn long_description(point: &DataPoint) -> String {
    let mut parts = vec![point.description.clone()];

    if point.dew_point >= HUMID_DEW_POINT_F && point.precip_intensity <= 0.0 {
        parts.push("Humid".to_string());
    } else if point.dew_point <= DRY_DEW_POINT_F {
        parts.push("Dry".to_string());
    }

    if point.wind_speed > STRONG_WIND_MPH {
        parts.push("Strong Winds".to_string());
    } else if point.wind_speed > BREEZY_MPH {
        parts.push("Breezy".to_string());
    }

    if point.pop > 0 {
        parts.push(format!(
            "{}% Chance of {}",
            point.pop,
            point.precip_type.label()
        ));
    }

    parts.retain(|p| !p.is_empty());
    parts.join(SEPARATOR)
}

/// Capitalize the first letter of every word ("light rain" -> "Light Rain").
pub fn title_case(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PrecipType;

    fn point(description: &str, dew_point: f64, wind_speed: f64, pop: u8) -> DataPoint {
        DataPoint {
            description: description.to_string(),
            dew_point,
            wind_speed,
            pop,
            ..Default::default()
        }
    }

    #[test]
    fn test_plain_conditions() {
        assert_eq!(long_description(&point("Clear Sky", 50.0, 3.0, 0)), "Clear Sky");
    }

    #[test]
    fn test_humid_and_breezy() {
        assert_eq!(
            long_description(&point("Partly Cloudy", 65.0, 10.0, 0)),
            "Partly Cloudy, Humid, Breezy"
        );
    }

    #[test]
    fn test_humid_suppressed_when_precipitating() {
        let mut p = point("Light Rain", 65.0, 3.0, 80);
        p.precip_intensity = 1.2;
        assert_eq!(long_description(&p), "Light Rain, 80% Chance of Rain");
    }

    #[test]
    fn test_dry_strong_winds_snow_chance() {
        let mut p = point("Snow", 20.0, 30.0, 40);
        p.precip_type = PrecipType::Snow;
        assert_eq!(
            long_description(&p),
            "Snow, Dry, Strong Winds, 40% Chance of Snow"
        );
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("light intensity drizzle"), "Light Intensity Drizzle");
        assert_eq!(title_case(""), "");
    }
}
