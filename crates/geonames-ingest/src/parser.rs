//! Gazetteer line parser
//!
//! Lines are tab-separated with 19 columns:
//!
//! ```text
//! 0 geonameid | 1 name | 2 asciiname | 3 alternatenames | 4 latitude | 5 longitude |
//! 6 feature class | 7 feature code | 8 country code | 9 cc2 | 10 admin1 | 11 admin2 |
//! 12 admin3 | 13 admin4 | 14 population | 15 elevation | 16 dem | 17 timezone |
//! 18 modification date
//! ```
//!
//! Only the field count is validated. Numeric columns that fail to parse
//! become zero instead of rejecting the line.

use std::str::FromStr;
use tracing::debug;

use crate::error::ParseError;
use crate::models::LocationRecord;

/// Minimum number of tab-separated fields in a usable line
pub const MIN_FIELDS: usize = 19;

const FIELD_SEPARATOR: char = '\t';

/// Parse one raw dump line into a record
pub fn parse_line(line: &str) -> Result<LocationRecord, ParseError> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let fields: Vec<&str> = line.split(FIELD_SEPARATOR).collect();

    if fields.len() < MIN_FIELDS {
        return Err(ParseError::InvalidFieldCount {
            expected: MIN_FIELDS,
            found: fields.len(),
        });
    }

    Ok(LocationRecord {
        geoname_id: lenient(fields[0], "geoname_id"),
        name: fields[1].to_string(),
        ascii_name: fields[2].to_string(),
        alternate_names: fields[3].to_string(),
        latitude: lenient(fields[4], "latitude"),
        longitude: lenient(fields[5], "longitude"),
        feature_class: fields[6].to_string(),
        feature_code: fields[7].to_string(),
        country_code: fields[8].to_string(),
        admin1_code: fields[10].to_string(),
        admin2_code: fields[11].to_string(),
        population: lenient(fields[14], "population"),
        elevation: parse_elevation(fields[15]),
        timezone: fields[17].to_string(),
        modification_date: fields[18].to_string(),
    })
}

/// Parse a numeric column, substituting the zero value on failure
fn lenient<T>(raw: &str, column: &'static str) -> T
where
    T: FromStr + Default,
{
    match raw.parse() {
        Ok(value) => value,
        Err(_) => {
            if !raw.is_empty() {
                debug!(column, raw, "Unparsable numeric field, substituting zero");
            }
            T::default()
        },
    }
}

/// Empty elevation means "not recorded"; anything else follows the zero rule
fn parse_elevation(raw: &str) -> Option<i32> {
    if raw.is_empty() {
        None
    } else {
        Some(lenient(raw, "elevation"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn sample_fields() -> Vec<&'static str> {
        vec![
            "2988507",
            "Paris",
            "Paris",
            "Lutetia,Paname,Parigi",
            "48.85341",
            "2.3488",
            "P",
            "PPLC",
            "FR",
            "",
            "11",
            "75",
            "751",
            "75056",
            "2138551",
            "",
            "42",
            "Europe/Paris",
            "2024-06-05",
        ]
    }

    fn join(fields: &[&str]) -> String {
        fields.join("\t")
    }

    #[test]
    fn test_parses_full_line() {
        let record = parse_line(&join(&sample_fields())).unwrap();

        assert_eq!(record.geoname_id, 2988507);
        assert_eq!(record.name, "Paris");
        assert_eq!(record.alternate_names, "Lutetia,Paname,Parigi");
        assert!((record.latitude - 48.85341).abs() < f64::EPSILON);
        assert!((record.longitude - 2.3488).abs() < f64::EPSILON);
        assert_eq!(record.feature_class, "P");
        assert_eq!(record.feature_code, "PPLC");
        assert_eq!(record.country_code, "FR");
        assert_eq!(record.admin1_code, "11");
        assert_eq!(record.admin2_code, "75");
        assert_eq!(record.population, 2138551);
        assert_eq!(record.elevation, None);
        assert_eq!(record.timezone, "Europe/Paris");
        assert_eq!(record.modification_date, "2024-06-05");
    }

    #[test]
    fn test_parsing_is_deterministic() {
        let line = join(&sample_fields());
        assert_eq!(parse_line(&line).unwrap(), parse_line(&line).unwrap());
    }

    #[test]
    fn test_short_lines_are_rejected() {
        for count in [0usize, 1, 8, 18] {
            let fields: Vec<&str> = sample_fields().into_iter().take(count).collect();
            let err = parse_line(&join(&fields)).unwrap_err();
            // An empty string still splits into one field.
            let found = count.max(1);
            assert_eq!(err, ParseError::InvalidFieldCount { expected: 19, found });
        }
    }

    #[test]
    fn test_extra_fields_are_ignored() {
        let mut fields = sample_fields();
        fields.push("unexpected");
        assert_eq!(parse_line(&join(&fields)).unwrap().geoname_id, 2988507);
    }

    #[test]
    fn test_unparsable_numbers_become_zero() {
        let mut fields = sample_fields();
        fields[0] = "abc";
        fields[4] = "north";
        fields[5] = "";
        fields[14] = "many";
        fields[15] = "high";

        let record = parse_line(&join(&fields)).unwrap();
        assert_eq!(record.geoname_id, 0);
        assert_eq!(record.latitude, 0.0);
        assert_eq!(record.longitude, 0.0);
        assert_eq!(record.population, 0);
        assert_eq!(record.elevation, Some(0));
    }

    #[test]
    fn test_elevation_present() {
        let mut fields = sample_fields();
        fields[15] = "-28";
        assert_eq!(parse_line(&join(&fields)).unwrap().elevation, Some(-28));
    }

    #[test]
    fn test_strips_carriage_return() {
        let line = format!("{}\r", join(&sample_fields()));
        assert_eq!(parse_line(&line).unwrap().modification_date, "2024-06-05");
    }
}
