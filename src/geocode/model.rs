use anyhow::{Context, Result};
use serde::Deserialize;

use crate::model::Coordinates;

/// One entry of a Nominatim `/search?format=json` response. Coordinates come
/// back as decimal strings.
#[derive(Deserialize, Debug)]
pub struct SearchHit {
    pub lat: String,
    pub lon: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl SearchHit {
    pub fn coordinates(&self) -> Result<Coordinates> {
        let latitude = self
            .lat
            .parse::<f64>()
            .with_context(|| format!("invalid latitude '{}'", self.lat))?;
        let longitude = self
            .lon
            .parse::<f64>()
            .with_context(|| format!("invalid longitude '{}'", self.lon))?;
        Ok(Coordinates {
            latitude,
            longitude,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_string_encoded_coordinates() {
        let raw = r#"[{"place_id":1,"lat":"-23.5613","lon":"-46.6565","display_name":"Avenida Paulista"}]"#;
        let hits: Vec<SearchHit> = serde_json::from_str(raw).unwrap();
        let c = hits[0].coordinates().unwrap();
        assert!((c.latitude + 23.5613).abs() < 1e-9);
        assert!((c.longitude + 46.6565).abs() < 1e-9);
    }

    #[test]
    fn empty_response_has_no_candidates() {
        let hits: Vec<SearchHit> = serde_json::from_str("[]").unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn garbage_coordinates_are_errors() {
        let hit = SearchHit {
            lat: "north".into(),
            lon: "0".into(),
            display_name: None,
        };
        assert!(hit.coordinates().is_err());
    }
}
