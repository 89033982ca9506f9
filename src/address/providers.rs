//! Address providers: Nominatim reverse geocoding and a built-in city dataset.

use super::types::{AddressSource, Placemark, ResolveError};
use crate::location::{distance_m, Coordinate};
use serde::Deserialize;
use std::time::Duration;

// ─── Built-in dataset ───────────────────────────────────────────

struct BuiltinCity {
    name: &'static str,
    region: &'static str,
    lat: f64,
    lon: f64,
    country: &'static str,
    country_code: &'static str,
}

/// How far from a city centre a coordinate may be and still get its name.
pub const BUILTIN_RADIUS_M: f64 = 25_000.0;

const BUILTIN_CITIES: &[BuiltinCity] = &[
    BuiltinCity { name: "Amsterdam", region: "North Holland", lat: 52.3676, lon: 4.9041, country: "Netherlands", country_code: "NL" },
    BuiltinCity { name: "Berlin", region: "Berlin", lat: 52.5200, lon: 13.4050, country: "Germany", country_code: "DE" },
    BuiltinCity { name: "Cairo", region: "Cairo Governorate", lat: 30.0444, lon: 31.2357, country: "Egypt", country_code: "EG" },
    BuiltinCity { name: "Chicago", region: "Illinois", lat: 41.8781, lon: -87.6298, country: "United States", country_code: "US" },
    BuiltinCity { name: "Cupertino", region: "California", lat: 37.3230, lon: -122.0322, country: "United States", country_code: "US" },
    BuiltinCity { name: "Delhi", region: "Delhi", lat: 28.6139, lon: 77.2090, country: "India", country_code: "IN" },
    BuiltinCity { name: "Dubai", region: "Dubai", lat: 25.2048, lon: 55.2708, country: "United Arab Emirates", country_code: "AE" },
    BuiltinCity { name: "Istanbul", region: "Istanbul", lat: 41.0082, lon: 28.9784, country: "Türkiye", country_code: "TR" },
    BuiltinCity { name: "Jakarta", region: "Jakarta", lat: -6.2088, lon: 106.8456, country: "Indonesia", country_code: "ID" },
    BuiltinCity { name: "Lagos", region: "Lagos", lat: 6.5244, lon: 3.3792, country: "Nigeria", country_code: "NG" },
    BuiltinCity { name: "London", region: "England", lat: 51.5074, lon: -0.1278, country: "United Kingdom", country_code: "GB" },
    BuiltinCity { name: "Los Angeles", region: "California", lat: 34.0522, lon: -118.2437, country: "United States", country_code: "US" },
    BuiltinCity { name: "Madrid", region: "Community of Madrid", lat: 40.4168, lon: -3.7038, country: "Spain", country_code: "ES" },
    BuiltinCity { name: "Mexico City", region: "Mexico City", lat: 19.4326, lon: -99.1332, country: "Mexico", country_code: "MX" },
    BuiltinCity { name: "Moscow", region: "Moscow", lat: 55.7558, lon: 37.6173, country: "Russia", country_code: "RU" },
    BuiltinCity { name: "Mumbai", region: "Maharashtra", lat: 19.0760, lon: 72.8777, country: "India", country_code: "IN" },
    BuiltinCity { name: "Nairobi", region: "Nairobi County", lat: -1.2921, lon: 36.8219, country: "Kenya", country_code: "KE" },
    BuiltinCity { name: "New York", region: "New York", lat: 40.7128, lon: -74.0060, country: "United States", country_code: "US" },
    BuiltinCity { name: "Oslo", region: "Oslo", lat: 59.9139, lon: 10.7522, country: "Norway", country_code: "NO" },
    BuiltinCity { name: "Paris", region: "Île-de-France", lat: 48.8566, lon: 2.3522, country: "France", country_code: "FR" },
    BuiltinCity { name: "Rome", region: "Lazio", lat: 41.9028, lon: 12.4964, country: "Italy", country_code: "IT" },
    BuiltinCity { name: "San Francisco", region: "California", lat: 37.7749, lon: -122.4194, country: "United States", country_code: "US" },
    BuiltinCity { name: "São Paulo", region: "São Paulo", lat: -23.5505, lon: -46.6333, country: "Brazil", country_code: "BR" },
    BuiltinCity { name: "Seoul", region: "Seoul", lat: 37.5665, lon: 126.9780, country: "South Korea", country_code: "KR" },
    BuiltinCity { name: "Stockholm", region: "Stockholm County", lat: 59.3293, lon: 18.0686, country: "Sweden", country_code: "SE" },
    BuiltinCity { name: "Sydney", region: "New South Wales", lat: -33.8688, lon: 151.2093, country: "Australia", country_code: "AU" },
    BuiltinCity { name: "Tokyo", region: "Tokyo", lat: 35.6762, lon: 139.6503, country: "Japan", country_code: "JP" },
    BuiltinCity { name: "Toronto", region: "Ontario", lat: 43.6532, lon: -79.3832, country: "Canada", country_code: "CA" },
];

/// Name the built-in city nearest to `coord`, if one lies within [`BUILTIN_RADIUS_M`].
pub fn builtin_nearest(coord: Coordinate) -> Option<Placemark> {
    BUILTIN_CITIES
        .iter()
        .map(|c| (c, distance_m(coord, Coordinate { lat: c.lat, lon: c.lon })))
        .filter(|(_, d)| *d <= BUILTIN_RADIUS_M)
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(c, _)| Placemark {
            locality: Some(c.name.to_string()),
            administrative_area: Some(c.region.to_string()),
            country: Some(c.country.to_string()),
            country_code: Some(c.country_code.to_string()),
            ..Placemark::empty(AddressSource::Builtin)
        })
}

// ─── Nominatim provider ─────────────────────────────────────────

#[derive(Deserialize, Debug, Default)]
struct NominatimAddress {
    house_number: Option<String>,
    road: Option<String>,
    pedestrian: Option<String>,
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    hamlet: Option<String>,
    state: Option<String>,
    postcode: Option<String>,
    country: Option<String>,
    country_code: Option<String>,
}

#[derive(Deserialize, Debug)]
struct NominatimReverse {
    #[serde(default)]
    address: Option<NominatimAddress>,
    #[serde(default)]
    error: Option<String>,
}

fn placemark_from_nominatim(coord: Coordinate, body: NominatimReverse) -> Result<Placemark, ResolveError> {
    if let Some(err) = body.error {
        log::debug!("Nominatim: {}", err);
        return Err(ResolveError::NotFound(coord.to_string()));
    }
    let a = body.address.unwrap_or_default();
    let placemark = Placemark {
        sub_thoroughfare: a.house_number,
        thoroughfare: a.road.or(a.pedestrian),
        locality: a.city.or(a.town).or(a.village).or(a.hamlet),
        administrative_area: a.state,
        postal_code: a.postcode,
        country: a.country,
        country_code: a.country_code.map(|cc| cc.to_uppercase()),
        source: AddressSource::Nominatim,
    };
    if placemark.is_empty() {
        return Err(ResolveError::NotFound(coord.to_string()));
    }
    Ok(placemark)
}

/// Reverse-geocode via OpenStreetMap Nominatim.
pub fn nominatim_reverse(coord: Coordinate) -> Result<Placemark, ResolveError> {
    let url = format!(
        "https://nominatim.openstreetmap.org/reverse?format=jsonv2&lat={}&lon={}&addressdetails=1",
        coord.lat, coord.lon,
    );

    let response = ureq::get(&url)
        .set("User-Agent", "MyLocations/0.1 (location-tagger)")
        .timeout(Duration::from_secs(10))
        .call()
        .map_err(|e| ResolveError::Network(e.to_string()))?;

    let body: NominatimReverse = response
        .into_json()
        .map_err(|e| ResolveError::InvalidResponse(e.to_string()))?;

    placemark_from_nominatim(coord, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_inside_city() {
        let p = builtin_nearest(Coordinate { lat: 59.3326, lon: 18.0649 }).unwrap();
        assert_eq!(p.locality.as_deref(), Some("Stockholm"));
        assert_eq!(p.country_code.as_deref(), Some("SE"));
        assert_eq!(p.source, AddressSource::Builtin);
        assert!(p.thoroughfare.is_none());
    }

    #[test]
    fn test_builtin_picks_nearest() {
        let p = builtin_nearest(Coordinate { lat: 37.3318, lon: -122.0312 }).unwrap();
        assert_eq!(p.locality.as_deref(), Some("Cupertino"));
    }

    #[test]
    fn test_builtin_out_of_range() {
        assert!(builtin_nearest(Coordinate { lat: 0.0, lon: -30.0 }).is_none());
    }

    #[test]
    fn test_nominatim_address_mapping() {
        let body: NominatimReverse = serde_json::from_str(
            r#"{
                "display_name": "1, Infinite Loop, Cupertino, Santa Clara County, California, 95014, United States",
                "address": {
                    "house_number": "1",
                    "road": "Infinite Loop",
                    "town": "Cupertino",
                    "state": "California",
                    "postcode": "95014",
                    "country": "United States",
                    "country_code": "us"
                }
            }"#,
        )
        .unwrap();
        let p = placemark_from_nominatim(Coordinate { lat: 37.33, lon: -122.03 }, body).unwrap();
        assert_eq!(p.sub_thoroughfare.as_deref(), Some("1"));
        assert_eq!(p.thoroughfare.as_deref(), Some("Infinite Loop"));
        assert_eq!(p.locality.as_deref(), Some("Cupertino"));
        assert_eq!(p.administrative_area.as_deref(), Some("California"));
        assert_eq!(p.postal_code.as_deref(), Some("95014"));
        assert_eq!(p.country_code.as_deref(), Some("US"));
        assert_eq!(p.source, AddressSource::Nominatim);
    }

    #[test]
    fn test_nominatim_error_body() {
        let body: NominatimReverse = serde_json::from_str(r#"{ "error": "Unable to geocode" }"#).unwrap();
        let err = placemark_from_nominatim(Coordinate { lat: 0.0, lon: -30.0 }, body).unwrap_err();
        assert!(matches!(err, ResolveError::NotFound(_)));
    }

    #[test]
    fn test_nominatim_empty_address() {
        let body: NominatimReverse = serde_json::from_str(r#"{ "address": {} }"#).unwrap();
        assert!(placemark_from_nominatim(Coordinate { lat: 0.0, lon: 0.0 }, body).is_err());
    }
}
