use super::{mapbox::MapboxClient, Coordinate};

use crate::GenericError;

use async_trait::async_trait;
use google_maps::GoogleMapsClient;
use log::*;
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;

/// Address text to coordinates. `Ok(None)` means the provider answered but
/// found nothing; `Err` is reserved for transport failures.
#[async_trait]
pub trait GeocodingService: Send + Sync {
    async fn geocode(&self, address: &str) -> Result<Option<Coordinate>, GenericError>;
}

pub struct GoogleMapsService {
    client: GoogleMapsClient,
}

impl GoogleMapsService {
    pub fn new(token: &str) -> Result<Self, GenericError> {
        Ok(GoogleMapsService {
            client: GoogleMapsClient::try_new(token)?,
        })
    }
}

#[async_trait]
impl GeocodingService for GoogleMapsService {
    async fn geocode(&self, address: &str) -> Result<Option<Coordinate>, GenericError> {
        let response = self
            .client
            .geocoding()
            .with_address(address)
            .execute()
            .await?;
        let Some(result) = response.results.first() else {
            return Ok(None);
        };
        let location = &result.geometry.location;
        trace!("Received coordinates from Google Maps geocoding API.");
        Ok(match (location.lng.to_f64(), location.lat.to_f64()) {
            (Some(lng), Some(lat)) => Coordinate::new(lng, lat),
            _ => None,
        })
    }
}

pub struct MapboxGeocoder {
    client: MapboxClient,
}

impl MapboxGeocoder {
    pub fn new(client: MapboxClient) -> Self {
        MapboxGeocoder { client }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct PlacesResponse {
    #[serde(default)]
    pub(crate) features: Vec<PlaceFeature>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PlaceFeature {
    pub(crate) center: Option<[f64; 2]>,
}

pub(crate) fn parse_places(response: PlacesResponse) -> Option<Coordinate> {
    response
        .features
        .first()
        .and_then(|feature| feature.center)
        .and_then(Coordinate::from_pair)
}

#[async_trait]
impl GeocodingService for MapboxGeocoder {
    async fn geocode(&self, address: &str) -> Result<Option<Coordinate>, GenericError> {
        let file = format!("{address}.json");
        let response: PlacesResponse = self
            .client
            .get_json(&["geocoding", "v5", "mapbox.places", &file], &[("limit", "1")])
            .await?;
        let coordinate = parse_places(response);
        if coordinate.is_none() {
            debug!("Mapbox found no place for {address:?}");
        }
        Ok(coordinate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn google_client_builds_without_network() {
        assert!(GoogleMapsService::new("test-key").is_ok());
    }

    #[test]
    fn first_feature_center_wins() {
        let response: PlacesResponse = serde_json::from_str(
            r#"{"type":"FeatureCollection","features":[
                {"id":"address.1","center":[100.3327,5.4164]},
                {"id":"address.2","center":[101.0,3.0]}
            ]}"#,
        )
        .unwrap();
        assert_eq!(parse_places(response), Coordinate::new(100.3327, 5.4164));
    }

    #[test]
    fn empty_or_error_bodies_are_not_found() {
        let empty: PlacesResponse = serde_json::from_str(r#"{"features":[]}"#).unwrap();
        assert_eq!(parse_places(empty), None);
        let error: PlacesResponse =
            serde_json::from_str(r#"{"message":"Not Found"}"#).unwrap();
        assert_eq!(parse_places(error), None);
    }
}
