use async_trait::async_trait;
use geo::{LineString, Polygon};
use serde::Deserialize;

use super::{mapbox::MapboxClient, Coordinate, TravelMode};
use crate::GenericError;

/// Area reachable from a point within a number of minutes.
#[async_trait]
pub trait IsochroneService: Send + Sync {
    async fn isochrone(
        &self,
        center: Coordinate,
        minutes: u32,
        mode: TravelMode,
    ) -> Result<Option<Polygon<f64>>, GenericError>;
}

pub struct MapboxIsochrone {
    client: MapboxClient,
}

impl MapboxIsochrone {
    pub fn new(client: MapboxClient) -> Self {
        MapboxIsochrone { client }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct IsochroneResponse {
    #[serde(default)]
    pub(crate) features: Vec<IsochroneFeature>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct IsochroneFeature {
    pub(crate) geometry: PolygonGeometry,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PolygonGeometry {
    #[serde(rename = "type")]
    pub(crate) kind: String,
    pub(crate) coordinates: Vec<Vec<[f64; 2]>>,
}

/// First polygon contour; the exterior ring plus any holes.
pub(crate) fn parse_isochrone(response: IsochroneResponse) -> Option<Polygon<f64>> {
    let geometry = response
        .features
        .into_iter()
        .map(|feature| feature.geometry)
        .find(|geometry| geometry.kind == "Polygon")?;
    let mut rings = geometry
        .coordinates
        .into_iter()
        .map(|ring| LineString::from(ring.into_iter().map(|[x, y]| (x, y)).collect::<Vec<_>>()));
    let exterior = rings.next()?;
    if exterior.0.len() < 4 {
        return None;
    }
    Some(Polygon::new(exterior, rings.collect()))
}

#[async_trait]
impl IsochroneService for MapboxIsochrone {
    async fn isochrone(
        &self,
        center: Coordinate,
        minutes: u32,
        mode: TravelMode,
    ) -> Result<Option<Polygon<f64>>, GenericError> {
        let profile = mode.to_string();
        let minutes = minutes.to_string();
        let response: IsochroneResponse = self
            .client
            .get_json(
                &["isochrone", "v1", "mapbox", &profile, &center.to_path_segment()],
                &[("contours_minutes", &minutes), ("polygons", "true")],
            )
            .await?;
        Ok(parse_isochrone(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Contains, Point};

    #[test]
    fn polygon_contour_is_parsed() {
        let response: IsochroneResponse = serde_json::from_str(
            r#"{"type":"FeatureCollection","features":[{"type":"Feature",
                "properties":{"contour":10},
                "geometry":{"type":"Polygon","coordinates":[[[0,0],[2,0],[2,2],[0,2],[0,0]]]}}]}"#,
        )
        .unwrap();
        let polygon = parse_isochrone(response).unwrap();
        assert!(polygon.contains(&Point::new(1.0, 1.0)));
        assert!(!polygon.contains(&Point::new(3.0, 1.0)));
    }

    #[test]
    fn line_contours_are_ignored() {
        let response: IsochroneResponse = serde_json::from_str(
            r#"{"features":[{"geometry":{"type":"LineString","coordinates":[[[0,0],[1,1]]]}}]}"#,
        )
        .unwrap();
        assert!(parse_isochrone(response).is_none());
    }
}
