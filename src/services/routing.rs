use async_trait::async_trait;
use log::*;
use serde::Deserialize;

use super::{mapbox::MapboxClient, Coordinate, Route};
use crate::GenericError;

/// Driving routes between two points. `Ok(None)` when the provider reports
/// that no route exists.
#[async_trait]
pub trait RoutingService: Send + Sync {
    async fn route(&self, from: Coordinate, to: Coordinate) -> Result<Option<Route>, GenericError>;
}

pub struct MapboxDirections {
    client: MapboxClient,
}

impl MapboxDirections {
    pub fn new(client: MapboxClient) -> Self {
        MapboxDirections { client }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct DirectionsResponse {
    pub(crate) code: Option<String>,
    #[serde(default)]
    pub(crate) routes: Vec<DirectionsRoute>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DirectionsRoute {
    pub(crate) distance: f64,
    pub(crate) geometry: LineGeometry,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LineGeometry {
    pub(crate) coordinates: Vec<[f64; 2]>,
}

/// Takes the first route. Routes with a negative or non-finite length, or with
/// fewer than two valid points, are treated as absent.
pub(crate) fn parse_directions(response: DirectionsResponse) -> Option<Route> {
    if response.code.as_deref().is_some_and(|code| code != "Ok") {
        return None;
    }
    let route = response.routes.into_iter().next()?;
    if !route.distance.is_finite() || route.distance < 0.0 {
        return None;
    }
    let geometry = route
        .geometry
        .coordinates
        .into_iter()
        .map(Coordinate::from_pair)
        .collect::<Option<Vec<_>>>()?;
    if geometry.len() < 2 {
        return None;
    }
    Some(Route {
        distance_m: route.distance,
        geometry,
    })
}

#[async_trait]
impl RoutingService for MapboxDirections {
    async fn route(&self, from: Coordinate, to: Coordinate) -> Result<Option<Route>, GenericError> {
        let waypoints = format!("{};{}", from.to_path_segment(), to.to_path_segment());
        let response: DirectionsResponse = self
            .client
            .get_json(
                &["directions", "v5", "mapbox", "driving", &waypoints],
                &[("geometries", "geojson"), ("overview", "full")],
            )
            .await?;
        let code = response.code.clone();
        let route = parse_directions(response);
        if route.is_none() {
            debug!("No usable route {waypoints} (code {code:?})");
        }
        Ok(route)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: &str) -> Option<Route> {
        parse_directions(serde_json::from_str(body).unwrap())
    }

    #[test]
    fn keeps_distance_and_geometry_of_first_route() {
        let route = parse(
            r#"{"code":"Ok","routes":[
                {"distance":5234.5,"duration":600.0,
                 "geometry":{"type":"LineString","coordinates":[[100.0,5.0],[100.1,5.1],[100.2,5.2]]}},
                {"distance":9000.0,"geometry":{"coordinates":[[0,0],[1,1]]}}
            ]}"#,
        )
        .unwrap();
        assert_eq!(route.distance_m, 5234.5);
        assert_eq!(route.geometry.len(), 3);
        assert_eq!(route.geometry[2], Coordinate::new(100.2, 5.2).unwrap());
    }

    #[test]
    fn no_route_codes_and_degenerate_geometry_are_absent() {
        assert!(parse(r#"{"code":"NoRoute","routes":[]}"#).is_none());
        assert!(parse(r#"{"code":"Ok","routes":[]}"#).is_none());
        assert!(parse(
            r#"{"code":"Ok","routes":[{"distance":10.0,"geometry":{"coordinates":[[1.0,2.0]]}}]}"#
        )
        .is_none());
        assert!(parse(
            r#"{"code":"Ok","routes":[{"distance":-1.0,"geometry":{"coordinates":[[1,2],[3,4]]}}]}"#
        )
        .is_none());
    }
}
