use async_trait::async_trait;
use serde::Deserialize;

use super::{mapbox::MapboxClient, Coordinate, TravelMode};
use crate::{BookmeetError, GenericError};

/// One-origin, many-destination travel durations.
///
/// Implementations return one entry per destination they could answer for, in
/// submission order, in fractional minutes. A `None` entry (or a short vector)
/// means the provider had no duration for that destination.
#[async_trait]
pub trait TravelTimeMatrix: Send + Sync {
    async fn travel_minutes(
        &self,
        origin: Coordinate,
        destinations: &[Coordinate],
        mode: TravelMode,
    ) -> Result<Vec<Option<f64>>, GenericError>;
}

pub struct MapboxMatrix {
    client: MapboxClient,
}

impl MapboxMatrix {
    pub fn new(client: MapboxClient) -> Self {
        MapboxMatrix { client }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct MatrixResponse {
    pub(crate) code: Option<String>,
    #[serde(default)]
    pub(crate) durations: Vec<Vec<Option<f64>>>,
}

pub(crate) fn parse_matrix(response: MatrixResponse) -> Result<Vec<Option<f64>>, BookmeetError> {
    if response.code.as_deref().is_some_and(|code| code != "Ok") {
        return Err(BookmeetError::MalformedResponse("mapbox matrix"));
    }
    let row = response
        .durations
        .into_iter()
        .next()
        .ok_or(BookmeetError::MalformedResponse("mapbox matrix"))?;
    Ok(row
        .into_iter()
        .map(|seconds| seconds.filter(|s| s.is_finite() && *s >= 0.0).map(|s| s / 60.0))
        .collect())
}

#[async_trait]
impl TravelTimeMatrix for MapboxMatrix {
    async fn travel_minutes(
        &self,
        origin: Coordinate,
        destinations: &[Coordinate],
        mode: TravelMode,
    ) -> Result<Vec<Option<f64>>, GenericError> {
        if destinations.is_empty() {
            return Ok(Vec::new());
        }
        let coordinates = std::iter::once(&origin)
            .chain(destinations)
            .map(Coordinate::to_path_segment)
            .collect::<Vec<_>>()
            .join(";");
        let destination_indices = (1..=destinations.len())
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(";");
        let profile = mode.to_string();
        let response: MatrixResponse = self
            .client
            .get_json(
                &["directions-matrix", "v1", "mapbox", &profile, &coordinates],
                &[
                    ("sources", "0"),
                    ("destinations", &destination_indices),
                    ("annotations", "duration"),
                ],
            )
            .await?;
        Ok(parse_matrix(response)?)
    }
}
