use derive_more::Display;
use serde::{Deserialize, Serialize};

pub mod database;
pub mod geocoding;
pub mod isochrone;
pub mod matrix;
pub mod mapbox;
pub mod routing;

/// A (longitude, latitude) pair. Both axes are always finite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    lng: f64,
    lat: f64,
}

impl Coordinate {
    pub fn new(lng: f64, lat: f64) -> Option<Self> {
        if lng.is_finite() && lat.is_finite() {
            Some(Coordinate { lng, lat })
        } else {
            None
        }
    }

    pub fn from_pair([lng, lat]: [f64; 2]) -> Option<Self> {
        Coordinate::new(lng, lat)
    }

    pub fn lng(&self) -> f64 {
        self.lng
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    /// Rendered the way Mapbox expects path segments: `lng,lat`.
    pub fn to_path_segment(&self) -> String {
        format!("{},{}", self.lng, self.lat)
    }
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TravelMode {
    #[display(fmt = "driving")]
    Driving,
    #[display(fmt = "cycling")]
    Cycling,
    #[display(fmt = "walking")]
    Walking,
}

impl TravelMode {
    pub const ALL: [TravelMode; 3] = [TravelMode::Driving, TravelMode::Cycling, TravelMode::Walking];
}

/// A driving route as reported by the routing provider.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub distance_m: f64,
    pub geometry: Vec<Coordinate>,
}
