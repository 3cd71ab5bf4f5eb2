use geojson::{Feature, FeatureCollection, Geometry, JsonObject, JsonValue, Value};
use serde_json::json;

use super::{RankedResult, RouteFeature, TravelTime};
use crate::services::TravelMode;

fn minutes(time: TravelTime) -> JsonValue {
    time.minutes().map_or(JsonValue::Null, |m| json!(m))
}

pub fn distance_label(distance_m: f64) -> String {
    format!("{:.2} km", distance_m / 1000.0)
}

impl RouteFeature {
    pub fn to_geojson(&self) -> Feature {
        let line = self
            .geometry
            .iter()
            .map(|c| vec![c.lng(), c.lat()])
            .collect();

        let mut properties = JsonObject::new();
        properties.insert("owner_id".to_string(), json!(self.owner_id));
        properties.insert("address".to_string(), json!(self.address));
        properties.insert("distance_m".to_string(), json!(self.distance_m));
        properties.insert(
            "distance_label".to_string(),
            json!(distance_label(self.distance_m)),
        );
        for mode in TravelMode::ALL {
            properties.insert(format!("{mode}_min"), minutes(self.travel_times.get(mode)));
        }

        Feature {
            bbox: None,
            geometry: Some(Geometry::new(Value::LineString(line))),
            id: None,
            properties: Some(properties),
            foreign_members: None,
        }
    }
}

impl RankedResult {
    /// Line features in rank order, for a map layer.
    pub fn to_feature_collection(&self) -> FeatureCollection {
        FeatureCollection {
            bbox: None,
            features: self.features.iter().map(RouteFeature::to_geojson).collect(),
            foreign_members: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ranking::TravelTimes,
        services::Coordinate,
    };

    #[test]
    fn features_carry_labels_and_nullable_minutes() {
        let start = Coordinate::new(100.30, 5.41).unwrap();
        let end = Coordinate::new(100.32, 5.43).unwrap();
        let mut travel_times = TravelTimes::default();
        travel_times.driving = TravelTime::Minutes(6.5);
        let result = RankedResult {
            features: vec![RouteFeature {
                owner_id: "u1".to_string(),
                address: "Gurney Drive".to_string(),
                destination: end,
                geometry: vec![start, end],
                distance_m: 3456.0,
                travel_times,
            }],
            diagnostics: Vec::new(),
        };

        let collection = result.to_feature_collection();
        assert_eq!(collection.features.len(), 1);
        let feature = &collection.features[0];
        let properties = feature.properties.as_ref().unwrap();
        assert_eq!(properties["distance_label"], json!("3.46 km"));
        assert_eq!(properties["driving_min"], json!(6.5));
        assert_eq!(properties["walking_min"], JsonValue::Null);
        match &feature.geometry.as_ref().unwrap().value {
            Value::LineString(line) => {
                assert_eq!(line, &vec![vec![100.30, 5.41], vec![100.32, 5.43]])
            }
            other => panic!("unexpected geometry {other:?}"),
        }
    }

    #[test]
    fn labels_round_to_two_decimals() {
        assert_eq!(distance_label(999.0), "1.00 km");
        assert_eq!(distance_label(0.0), "0.00 km");
    }
}
