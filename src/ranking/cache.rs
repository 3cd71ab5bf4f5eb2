use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};

use log::*;

use crate::{
    services::{geocoding::GeocodingService, Coordinate},
    GenericError,
};

/// Geocoder front that remembers answers for the lifetime of one ranking
/// session, so an address that appears several times (typically the
/// searcher's own) is looked up once and always yields the same coordinate.
///
/// Only provider answers are cached, including "not found". Transport errors
/// are not, so a later lookup of the same address will try again.
pub struct GeocodeCache<'a> {
    geocoder: &'a dyn GeocodingService,
    entries: Mutex<HashMap<String, Option<Coordinate>>>,
}

impl<'a> GeocodeCache<'a> {
    pub fn new(geocoder: &'a dyn GeocodingService) -> Self {
        GeocodeCache {
            geocoder,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub async fn resolve(&self, address: &str) -> Result<Option<Coordinate>, GenericError> {
        let key = address.trim();
        if let Some(hit) = self.lookup(key) {
            trace!("Geocode cache hit for {key:?}");
            return Ok(hit);
        }

        let resolved = self.geocoder.geocode(key).await?;
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.to_string())
            .or_insert(resolved);
        // A concurrent lookup may have landed first; keep the first answer.
        Ok(self.lookup(key).unwrap_or(resolved))
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, key: &str) -> Option<Option<Coordinate>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
    }
}
