use std::sync::Arc;

use geo::{Contains, Point};
use log::*;

use super::{
    resolve::{resolve_candidates, resolve_reference, TransportTally},
    Candidate, Diagnostic, GeocodeCache, ResolvedCandidate,
};
use crate::{
    services::{geocoding::GeocodingService, isochrone::IsochroneService, TravelMode},
    RankError,
};

/// Candidates reachable by car within some minutes of a reference address.
pub struct IsochroneFilter {
    geocoder: Arc<dyn GeocodingService>,
    isochrones: Arc<dyn IsochroneService>,
    concurrency: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reachable {
    pub candidates: Vec<ResolvedCandidate>,
    pub diagnostics: Vec<Diagnostic>,
}

impl IsochroneFilter {
    pub fn new(
        geocoder: Arc<dyn GeocodingService>,
        isochrones: Arc<dyn IsochroneService>,
        concurrency: usize,
    ) -> Self {
        IsochroneFilter {
            geocoder,
            isochrones,
            concurrency: concurrency.max(1),
        }
    }

    /// Input order is kept. The reference's own address never counts as
    /// reachable.
    pub async fn within(
        &self,
        reference: &str,
        candidates: &[Candidate],
        minutes: u32,
    ) -> Result<Reachable, RankError> {
        let cache = GeocodeCache::new(self.geocoder.as_ref());
        let origin = resolve_reference(&cache, reference).await?;

        let area = match self
            .isochrones
            .isochrone(origin, minutes, TravelMode::Driving)
            .await
        {
            Ok(Some(area)) => area,
            Ok(None) => {
                debug!("No {minutes} min isochrone around {reference:?}");
                return Ok(Reachable {
                    candidates: Vec::new(),
                    diagnostics: vec![Diagnostic::IsochroneUnavailable { minutes }],
                });
            }
            Err(err) => {
                warn!("Isochrone around {reference:?} failed: {err}");
                return Ok(Reachable {
                    candidates: Vec::new(),
                    diagnostics: vec![Diagnostic::IsochroneUnavailable { minutes }],
                });
            }
        };

        let mut diagnostics = Vec::new();
        let mut tally = TransportTally::default();
        let resolved = resolve_candidates(
            &cache,
            origin,
            candidates,
            self.concurrency,
            &mut tally,
            &mut diagnostics,
        )
        .await;
        tally.check()?;

        let inside: Vec<ResolvedCandidate> = resolved
            .into_iter()
            .filter(|r| area.contains(&Point::new(r.coordinate.lng(), r.coordinate.lat())))
            .collect();
        info!(
            "{} of {} candidates within {minutes} min of {reference:?}",
            inside.len(),
            candidates.len()
        );
        Ok(Reachable {
            candidates: inside,
            diagnostics,
        })
    }
}
