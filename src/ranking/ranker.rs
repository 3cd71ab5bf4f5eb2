use std::sync::Arc;

use futures::{stream, StreamExt};
use log::*;

use super::{
    resolve::{resolve_candidates, resolve_reference, TransportTally},
    Candidate, Diagnostic, GeocodeCache, RankedResult, ResolvedCandidate, RouteFeature,
    SkipReason, TravelTime, TravelTimes,
};
use crate::{
    services::{
        geocoding::GeocodingService, matrix::TravelTimeMatrix, routing::RoutingService,
        Coordinate, Route, TravelMode,
    },
    session::CancelToken,
    RankError,
};

pub struct Ranker {
    geocoder: Arc<dyn GeocodingService>,
    router: Arc<dyn RoutingService>,
    matrix: Arc<dyn TravelTimeMatrix>,
    concurrency: usize,
}

struct Routed {
    resolved: ResolvedCandidate,
    route: Route,
}

impl Ranker {
    pub fn new(
        geocoder: Arc<dyn GeocodingService>,
        router: Arc<dyn RoutingService>,
        matrix: Arc<dyn TravelTimeMatrix>,
        concurrency: usize,
    ) -> Self {
        Ranker {
            geocoder,
            router,
            matrix,
            concurrency: concurrency.max(1),
        }
    }

    /// Ranks `candidates` by road distance from `reference` and keeps the
    /// closest `top_n`, ties in input order.
    ///
    /// Travel times are only requested for the survivors, one batched matrix
    /// call per mode. Dropping the returned future abandons every request
    /// still in flight.
    pub async fn rank(
        &self,
        reference: &str,
        candidates: &[Candidate],
        top_n: usize,
    ) -> Result<RankedResult, RankError> {
        if top_n == 0 {
            return Err(RankError::InvalidTopN(top_n));
        }

        let cache = GeocodeCache::new(self.geocoder.as_ref());
        let origin = resolve_reference(&cache, reference).await?;

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
        let mut routed = self
            .route_all(origin, resolved, &mut tally, &mut diagnostics)
            .await;
        tally.check()?;

        // `sort_by` is stable, so equal distances keep input order.
        routed.sort_by(|a, b| a.route.distance_m.total_cmp(&b.route.distance_m));
        routed.truncate(top_n);

        let travel_times = self
            .travel_times(origin, &routed, &mut diagnostics)
            .await;

        let features: Vec<RouteFeature> = routed
            .into_iter()
            .zip(travel_times)
            .map(|(routed, travel_times)| RouteFeature {
                owner_id: routed.resolved.candidate.owner_id,
                address: routed.resolved.candidate.address,
                destination: routed.resolved.coordinate,
                geometry: routed.route.geometry,
                distance_m: routed.route.distance_m,
                travel_times,
            })
            .collect();

        info!(
            "Ranked {} of {} candidates from {:?} ({} diagnostics)",
            features.len(),
            candidates.len(),
            reference,
            diagnostics.len()
        );
        Ok(RankedResult {
            features,
            diagnostics,
        })
    }

    /// Like [`Ranker::rank`], but gives up as soon as `cancel` fires. A
    /// cancelled call never yields a result, even if it had already finished.
    pub async fn rank_cancellable(
        &self,
        reference: &str,
        candidates: &[Candidate],
        top_n: usize,
        cancel: &CancelToken,
    ) -> Result<RankedResult, RankError> {
        if cancel.is_cancelled() {
            return Err(RankError::Cancelled);
        }
        let mut watcher = cancel.clone();
        tokio::select! {
            biased;
            _ = watcher.cancelled() => {
                debug!("Ranking from {reference:?} cancelled");
                Err(RankError::Cancelled)
            }
            result = self.rank(reference, candidates, top_n) => {
                if cancel.is_cancelled() {
                    Err(RankError::Cancelled)
                } else {
                    result
                }
            }
        }
    }

    async fn route_all(
        &self,
        origin: Coordinate,
        resolved: Vec<ResolvedCandidate>,
        tally: &mut TransportTally,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Vec<Routed> {
        let router = self.router.as_ref();
        let pending: Vec<_> = resolved
            .into_iter()
            .map(|resolved| async move {
                let route = router.route(origin, resolved.coordinate).await;
                (resolved, route)
            })
            .collect();
        let attempts: Vec<_> = stream::iter(pending)
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut routed = Vec::with_capacity(attempts.len());
        for (resolved, route) in attempts {
            tally.record(&route);
            match route {
                Ok(Some(route)) if route.geometry.len() >= 2 && route.distance_m >= 0.0 => {
                    trace!(
                        "Route to {} is {:.0} m",
                        resolved.candidate.owner_id,
                        route.distance_m
                    );
                    routed.push(Routed { resolved, route });
                }
                Ok(_) => {
                    debug!("No route to {}", resolved.candidate.owner_id);
                    diagnostics.push(Diagnostic::skipped(
                        &resolved.candidate,
                        SkipReason::RouteFailed,
                    ));
                }
                Err(err) => {
                    warn!("Routing to {:?} failed: {err}", resolved.candidate.address);
                    diagnostics.push(Diagnostic::skipped(
                        &resolved.candidate,
                        SkipReason::RouteFailed,
                    ));
                }
            }
        }
        routed
    }

    /// One matrix request per mode, destinations in ranked order. Anything the
    /// provider leaves out comes back as [`TravelTime::Unavailable`].
    async fn travel_times(
        &self,
        origin: Coordinate,
        routed: &[Routed],
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Vec<TravelTimes> {
        let mut times = vec![TravelTimes::default(); routed.len()];
        if routed.is_empty() {
            return times;
        }
        let destinations: Vec<Coordinate> = routed.iter().map(|r| r.resolved.coordinate).collect();

        for mode in TravelMode::ALL {
            let row = match self.matrix.travel_minutes(origin, &destinations, mode).await {
                Ok(row) => row,
                Err(err) => {
                    warn!("{mode} travel-time matrix failed: {err}");
                    Vec::new()
                }
            };
            if row.len() != destinations.len() {
                debug!(
                    "{mode} matrix returned {} durations for {} destinations",
                    row.len(),
                    destinations.len()
                );
            }
            for (i, (slot, routed)) in times.iter_mut().zip(routed).enumerate() {
                match row.get(i).copied().flatten() {
                    Some(minutes) if minutes.is_finite() && minutes >= 0.0 => {
                        slot.set(mode, TravelTime::Minutes(minutes))
                    }
                    _ => diagnostics.push(Diagnostic::TravelTimeUnavailable {
                        owner_id: routed.resolved.candidate.owner_id.clone(),
                        mode,
                    }),
                }
            }
        }
        times
    }
}
