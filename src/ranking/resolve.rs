use futures::{stream, StreamExt};
use log::*;

use super::{Candidate, Diagnostic, GeocodeCache, ResolvedCandidate, SkipReason};
use crate::{services::Coordinate, RankError};

/// Counts outbound candidate requests and how many of them died in transport.
#[derive(Debug, Default, Clone, Copy)]
pub(super) struct TransportTally {
    pub(super) attempts: usize,
    pub(super) failures: usize,
}

impl TransportTally {
    pub(super) fn record<T, E>(&mut self, result: &Result<T, E>) {
        self.attempts += 1;
        if result.is_err() {
            self.failures += 1;
        }
    }

    /// Every request that was made failed, so the network itself is gone.
    pub(super) fn check(&self) -> Result<(), RankError> {
        if self.attempts > 0 && self.failures == self.attempts {
            return Err(RankError::TransportExhausted {
                attempts: self.attempts,
            });
        }
        Ok(())
    }
}

pub(super) async fn resolve_reference(
    cache: &GeocodeCache<'_>,
    reference: &str,
) -> Result<Coordinate, RankError> {
    match cache.resolve(reference).await {
        Ok(Some(origin)) => Ok(origin),
        Ok(None) => Err(RankError::ReferenceUnresolvable {
            address: reference.to_string(),
        }),
        Err(err) => {
            warn!("Geocoding reference {reference:?} failed: {err}");
            Err(RankError::ReferenceUnresolvable {
                address: reference.to_string(),
            })
        }
    }
}

/// Geocodes candidates with at most `width` lookups in flight. Output keeps
/// input order. Candidates that fail to resolve or that land exactly on the
/// origin are dropped and reported.
pub(super) async fn resolve_candidates(
    cache: &GeocodeCache<'_>,
    origin: Coordinate,
    candidates: &[Candidate],
    width: usize,
    tally: &mut TransportTally,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<ResolvedCandidate> {
    // Futures are built up front: a `map` closure over borrowed candidates
    // inside the stream makes the ranking future non-`Send`.
    let pending: Vec<_> = candidates
        .iter()
        .map(|candidate| async move { (candidate, cache.resolve(&candidate.address).await) })
        .collect();
    let lookups: Vec<_> = stream::iter(pending)
        .buffered(width.max(1))
        .collect()
        .await;

    let mut resolved = Vec::with_capacity(lookups.len());
    for (candidate, lookup) in lookups {
        tally.record(&lookup);
        match lookup {
            // Exact match on both axes, no tolerance.
            Ok(Some(coordinate)) if coordinate == origin => {
                debug!("Skipping {} at {:?}: self-match", candidate.owner_id, candidate.address);
                diagnostics.push(Diagnostic::skipped(candidate, SkipReason::SelfMatch));
            }
            Ok(Some(coordinate)) => resolved.push(ResolvedCandidate {
                candidate: candidate.clone(),
                coordinate,
            }),
            Ok(None) => {
                debug!("Skipping {} at {:?}: not found", candidate.owner_id, candidate.address);
                diagnostics.push(Diagnostic::skipped(candidate, SkipReason::GeocodeFailed));
            }
            Err(err) => {
                warn!("Geocoding {:?} failed: {err}", candidate.address);
                diagnostics.push(Diagnostic::skipped(candidate, SkipReason::GeocodeFailed));
            }
        }
    }
    resolved
}
