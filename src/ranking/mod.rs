//! Nearest-meeting-point ranking.
//!
//! Given a reference address and a set of candidate meeting locations, the
//! [`Ranker`] resolves every address, measures road distance from the
//! reference, keeps the closest `top_n` and annotates each with driving,
//! cycling and walking times. Per-candidate failures never abort a call; they
//! are reported through [`Diagnostic`]s next to the result.

use derive_more::Display;
use serde::Serialize;

use crate::services::{Coordinate, TravelMode};

pub mod cache;
pub mod features;
pub mod isochrone;
mod ranker;
mod resolve;

pub use cache::GeocodeCache;
pub use isochrone::{IsochroneFilter, Reachable};
pub use ranker::Ranker;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Candidate {
    pub address: String,
    pub owner_id: String,
}

impl Candidate {
    pub fn new(address: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Candidate {
            address: address.into(),
            owner_id: owner_id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedCandidate {
    pub candidate: Candidate,
    pub coordinate: Coordinate,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TravelTime {
    Minutes(f64),
    Unavailable,
}

impl TravelTime {
    pub fn minutes(&self) -> Option<f64> {
        match self {
            TravelTime::Minutes(m) => Some(*m),
            TravelTime::Unavailable => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TravelTimes {
    pub driving: TravelTime,
    pub cycling: TravelTime,
    pub walking: TravelTime,
}

impl Default for TravelTimes {
    fn default() -> Self {
        TravelTimes {
            driving: TravelTime::Unavailable,
            cycling: TravelTime::Unavailable,
            walking: TravelTime::Unavailable,
        }
    }
}

impl TravelTimes {
    pub fn get(&self, mode: TravelMode) -> TravelTime {
        match mode {
            TravelMode::Driving => self.driving,
            TravelMode::Cycling => self.cycling,
            TravelMode::Walking => self.walking,
        }
    }

    pub fn set(&mut self, mode: TravelMode, time: TravelTime) {
        match mode {
            TravelMode::Driving => self.driving = time,
            TravelMode::Cycling => self.cycling = time,
            TravelMode::Walking => self.walking = time,
        }
    }
}

/// A ranked meeting point, ready to draw: the route from the reference to the
/// candidate plus its travel times.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteFeature {
    pub owner_id: String,
    pub address: String,
    pub destination: Coordinate,
    /// At least two points, reference end first.
    pub geometry: Vec<Coordinate>,
    pub distance_m: f64,
    pub travel_times: TravelTimes,
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    #[display(fmt = "geocode-failed")]
    GeocodeFailed,
    #[display(fmt = "route-failed")]
    RouteFailed,
    #[display(fmt = "self-match")]
    SelfMatch,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    CandidateSkipped {
        owner_id: String,
        address: String,
        reason: SkipReason,
    },
    TravelTimeUnavailable {
        owner_id: String,
        mode: TravelMode,
    },
    IsochroneUnavailable {
        minutes: u32,
    },
}

impl Diagnostic {
    pub(crate) fn skipped(candidate: &Candidate, reason: SkipReason) -> Self {
        Diagnostic::CandidateSkipped {
            owner_id: candidate.owner_id.clone(),
            address: candidate.address.clone(),
            reason,
        }
    }
}

/// Outcome of one ranking call: at most `top_n` features in ascending
/// distance order, plus everything that was left out and why.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RankedResult {
    pub features: Vec<RouteFeature>,
    pub diagnostics: Vec<Diagnostic>,
}

impl RankedResult {
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn skipped(&self) -> impl Iterator<Item = (&str, SkipReason)> + '_ {
        self.diagnostics.iter().filter_map(|d| match d {
            Diagnostic::CandidateSkipped {
                owner_id, reason, ..
            } => Some((owner_id.as_str(), *reason)),
            _ => None,
        })
    }

    /// Candidates that could not be located or routed. Self-matches are not
    /// counted; they were never meant to show up.
    pub fn unlocated_count(&self) -> usize {
        self.skipped()
            .filter(|(_, reason)| *reason != SkipReason::SelfMatch)
            .count()
    }
}
