//! In-memory stand-ins for the external services, scripted per address or
//! coordinate. Used by the unit tests and by `tests/`.

use std::{
    collections::{HashMap, HashSet},
    future,
    sync::{Mutex, PoisonError},
};

use async_trait::async_trait;
use geo::Polygon;
use tokio::sync::oneshot;

use crate::{
    ranking::Candidate,
    services::{
        database::{candidates_from_profiles, Profile, ProfileDirectory},
        geocoding::GeocodingService,
        isochrone::IsochroneService,
        matrix::TravelTimeMatrix,
        routing::RoutingService,
        Coordinate, Route, TravelMode,
    },
    BookmeetError, GenericError,
};

fn transport_error(what: &str) -> GenericError {
    std::io::Error::new(std::io::ErrorKind::ConnectionRefused, what.to_string()).into()
}

fn key(c: Coordinate) -> (u64, u64) {
    (c.lng().to_bits(), c.lat().to_bits())
}

#[derive(Debug, Clone, Copy)]
enum Answer<T> {
    Found(T),
    NotFound,
    Fail,
}

#[derive(Default)]
pub struct ScriptedGeocoder {
    answers: HashMap<String, Answer<Coordinate>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl ScriptedGeocoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, address: &str, lng: f64, lat: f64) -> Self {
        let coordinate = Coordinate::new(lng, lat).expect("finite test coordinate");
        self.answers
            .insert(address.to_string(), Answer::Found(coordinate));
        self
    }

    pub fn not_found(mut self, address: &str) -> Self {
        self.answers.insert(address.to_string(), Answer::NotFound);
        self
    }

    pub fn failing(mut self, address: &str) -> Self {
        self.answers.insert(address.to_string(), Answer::Fail);
        self
    }

    pub fn calls(&self, address: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(address)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .sum()
    }
}

#[async_trait]
impl GeocodingService for ScriptedGeocoder {
    async fn geocode(&self, address: &str) -> Result<Option<Coordinate>, GenericError> {
        *self
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(address.to_string())
            .or_default() += 1;
        match self.answers.get(address) {
            Some(Answer::Found(c)) => Ok(Some(*c)),
            Some(Answer::Fail) => Err(transport_error(address)),
            Some(Answer::NotFound) | None => Ok(None),
        }
    }
}

/// Never answers. Stands in for a provider that is still in flight.
pub struct PendingGeocoder;

#[async_trait]
impl GeocodingService for PendingGeocoder {
    async fn geocode(&self, _address: &str) -> Result<Option<Coordinate>, GenericError> {
        future::pending().await
    }
}

/// Routes are keyed by destination; geometry is a straight origin-destination
/// line.
#[derive(Default)]
pub struct ScriptedRouter {
    answers: HashMap<(u64, u64), Answer<f64>>,
    calls: Mutex<usize>,
}

impl ScriptedRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn to(mut self, lng: f64, lat: f64, distance_m: f64) -> Self {
        let c = Coordinate::new(lng, lat).expect("finite test coordinate");
        self.answers.insert(key(c), Answer::Found(distance_m));
        self
    }

    pub fn no_route_to(mut self, lng: f64, lat: f64) -> Self {
        let c = Coordinate::new(lng, lat).expect("finite test coordinate");
        self.answers.insert(key(c), Answer::NotFound);
        self
    }

    pub fn failing_to(mut self, lng: f64, lat: f64) -> Self {
        let c = Coordinate::new(lng, lat).expect("finite test coordinate");
        self.answers.insert(key(c), Answer::Fail);
        self
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl RoutingService for ScriptedRouter {
    async fn route(&self, from: Coordinate, to: Coordinate) -> Result<Option<Route>, GenericError> {
        *self.calls.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        match self.answers.get(&key(to)) {
            Some(Answer::Found(distance_m)) => Ok(Some(Route {
                distance_m: *distance_m,
                geometry: vec![from, to],
            })),
            Some(Answer::Fail) => Err(transport_error("route")),
            Some(Answer::NotFound) | None => Ok(None),
        }
    }
}

/// Answers every destination with its scripted minutes, optionally cutting a
/// mode's response short or failing it outright.
#[derive(Default)]
pub struct ScriptedMatrix {
    minutes: HashMap<(TravelMode, (u64, u64)), f64>,
    truncate: HashMap<TravelMode, usize>,
    failing: HashSet<TravelMode>,
    requests: Mutex<Vec<(TravelMode, Vec<Coordinate>)>>,
}

impl ScriptedMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn minutes(mut self, mode: TravelMode, lng: f64, lat: f64, minutes: f64) -> Self {
        let c = Coordinate::new(lng, lat).expect("finite test coordinate");
        self.minutes.insert((mode, key(c)), minutes);
        self
    }

    /// Same minutes for all three modes, scaled like a car/bike/foot ratio.
    pub fn uniform(self, lng: f64, lat: f64, driving: f64) -> Self {
        self.minutes(TravelMode::Driving, lng, lat, driving)
            .minutes(TravelMode::Cycling, lng, lat, driving * 3.0)
            .minutes(TravelMode::Walking, lng, lat, driving * 10.0)
    }

    pub fn truncated(mut self, mode: TravelMode, len: usize) -> Self {
        self.truncate.insert(mode, len);
        self
    }

    pub fn failing(mut self, mode: TravelMode) -> Self {
        self.failing.insert(mode);
        self
    }

    pub fn requests(&self) -> Vec<(TravelMode, Vec<Coordinate>)> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl TravelTimeMatrix for ScriptedMatrix {
    async fn travel_minutes(
        &self,
        _origin: Coordinate,
        destinations: &[Coordinate],
        mode: TravelMode,
    ) -> Result<Vec<Option<f64>>, GenericError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((mode, destinations.to_vec()));
        if self.failing.contains(&mode) {
            return Err(transport_error("matrix"));
        }
        let mut row: Vec<Option<f64>> = destinations
            .iter()
            .map(|d| self.minutes.get(&(mode, key(*d))).copied())
            .collect();
        if let Some(len) = self.truncate.get(&mode) {
            row.truncate(*len);
        }
        Ok(row)
    }
}

pub struct FixedIsochrone(pub Option<Polygon<f64>>);

#[async_trait]
impl IsochroneService for FixedIsochrone {
    async fn isochrone(
        &self,
        _center: Coordinate,
        _minutes: u32,
        _mode: TravelMode,
    ) -> Result<Option<Polygon<f64>>, GenericError> {
        Ok(self.0.clone())
    }
}

#[derive(Default)]
pub struct InMemoryDirectory {
    profiles: Mutex<Vec<Profile>>,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
}

impl InMemoryDirectory {
    pub fn new(profiles: Vec<Profile>) -> Self {
        InMemoryDirectory {
            profiles: Mutex::new(profiles),
            gate: Mutex::new(None),
        }
    }

    /// Holds the first `candidates` read until the returned sender fires or
    /// is dropped. Later reads answer straight away.
    pub fn gated(self) -> (Self, oneshot::Sender<()>) {
        let (tx, rx) = oneshot::channel();
        *self.gate.lock().unwrap_or_else(PoisonError::into_inner) = Some(rx);
        (self, tx)
    }

    pub fn profile(id: &str, address: Option<&str>) -> Profile {
        Profile {
            id: id.to_string(),
            address: address.map(str::to_string),
            first_name: None,
            last_name: None,
            email: None,
            phone_no: None,
        }
    }

    fn with_profiles<T>(&self, f: impl FnOnce(&mut Vec<Profile>) -> T) -> T {
        f(&mut self.profiles.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

#[async_trait]
impl ProfileDirectory for InMemoryDirectory {
    async fn candidates(&self) -> Result<Vec<Candidate>, GenericError> {
        let gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        Ok(candidates_from_profiles(self.with_profiles(|p| p.clone())))
    }

    async fn address_of(&self, user_id: &str) -> Result<Option<String>, GenericError> {
        Ok(self.with_profiles(|profiles| {
            profiles
                .iter()
                .find(|p| p.id == user_id)
                .and_then(|p| p.usable_address().map(str::to_string))
        }))
    }

    async fn profile_by_address(&self, address: &str) -> Result<Profile, GenericError> {
        self.with_profiles(|profiles| {
            profiles
                .iter()
                .find(|p| p.address.as_deref() == Some(address))
                .cloned()
        })
        .ok_or_else(|| BookmeetError::UserNotFound().into())
    }

    async fn save_address(&self, user_id: &str, address: &str) -> Result<(), GenericError> {
        self.with_profiles(|profiles| {
            match profiles.iter_mut().find(|p| p.id == user_id) {
                Some(profile) => profile.address = Some(address.to_string()),
                None => profiles.push(Self::profile(user_id, Some(address))),
            }
        });
        Ok(())
    }

    async fn clear_address(&self, user_id: &str) -> Result<(), GenericError> {
        self.with_profiles(|profiles| {
            if let Some(profile) = profiles.iter_mut().find(|p| p.id == user_id) {
                profile.address = None;
            }
        });
        Ok(())
    }
}
