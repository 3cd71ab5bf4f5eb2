use std::{fmt::Display, str::FromStr};

use log::*;

use crate::{BookmeetError, GenericError};

/// Mapbox's matrix endpoint accepts 25 coordinates, one of which is the origin.
pub const MAX_TOP_N: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeocoderKind {
    Mapbox,
    Google,
}

impl FromStr for GeocoderKind {
    type Err = BookmeetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mapbox" => Ok(GeocoderKind::Mapbox),
            "google" => Ok(GeocoderKind::Google),
            other => Err(BookmeetError::Config(format!("unknown geocoder {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankerConfig {
    pub top_n: usize,
    pub concurrency: usize,
}

impl Default for RankerConfig {
    fn default() -> Self {
        RankerConfig {
            top_n: 5,
            concurrency: 4,
        }
    }
}

impl RankerConfig {
    pub fn validate(self) -> Result<Self, BookmeetError> {
        if self.top_n == 0 || self.top_n > MAX_TOP_N {
            return Err(BookmeetError::Config(format!(
                "MEET_TOP_N must be within 1..={MAX_TOP_N}, got {}",
                self.top_n
            )));
        }
        if self.concurrency == 0 {
            return Err(BookmeetError::Config(
                "MEET_CONCURRENCY must be at least 1".to_string(),
            ));
        }
        Ok(self)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub discord_token: String,
    pub prefix: String,
    pub mapbox_token: String,
    pub google_maps_token: Option<String>,
    pub geocoder: GeocoderKind,
    pub supabase_endpoint: String,
    pub supabase_token: String,
    pub ranker: RankerConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, GenericError> {
        let defaults = RankerConfig::default();
        let geocoder: GeocoderKind = parse_or("GEOCODER", GeocoderKind::Mapbox)?;
        let google_maps_token = dotenv::var("GOOGLE_MAPS_TOKEN").ok();
        if geocoder == GeocoderKind::Google && google_maps_token.is_none() {
            return Err(BookmeetError::Config(
                "GEOCODER=google requires GOOGLE_MAPS_TOKEN".to_string(),
            )
            .into());
        }

        let ranker = RankerConfig {
            top_n: parse_or("MEET_TOP_N", defaults.top_n)?,
            concurrency: parse_or("MEET_CONCURRENCY", defaults.concurrency)?,
        }
        .validate()?;

        Ok(Config {
            discord_token: dotenv::var("DISCORD_TOKEN")?,
            prefix: dotenv::var("BOT_PREFIX").unwrap_or_else(|_| "!bookmeet".to_string()),
            mapbox_token: dotenv::var("MAPBOX_TOKEN")?,
            google_maps_token,
            geocoder,
            supabase_endpoint: dotenv::var("SUPABASE_ENDPOINT")?,
            supabase_token: dotenv::var("SUPABASE_TOKEN")?,
            ranker,
        })
    }
}

fn parse_or<T>(key: &str, default: T) -> Result<T, BookmeetError>
where
    T: FromStr + std::fmt::Debug,
    T::Err: Display,
{
    match dotenv::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| BookmeetError::Config(format!("invalid {key} value {raw:?}: {e}"))),
        Err(_) => {
            debug!("{key} not set, using default {default:?}");
            Ok(default)
        }
    }
}
