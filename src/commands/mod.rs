use std::{collections::HashSet, fmt::Write as _, sync::Arc};

use crate::{
    config::{Config, GeocoderKind},
    ranking::{features::distance_label, IsochroneFilter, RankedResult, Ranker, TravelTime},
    services::{
        database::{ProfileDirectory, SupabaseService},
        geocoding::{GeocodingService, GoogleMapsService, MapboxGeocoder},
        isochrone::MapboxIsochrone,
        mapbox::MapboxClient,
        matrix::MapboxMatrix,
        routing::MapboxDirections,
    },
    session::{LayerDiff, MapSessions, SearchSessions, SearchTicket},
    BookmeetError, GenericError,
};

use log::*;
use serenity::{
    framework::standard::{
        help_commands::with_embeds,
        macros::{command, group, help},
        Args, CommandGroup, CommandResult, HelpOptions,
    },
    model::{channel::Message, id::UserId},
    prelude::*,
};

const DEFAULT_ISOCHRONE_MINUTES: u32 = 10;

/// Room left for list lines in one Discord message (2000 characters max).
const LIST_BUDGET: usize = 1900;

/// Everything a command needs, shared across shards.
pub struct BotState {
    pub ranker: Ranker,
    pub isochrones: IsochroneFilter,
    pub geocoder: Arc<dyn GeocodingService>,
    pub directory: Arc<dyn ProfileDirectory>,
    pub searches: SearchSessions,
    pub maps: MapSessions,
    pub top_n: usize,
}

pub struct BotStateKey;

impl TypeMapKey for BotStateKey {
    type Value = Arc<BotState>;
}

impl BotState {
    pub fn from_config(config: &Config) -> Result<Self, GenericError> {
        let mapbox = MapboxClient::new(&config.mapbox_token)?;
        let geocoder: Arc<dyn GeocodingService> = match config.geocoder {
            GeocoderKind::Mapbox => Arc::new(MapboxGeocoder::new(mapbox.clone())),
            GeocoderKind::Google => {
                let token = config.google_maps_token.as_deref().ok_or_else(|| {
                    BookmeetError::Config("GOOGLE_MAPS_TOKEN not set".to_string())
                })?;
                Arc::new(GoogleMapsService::new(token)?)
            }
        };
        let directory = Arc::new(SupabaseService::new(
            &config.supabase_endpoint,
            &config.supabase_token,
        ));
        Ok(BotState {
            ranker: Ranker::new(
                geocoder.clone(),
                Arc::new(MapboxDirections::new(mapbox.clone())),
                Arc::new(MapboxMatrix::new(mapbox.clone())),
                config.ranker.concurrency,
            ),
            isochrones: IsochroneFilter::new(
                geocoder.clone(),
                Arc::new(MapboxIsochrone::new(mapbox)),
                config.ranker.concurrency,
            ),
            geocoder,
            directory,
            searches: SearchSessions::new(),
            maps: MapSessions::new(),
            top_n: config.ranker.top_n,
        })
    }

    async fn reference_for(&self, user: &str, address: &str) -> Result<String, GenericError> {
        let address = address.trim();
        if !address.is_empty() {
            return Ok(address.to_string());
        }
        Ok(self
            .directory
            .address_of(user)
            .await?
            .ok_or(BookmeetError::MissingAddress())?)
    }

    /// Runs a meeting-point search for `user`. `Ok(None)` means the search was
    /// superseded by a newer one and nothing should be posted.
    ///
    /// The search is registered before anything is awaited, so supersession
    /// follows the order the user issued the commands in.
    pub async fn meet(&self, user: &str, address: &str) -> Result<Option<String>, GenericError> {
        let ticket = self.searches.begin(user);
        let outcome = self.search(user, address, &ticket).await;
        if !self.searches.finish(&ticket) {
            debug!("Dropping superseded search {} for {user}", ticket.id);
            return Ok(None);
        }

        let (reference, result) = outcome?;
        let diff = self.maps.apply(user, ticket.id, &result).await;
        Ok(Some(format_ranking(&reference, &result, &diff)))
    }

    async fn search(
        &self,
        user: &str,
        address: &str,
        ticket: &SearchTicket,
    ) -> Result<(String, RankedResult), GenericError> {
        let reference = self.reference_for(user, address).await?;
        let candidates = self.directory.candidates().await?;
        let result = self
            .ranker
            .rank_cancellable(&reference, &candidates, self.top_n, &ticket.token)
            .await?;
        Ok((reference, result))
    }

    pub async fn nearby(
        &self,
        user: &str,
        address: &str,
        minutes: u32,
    ) -> Result<String, GenericError> {
        let reference = self.reference_for(user, address).await?;
        let candidates = self.directory.candidates().await?;
        let reachable = self
            .isochrones
            .within(&reference, &candidates, minutes)
            .await?;

        if reachable.candidates.is_empty() {
            return Ok(format!(
                "Nobody is within {minutes} min of {reference} by car."
            ));
        }
        let mut reply = format!("Within {minutes} min of {reference} by car:\n");
        let mut listed = 0;
        for resolved in &reachable.candidates {
            let line = format!(
                "- {} ({})\n",
                resolved.candidate.address, resolved.candidate.owner_id
            );
            if reply.len() + line.len() > LIST_BUDGET {
                break;
            }
            reply.push_str(&line);
            listed += 1;
        }
        let rest = reachable.candidates.len() - listed;
        if rest > 0 {
            let _ = writeln!(reply, "...and {rest} more.");
        }
        Ok(reply.trim_end().to_string())
    }

    pub async fn home(&self, user: &str, address: &str) -> Result<String, GenericError> {
        let address = address.trim();
        if address.is_empty() {
            return Err(BookmeetError::MissingAddress().into());
        }
        let coordinate = self
            .geocoder
            .geocode(address)
            .await?
            .ok_or(BookmeetError::LocationNotFound())?;
        self.directory.save_address(user, address).await?;
        Ok(format!(
            "Address saved ({:.4}, {:.4}).",
            coordinate.lat(),
            coordinate.lng()
        ))
    }

    pub async fn whois(&self, address: &str) -> Result<String, GenericError> {
        let profile = self.directory.profile_by_address(address.trim()).await?;
        Ok(format!(
            "Name: {}\nEmail: {}\nAddress: {}\nPhone: {}",
            profile.display_name(),
            profile.email.as_deref().unwrap_or("N/A"),
            profile.address.as_deref().unwrap_or("N/A"),
            profile.phone_no.as_deref().unwrap_or("N/A"),
        ))
    }

    pub async fn clear(&self, user: &str) -> Result<String, GenericError> {
        self.searches.cancel(user);
        let removed = self.maps.clear(user).await;
        self.directory.clear_address(user).await?;
        Ok(format!(
            "Address cleared, {} marker(s) removed.",
            removed.len()
        ))
    }
}

fn minutes(time: TravelTime) -> String {
    match time {
        TravelTime::Minutes(m) => format!("{m:.0} min"),
        TravelTime::Unavailable => "n/a".to_string(),
    }
}

pub fn format_ranking(reference: &str, result: &RankedResult, diff: &LayerDiff) -> String {
    let mut reply = String::new();
    if result.is_empty() {
        let _ = writeln!(reply, "No meeting points found near {reference}.");
    } else {
        let _ = writeln!(reply, "Closest meeting points to {reference}:");
        for (rank, feature) in result.features.iter().enumerate() {
            let times = &feature.travel_times;
            let _ = writeln!(
                reply,
                "{}. {} ({}) - {} | car {}, bike {}, walk {}",
                rank + 1,
                feature.address,
                feature.owner_id,
                distance_label(feature.distance_m),
                minutes(times.driving),
                minutes(times.cycling),
                minutes(times.walking),
            );
        }
        if !diff.added.is_empty() && diff.added.len() < result.features.len() {
            let _ = writeln!(reply, "New since your last search: {}", diff.added.join(", "));
        }
    }
    match result.unlocated_count() {
        0 => {}
        1 => reply.push_str("1 candidate could not be located.\n"),
        n => {
            let _ = writeln!(reply, "{n} candidates could not be located.");
        }
    }
    reply.trim_end().to_string()
}

async fn state(ctx: &Context) -> Result<Arc<BotState>, GenericError> {
    let data = ctx.data.read().await;
    let state = data
        .get::<BotStateKey>()
        .ok_or_else(|| BookmeetError::Config("bot state not initialised".to_string()))?;
    Ok(state.clone())
}

/// Failures are answered in the channel, never only logged.
fn reply_text(result: Result<String, GenericError>, failed: &str) -> String {
    result.unwrap_or_else(|why| format!("{failed}: {why}"))
}

async fn reply(ctx: &Context, msg: &Message, text: &str) {
    if let Err(why) = msg.channel_id.say(&ctx.http, text).await {
        warn!("Error sending message: {:?}", why);
    }
}

#[help]
pub async fn help(
    context: &Context,
    msg: &Message,
    args: Args,
    help_options: &'static HelpOptions,
    groups: &[&'static CommandGroup],
    owners: HashSet<UserId>,
) -> CommandResult {
    let _ = with_embeds(context, msg, args, help_options, groups, owners).await?;
    Ok(())
}

#[group]
#[commands(meet, nearby, home, whois, clear)]
pub struct General;

#[command]
#[description("Find the closest meeting points to an address, or to your saved address.")]
#[usage("[address]")]
#[example("Gurney Plaza, George Town")]
async fn meet(ctx: &Context, msg: &Message, args: Args) -> CommandResult {
    let state = state(ctx).await?;
    let user = msg.author.id.0.to_string();

    match state.meet(&user, args.rest()).await {
        Ok(Some(text)) => reply(ctx, msg, &text).await,
        Ok(None) => trace!("Search by {user} superseded, not replying."),
        Err(why) => reply(ctx, msg, &format!("Search failed: {why}")).await,
    }

    Ok(())
}

#[command]
#[description("List everyone reachable by car within some minutes.")]
#[usage("[minutes] [address]")]
#[example("15")]
async fn nearby(ctx: &Context, msg: &Message, mut args: Args) -> CommandResult {
    let state = state(ctx).await?;
    let user = msg.author.id.0.to_string();
    let minutes = args.single::<u32>().unwrap_or(DEFAULT_ISOCHRONE_MINUTES);

    let text = reply_text(state.nearby(&user, args.rest(), minutes).await, "Lookup failed");
    reply(ctx, msg, &text).await;

    Ok(())
}

#[command]
#[description("Save your address for meeting-point searches.")]
#[usage("<address>")]
#[example("Jalan Sungai Dua, Penang")]
async fn home(ctx: &Context, msg: &Message, args: Args) -> CommandResult {
    let state = state(ctx).await?;
    let user = msg.author.id.0.to_string();

    let text = reply_text(state.home(&user, args.rest()).await, "Could not save address");
    reply(ctx, msg, &text).await;

    Ok(())
}

#[command]
#[description("Show who lives at an address.")]
#[usage("<address>")]
async fn whois(ctx: &Context, msg: &Message, args: Args) -> CommandResult {
    let state = state(ctx).await?;

    let text = match state.whois(args.rest()).await {
        Ok(text) => text,
        Err(why) => format!("{why}"),
    };
    reply(ctx, msg, &text).await;

    Ok(())
}

#[command]
#[description = "Forget your address and clear your map."]
#[usage("")]
async fn clear(ctx: &Context, msg: &Message) -> CommandResult {
    let state = state(ctx).await?;
    let user = msg.author.id.0.to_string();

    let text = reply_text(state.clear(&user).await, "Could not clear address");
    reply(ctx, msg, &text).await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ranking::{Diagnostic, RouteFeature, SkipReason, TravelTimes},
        services::Coordinate,
        test_helpers::{
            FixedIsochrone, InMemoryDirectory, ScriptedGeocoder, ScriptedMatrix, ScriptedRouter,
        },
    };
    use geo::{LineString, Polygon};

    fn assert_send<T: Send>(_: &T) {}

    fn state(directory: InMemoryDirectory) -> BotState {
        let geocoder: Arc<dyn GeocodingService> = Arc::new(
            ScriptedGeocoder::new()
                .with("Home", 0.0, 0.0)
                .with("Library", 0.01, 0.0)
                .with("Cafe", 0.02, 0.0)
                .not_found("Nowhere"),
        );
        let router = ScriptedRouter::new()
            .to(0.01, 0.0, 1100.0)
            .to(0.02, 0.0, 2200.0);
        let matrix = ScriptedMatrix::new()
            .uniform(0.01, 0.0, 3.0)
            .uniform(0.02, 0.0, 6.0);
        BotState {
            ranker: Ranker::new(geocoder.clone(), Arc::new(router), Arc::new(matrix), 2),
            isochrones: IsochroneFilter::new(geocoder.clone(), Arc::new(FixedIsochrone(None)), 2),
            geocoder,
            directory: Arc::new(directory),
            searches: SearchSessions::new(),
            maps: MapSessions::new(),
            top_n: 5,
        }
    }

    fn directory() -> InMemoryDirectory {
        InMemoryDirectory::new(vec![
            InMemoryDirectory::profile("me", Some("Home")),
            InMemoryDirectory::profile("cafe-owner", Some("Cafe")),
            InMemoryDirectory::profile("librarian", Some("Library")),
            InMemoryDirectory::profile("ghost", Some("Nowhere")),
            InMemoryDirectory::profile("newcomer", None),
            InMemoryDirectory::profile("blank", Some("   ")),
        ])
    }

    #[tokio::test]
    async fn meet_uses_saved_address_and_reports_unlocated() {
        let state = state(directory());
        let text = state.meet("me", "").await.unwrap().unwrap();
        assert_eq!(
            text,
            "Closest meeting points to Home:\n\
             1. Library (librarian) - 1.10 km | car 3 min, bike 9 min, walk 30 min\n\
             2. Cafe (cafe-owner) - 2.20 km | car 6 min, bike 18 min, walk 60 min\n\
             1 candidate could not be located."
        );
        assert_eq!(state.maps.marker_count("me").await, 2);
        assert_eq!(state.searches.in_flight(), 0);
    }

    #[test]
    fn command_futures_are_send() {
        let state = state(directory());
        assert_send(&state.meet("me", ""));
        assert_send(&state.nearby("me", "", 10));
    }

    #[tokio::test]
    async fn meet_without_any_address_asks_for_one() {
        let state = state(directory());
        let err = state.meet("newcomer", "  ").await.unwrap_err();
        assert!(err.to_string().contains("No address registered"));
        let err = state.meet("blank", "").await.unwrap_err();
        assert!(err.to_string().contains("No address registered"));
        assert_eq!(state.searches.in_flight(), 0);
    }

    #[tokio::test]
    async fn older_search_yields_to_a_newer_one_issued_while_it_waits() {
        let (directory, release) = directory().gated();
        let state = Arc::new(state(directory));

        let older = tokio::spawn({
            let state = state.clone();
            async move { state.meet("me", "Home").await }
        });
        while state.searches.in_flight() == 0 {
            tokio::task::yield_now().await;
        }

        let newer = state.meet("me", "Library").await.unwrap().unwrap();
        assert!(newer.starts_with("Closest meeting points to Library:\n1. Cafe (cafe-owner)"));
        assert_eq!(state.maps.marker_count("me").await, 1);

        release.send(()).unwrap();
        assert_eq!(older.await.unwrap().unwrap(), None);
        assert_eq!(state.maps.marker_count("me").await, 1);
        assert_eq!(state.searches.in_flight(), 0);
    }

    #[tokio::test]
    async fn failed_home_still_gets_a_reply() {
        let state = state(directory());
        let text = reply_text(state.home("newcomer", " ").await, "Could not save address");
        assert_eq!(
            text,
            "Could not save address: No address registered; use `home <address>` first"
        );
        assert_eq!(reply_text(Ok("done".to_string()), "unused"), "done");
    }

    #[tokio::test]
    async fn home_validates_before_saving() {
        let state = state(directory());
        assert!(state.home("newcomer", "Nowhere").await.is_err());
        assert_eq!(state.directory.address_of("newcomer").await.unwrap(), None);

        state.home("newcomer", "Cafe").await.unwrap();
        assert_eq!(
            state.directory.address_of("newcomer").await.unwrap().as_deref(),
            Some("Cafe")
        );
    }

    #[tokio::test]
    async fn clear_drops_address_and_markers() {
        let state = state(directory());
        state.meet("me", "").await.unwrap();
        let text = state.clear("me").await.unwrap();
        assert_eq!(text, "Address cleared, 2 marker(s) removed.");
        assert_eq!(state.directory.address_of("me").await.unwrap(), None);
    }

    #[tokio::test]
    async fn nearby_reply_fits_in_one_message() {
        let mut geocoder = ScriptedGeocoder::new().with("Home", 0.0, 0.0);
        let mut profiles = vec![InMemoryDirectory::profile("me", Some("Home"))];
        for i in 1..=100u32 {
            let address = format!("{i} Jalan Sultan Ahmad Shah, George Town, Pulau Pinang");
            geocoder = geocoder.with(&address, 0.001 * f64::from(i), 0.0);
            profiles.push(InMemoryDirectory::profile(&format!("reader-{i}"), Some(address.as_str())));
        }
        let area = Polygon::new(
            LineString::from(vec![(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0), (-1.0, -1.0)]),
            vec![],
        );
        let mut state = state(InMemoryDirectory::new(profiles));
        state.isochrones =
            IsochroneFilter::new(Arc::new(geocoder), Arc::new(FixedIsochrone(Some(area))), 4);

        let text = state.nearby("me", "", 10).await.unwrap();
        assert!(text.len() <= 2000);
        assert!(text.starts_with("Within 10 min of Home by car:\n- 1 Jalan Sultan Ahmad Shah"));
        let listed = text.lines().filter(|l| l.starts_with("- ")).count();
        assert!(listed > 0 && listed < 100);
        let tail = format!("...and {} more.", 100 - listed);
        assert_eq!(text.lines().last(), Some(tail.as_str()));
    }

    #[tokio::test]
    async fn nearby_without_isochrone_says_nobody() {
        let state = state(directory());
        let text = state.nearby("me", "", 10).await.unwrap();
        assert_eq!(text, "Nobody is within 10 min of Home by car.");
    }

    #[test]
    fn empty_ranking_is_distinguishable() {
        let result = RankedResult {
            features: Vec::new(),
            diagnostics: vec![
                Diagnostic::CandidateSkipped {
                    owner_id: "a".into(),
                    address: "x".into(),
                    reason: SkipReason::GeocodeFailed,
                },
                Diagnostic::CandidateSkipped {
                    owner_id: "b".into(),
                    address: "y".into(),
                    reason: SkipReason::RouteFailed,
                },
            ],
        };
        assert_eq!(
            format_ranking("Home", &result, &LayerDiff::default()),
            "No meeting points found near Home.\n2 candidates could not be located."
        );
    }

    #[test]
    fn unavailable_times_render_as_na() {
        let destination = Coordinate::new(1.0, 1.0).unwrap();
        let result = RankedResult {
            features: vec![RouteFeature {
                owner_id: "o".into(),
                address: "Somewhere".into(),
                destination,
                geometry: vec![Coordinate::new(0.0, 0.0).unwrap(), destination],
                distance_m: 500.0,
                travel_times: TravelTimes {
                    driving: TravelTime::Minutes(2.4),
                    ..TravelTimes::default()
                },
            }],
            diagnostics: Vec::new(),
        };
        assert_eq!(
            format_ranking("Home", &result, &LayerDiff::default()),
            "Closest meeting points to Home:\n1. Somewhere (o) - 0.50 km | car 2 min, bike n/a, walk n/a"
        );
    }
}
