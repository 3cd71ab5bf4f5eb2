use std::sync::Arc;

use bookmeet::{
    ranking::{Candidate, Diagnostic, Ranker, SkipReason, TravelTime},
    services::{database::ProfileDirectory, TravelMode},
    session::SearchSessions,
    test_helpers::{InMemoryDirectory, PendingGeocoder, ScriptedGeocoder, ScriptedMatrix, ScriptedRouter},
    RankError,
};

fn penang() -> (ScriptedGeocoder, ScriptedRouter, ScriptedMatrix) {
    let geocoder = ScriptedGeocoder::new()
        .with("Universiti Sains Malaysia", 100.3029, 5.3559)
        .with("Queensbay Mall", 100.3069, 5.3343)
        .with("Gurney Plaza", 100.3095, 5.4372)
        .with("Penang Hill", 100.2693, 5.4085)
        .with("Komtar", 100.3293, 5.4145)
        .not_found("Atlantis Library");
    let router = ScriptedRouter::new()
        .to(100.3069, 5.3343, 3100.0)
        .to(100.3095, 5.4372, 12800.0)
        .to(100.2693, 5.4085, 9400.0)
        .to(100.3293, 5.4145, 8700.0);
    let matrix = ScriptedMatrix::new()
        .uniform(100.3069, 5.3343, 7.0)
        .uniform(100.3095, 5.4372, 21.0)
        .uniform(100.2693, 5.4085, 18.0)
        .uniform(100.3293, 5.4145, 16.0)
        .truncated(TravelMode::Walking, 2);
    (geocoder, router, matrix)
}

async fn candidates() -> Vec<Candidate> {
    let directory = InMemoryDirectory::new(vec![
        InMemoryDirectory::profile("reader-1", Some("Gurney Plaza")),
        InMemoryDirectory::profile("reader-2", Some("Queensbay Mall")),
        InMemoryDirectory::profile("reader-3", Some("Atlantis Library")),
        InMemoryDirectory::profile("reader-4", Some("Komtar")),
        InMemoryDirectory::profile("reader-5", Some("Penang Hill")),
        InMemoryDirectory::profile("me", Some("Universiti Sains Malaysia")),
        InMemoryDirectory::profile("reader-6", None),
    ]);
    directory.candidates().await.unwrap()
}

#[tokio::test]
async fn ranks_directory_candidates_end_to_end() {
    let (geocoder, router, matrix) = penang();
    let ranker = Ranker::new(Arc::new(geocoder), Arc::new(router), Arc::new(matrix), 3);

    let result = ranker
        .rank("Universiti Sains Malaysia", &candidates().await, 3)
        .await
        .unwrap();

    let owners: Vec<&str> = result.features.iter().map(|f| f.owner_id.as_str()).collect();
    assert_eq!(owners, vec!["reader-2", "reader-4", "reader-5"]);
    assert!(result
        .features
        .windows(2)
        .all(|pair| pair[0].distance_m <= pair[1].distance_m));
    assert!(result.features.iter().all(|f| f.geometry.len() >= 2));

    assert_eq!(result.features[2].travel_times.walking, TravelTime::Unavailable);
    assert_eq!(result.features[2].travel_times.cycling, TravelTime::Minutes(54.0));
    assert_eq!(result.features[1].travel_times.walking, TravelTime::Minutes(160.0));

    let mut skipped: Vec<(&str, SkipReason)> = result.skipped().collect();
    skipped.sort();
    assert_eq!(
        skipped,
        vec![
            ("me", SkipReason::SelfMatch),
            ("reader-3", SkipReason::GeocodeFailed),
        ]
    );
    assert_eq!(
        result
            .diagnostics
            .iter()
            .filter(|d| matches!(d, Diagnostic::TravelTimeUnavailable { .. }))
            .count(),
        1
    );

    let collection = result.to_feature_collection();
    assert_eq!(collection.features.len(), 3);
}

#[tokio::test]
async fn superseded_search_is_cancelled() {
    let ranker = Ranker::new(
        Arc::new(PendingGeocoder),
        Arc::new(ScriptedRouter::new()),
        Arc::new(ScriptedMatrix::new()),
        2,
    );
    let sessions = SearchSessions::new();
    let candidates = candidates().await;

    let first = sessions.begin("me");
    let search = ranker.rank_cancellable("Universiti Sains Malaysia", &candidates, 3, &first.token);
    let _second = sessions.begin("me");

    assert_eq!(search.await.unwrap_err(), RankError::Cancelled);
    assert!(!sessions.finish(&first));
}
