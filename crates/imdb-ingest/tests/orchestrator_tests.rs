//! End-to-end sync runs against a mocked dataset host
//!
//! The mock server serves gzipped TSV fixtures; records land in a
//! `MemoryStore`, and staged files go to a temporary directory.

use flate2::write::GzEncoder;
use flate2::Compression;
use imdb_ingest::datasets::{DatasetKind, Episode, Rating, Title, TitleAka};
use imdb_ingest::source::SourceError;
use imdb_ingest::store::{BatchSink, MemoryStore, SyncMarkerStore};
use imdb_ingest::writer::ConflictPolicy;
use imdb_ingest::{SyncConfig, SyncError, SyncOrchestrator, SyncState};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TITLES: &str = "tconst\ttitleType\tprimaryTitle\toriginalTitle\tisAdult\tstartYear\tendYear\truntimeMinutes\tgenres\n\
tt0000001\tshort\tCarmencita\tCarmencita\t0\t1894\t\\N\t1\tDocumentary,Short\n\
tt0000002\tshort\tLe clown et ses chiens\tLe clown et ses chiens\t0\t1892\t\\N\t5\tAnimation,Short\n\
tt0000003\tmovie\tPauvre Pierrot\tPauvre Pierrot\t1\t1892\t\\N\t4\tAnimation,Comedy,Romance\n";

const EPISODES: &str = "tconst\tparentTconst\tseasonNumber\tepisodeNumber\n\
tt0041951\ttt0041038\t1\t9\n\
tt0042816\ttt0989125\t1\t17\n\
tt0043426\ttt0040051\t3\t42\n";

const RATINGS: &str = "tconst\taverageRating\tnumVotes\n\
tt0000001\t5.7\t1989\n\
tt0000002\t5.8\t265\n";

const AKAS: &str = "titleId\tordering\ttitle\tregion\tlanguage\ttypes\tattributes\tisOriginalTitle\n\
tt0000001\t1\tCarmencita\t\\N\t\\N\toriginal\t\\N\t1\n\
tt0000001\t2\tCarmencita\tDE\t\\N\t\\N\tliteral title\t0\n\
tt0000001\t3\tCarmencita\tDE\t\\N\t\\N\t\\N\t1\n";

fn gzip(content: &str) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(content.as_bytes()).unwrap();
    encoder.finish().unwrap()
}

async fn serve(server: &MockServer, kind: DatasetKind, content: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/{}", kind.file_name())))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(gzip(content)))
        .mount(server)
        .await;
}

async fn serve_all(server: &MockServer) {
    serve(server, DatasetKind::Titles, TITLES).await;
    serve(server, DatasetKind::Episodes, EPISODES).await;
    serve(server, DatasetKind::Ratings, RATINGS).await;
    serve(server, DatasetKind::Akas, AKAS).await;
}

fn sync_config(server: &MockServer, staging: &TempDir) -> SyncConfig {
    SyncConfig {
        base_url: server.uri(),
        staging_dir: staging.path().to_path_buf(),
        batch_size: 2,
        channel_capacity: 8,
        ..SyncConfig::default()
    }
}

fn orchestrator(config: &SyncConfig, store: &Arc<MemoryStore>) -> SyncOrchestrator {
    SyncOrchestrator::for_store(config, reqwest::Client::new(), Arc::clone(store)).unwrap()
}

#[tokio::test]
async fn test_full_sync() {
    let server = MockServer::start().await;
    serve_all(&server).await;
    let staging = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    let sync = orchestrator(&sync_config(&server, &staging), &store);

    assert_eq!(sync.last_sync_time().await.unwrap(), None);

    let report = sync.run_sync().await.unwrap();

    let per_dataset: Vec<(&str, u64, u64)> = report
        .datasets
        .iter()
        .map(|d| (d.dataset.as_str(), d.records, d.batches))
        .collect();
    assert_eq!(
        per_dataset,
        vec![
            ("titles", 3, 2),
            ("episodes", 3, 2),
            ("ratings", 2, 1),
            ("akas", 3, 2),
        ]
    );

    assert_eq!(store.len("imdb_titles"), 3);
    assert_eq!(store.len("imdb_episodes"), 3);
    assert_eq!(store.len("imdb_ratings"), 2);
    // Two DE rows share a composite key; the first one wins
    assert_eq!(store.len("imdb_title_akas"), 2);
    let de = store
        .get::<TitleAka>(&["tt0000001", "DE", "", "Carmencita"])
        .unwrap();
    assert!(!de.is_original_title);

    let carmencita = store.get::<Title>(&["tt0000001"]).unwrap();
    assert_eq!(carmencita.end_year, 0);
    assert_eq!(carmencita.genres, vec!["Documentary", "Short"]);
    assert_eq!(store.get::<Episode>(&["tt0043426"]).unwrap().episode_number, 42);
    assert_eq!(store.get::<Rating>(&["tt0000001"]).unwrap().num_votes, 1989);

    assert_eq!(sync.last_sync_time().await.unwrap(), Some(report.marker));
    assert_eq!(sync.state(), SyncState::Idle);
}

#[tokio::test]
async fn test_sync_refreshes_statistics() {
    let server = MockServer::start().await;
    serve_all(&server).await;
    let staging = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    let sync = orchestrator(&sync_config(&server, &staging), &store);

    let report = sync.run_sync().await.unwrap();
    let snapshot = sync.statistics().current().unwrap();

    assert_eq!(snapshot.as_of, Some(report.marker));
    assert_eq!(snapshot.count, 3);
    assert_eq!(snapshot.totals["imdb_title_akas"], 2);
    assert_eq!(snapshot.predicates["adult"], 1);

    let genres: Vec<(&str, i64)> = snapshot
        .group("genres")
        .iter()
        .map(|g| (g.key.as_str(), g.count))
        .collect();
    assert_eq!(
        genres,
        vec![
            ("Animation", 2),
            ("Comedy", 1),
            ("Documentary", 1),
            ("Romance", 1),
            ("Short", 2),
        ]
    );

    let types: Vec<(&str, i64)> = snapshot
        .group("types")
        .iter()
        .map(|g| (g.key.as_str(), g.count))
        .collect();
    assert_eq!(types, vec![("movie", 1), ("short", 2)]);
}

#[tokio::test]
async fn test_malformed_row_keeps_completed_batches() {
    let mut titles = String::from("tconst\ttitleType\tprimaryTitle\tisAdult\tstartYear\tgenres\n");
    for row in 1..=1000 {
        let adult = if row == 50 { "maybe" } else { "0" };
        titles.push_str(&format!("tt{row:07}\tmovie\tTitle {row}\t{adult}\t1900\tDrama\n"));
    }

    let server = MockServer::start().await;
    serve(&server, DatasetKind::Titles, &titles).await;
    serve(&server, DatasetKind::Ratings, RATINGS).await;
    let staging = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());

    let config = SyncConfig {
        datasets: vec![DatasetKind::Titles, DatasetKind::Ratings],
        batch_size: 10,
        ..sync_config(&server, &staging)
    };
    let sync = orchestrator(&config, &store);

    let err = sync.run_sync().await.unwrap_err();
    match &err {
        SyncError::Decode {
            dataset,
            committed_batches,
            source,
        } => {
            assert_eq!(dataset, "titles");
            assert_eq!(*committed_batches, 4);
            // Header is line 1, so data row 50 is line 51
            assert_eq!(source.line(), Some(51));
        }
        other => panic!("expected decode failure, got {other:?}"),
    }

    assert_eq!(store.flushes("imdb_titles"), vec![10; 4]);
    assert_eq!(store.len("imdb_titles"), 40);
    assert!(store.get::<Title>(&["tt0000040"]).is_some());
    assert!(store.get::<Title>(&["tt0000041"]).is_none());
    assert!(store.get::<Title>(&["tt0000050"]).is_none());

    // The run stopped at the failing dataset
    assert!(store.is_empty("imdb_ratings"));
    assert!(store.markers().is_empty());
    assert!(sync.statistics().current().is_none());
    assert_eq!(sync.state(), SyncState::Idle);
}

#[tokio::test]
async fn test_store_failure_names_dataset() {
    let server = MockServer::start().await;
    serve_all(&server).await;
    let staging = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    store.fail_on_batch("imdb_episodes", 2);

    let sync = orchestrator(&sync_config(&server, &staging), &store);
    let err = sync.run_sync().await.unwrap_err();

    assert!(matches!(err, SyncError::Write { .. }));
    assert_eq!(err.dataset(), Some("episodes"));
    assert_eq!(err.committed_batches(), Some(1));
    assert_eq!(store.len("imdb_titles"), 3);
    assert_eq!(store.len("imdb_episodes"), 2);
}

#[tokio::test]
async fn test_missing_dataset_is_retrieval_error() {
    let server = MockServer::start().await;
    serve(&server, DatasetKind::Titles, TITLES).await;
    let staging = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    let sync = orchestrator(&sync_config(&server, &staging), &store);

    let err = sync.run_sync().await.unwrap_err();
    match err {
        SyncError::Source(SourceError::Retrieval { dataset, reason, .. }) => {
            assert_eq!(dataset, "episodes");
            assert!(reason.contains("404"));
        }
        other => panic!("expected retrieval failure, got {other:?}"),
    }

    // Titles finished before the failure and stay written
    assert_eq!(store.len("imdb_titles"), 3);
    assert!(store.markers().is_empty());
}

#[tokio::test]
async fn test_plain_text_body_is_decompression_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/{}", DatasetKind::Ratings.file_name())))
        .respond_with(ResponseTemplate::new(200).set_body_string(RATINGS))
        .mount(&server)
        .await;
    let staging = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());

    let config = SyncConfig {
        datasets: vec![DatasetKind::Ratings],
        ..sync_config(&server, &staging)
    };
    let err = orchestrator(&config, &store).run_sync().await.unwrap_err();

    assert!(matches!(
        err,
        SyncError::Source(SourceError::Decompression { .. })
    ));
    assert!(store.is_empty("imdb_ratings"));
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let server = MockServer::start().await;
    serve_all(&server).await;
    let staging = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    let sync = orchestrator(&sync_config(&server, &staging), &store);

    let first = sync.run_sync().await.unwrap();
    let titles = store.rows::<Title>();
    let akas = store.rows::<TitleAka>();

    let second = sync.run_sync().await.unwrap();
    assert_eq!(store.rows::<Title>(), titles);
    assert_eq!(store.rows::<TitleAka>(), akas);

    assert!(second.marker > first.marker);
    assert_eq!(store.markers(), vec![first.marker, second.marker]);
    assert_eq!(
        sync.statistics().current().unwrap().as_of,
        Some(second.marker)
    );
}

#[tokio::test]
async fn test_concurrent_run_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/{}", DatasetKind::Ratings.file_name())))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(gzip(RATINGS))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;
    let staging = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());

    let config = SyncConfig {
        datasets: vec![DatasetKind::Ratings],
        ..sync_config(&server, &staging)
    };
    let sync = orchestrator(&config, &store);

    let (first, (state, second)) = tokio::join!(sync.run_sync(), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        (sync.state(), sync.run_sync().await)
    });

    assert_eq!(
        state,
        SyncState::Fetching {
            dataset: "ratings".into()
        }
    );
    assert!(matches!(second, Err(SyncError::AlreadyRunning)));
    assert!(first.is_ok());
    assert_eq!(store.markers().len(), 1);
}

#[tokio::test]
async fn test_reads_do_not_wait_for_running_sync() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/{}", DatasetKind::Ratings.file_name())))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(gzip(RATINGS))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;
    let staging = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());

    // State left by an earlier sync
    let earlier = Title {
        tconst: "tt0000001".into(),
        title_type: "short".into(),
        ..Title::default()
    };
    BatchSink::<Title>::write_batch(store.as_ref(), &[earlier], ConflictPolicy::Merge)
        .await
        .unwrap();
    let previous_marker = chrono::Utc::now() - chrono::Duration::hours(1);
    store.record_marker(previous_marker).await.unwrap();

    let config = SyncConfig {
        datasets: vec![DatasetKind::Ratings],
        ..sync_config(&server, &staging)
    };
    let sync = orchestrator(&config, &store);
    let previous = sync.statistics().get().await.unwrap();
    assert_eq!(previous.as_of, Some(previous_marker));

    let read_budget = Duration::from_millis(100);
    let (report, (state, during, last_sync)) = tokio::join!(sync.run_sync(), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let state = sync.state();
        let during = tokio::time::timeout(read_budget, sync.statistics().get())
            .await
            .expect("statistics read blocked on the running sync")
            .unwrap();
        let last_sync = tokio::time::timeout(read_budget, sync.last_sync_time())
            .await
            .expect("marker read blocked on the running sync")
            .unwrap();
        (state, during, last_sync)
    });

    assert_eq!(
        state,
        SyncState::Fetching {
            dataset: "ratings".into()
        }
    );
    assert!(Arc::ptr_eq(&previous, &during));
    assert_eq!(last_sync, Some(previous_marker));

    let report = report.unwrap();
    let fresh = sync.statistics().get().await.unwrap();
    assert_eq!(fresh.as_of, Some(report.marker));
    assert_eq!(fresh.totals["imdb_ratings"], 2);
}

#[tokio::test]
async fn test_staged_files_removed_unless_kept() {
    let server = MockServer::start().await;
    serve(&server, DatasetKind::Ratings, RATINGS).await;
    let store = Arc::new(MemoryStore::new());

    let staging = TempDir::new().unwrap();
    let config = SyncConfig {
        datasets: vec![DatasetKind::Ratings],
        ..sync_config(&server, &staging)
    };
    orchestrator(&config, &store).run_sync().await.unwrap();
    assert!(!staging.path().join("ratings.tsv.gz").exists());

    let kept = TempDir::new().unwrap();
    let config = SyncConfig {
        datasets: vec![DatasetKind::Ratings],
        keep_staged_files: true,
        ..sync_config(&server, &kept)
    };
    orchestrator(&config, &store).run_sync().await.unwrap();
    assert!(kept.path().join("ratings.tsv.gz").exists());
    assert!(!kept.path().join("ratings.tsv.gz.part").exists());
}
