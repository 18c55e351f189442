//! Integration tests for snapshot + transactional restore.

use std::time::Duration;

use chrono::Utc;

use backlogus_db::test_fixtures::{sample_entry, sample_game, MemoryImageCache, TestDataBuilder, TestDatabase};
use backlogus_db::{
    read_archive, write_archive, CredentialRepository, Database, DecodedArchive, Error,
    ExportBundle, Game, ImageCache, ImportStep, LibraryStatus, MediaKind, Movie, RestoreBudget,
    UserRepository,
};

type Tuple = (i64, LibraryStatus, Option<f64>, Option<String>);

async fn export(db: &Database, user_id: i64, images: &dyn ImageCache) -> Vec<u8> {
    let snapshot = db.backup.snapshot(user_id).await.unwrap();
    let images = images.get_all().await.unwrap();
    write_archive(&ExportBundle::from_snapshot(snapshot, images, Utc::now())).unwrap()
}

async fn export_decoded(db: &Database, user_id: i64) -> DecodedArchive {
    read_archive(&export(db, user_id, &MemoryImageCache::new()).await).unwrap()
}

async fn game_tuples(db: &Database, user_id: i64) -> Vec<Tuple> {
    let mut out: Vec<Tuple> = db
        .library
        .list_items_for_user::<Game>(user_id)
        .await
        .unwrap()
        .into_iter()
        .map(|i| (i.catalog.igdb_id, i.entry.status, i.entry.rating, i.entry.notes))
        .collect();
    out.sort_by_key(|t| t.0);
    out
}

async fn movie_tuples(db: &Database, user_id: i64) -> Vec<Tuple> {
    let mut out: Vec<Tuple> = db
        .library
        .list_items_for_user::<Movie>(user_id)
        .await
        .unwrap()
        .into_iter()
        .map(|i| (i.catalog.tmdb_id, i.entry.status, i.entry.rating, i.entry.notes))
        .collect();
    out.sort_by_key(|t| t.0);
    out
}

async fn catalog_counts(db: &Database) -> [i64; 4] {
    [
        db.catalog.count::<Game>().await.unwrap(),
        db.catalog.count::<Movie>().await.unwrap(),
        db.catalog.count::<backlogus_db::Show>().await.unwrap(),
        db.catalog.count::<backlogus_db::Book>().await.unwrap(),
    ]
}

#[tokio::test]
async fn test_round_trip_into_same_account_preserves_library() {
    let test_db = TestDatabase::new().await;
    let db = &test_db.db;
    let data = TestDataBuilder::new(db, "owner@example.com")
        .with_game(100, LibraryStatus::Completed, Some("great ending"))
        .with_game(200, LibraryStatus::Backlog, None)
        .with_movie(55, LibraryStatus::Dropped, Some("too long"))
        .with_show(1396, LibraryStatus::Active, None)
        .with_book(427, LibraryStatus::Paused, Some("ch. 12"))
        .with_credential("igdb")
        .build()
        .await;

    let games_before = game_tuples(db, data.user_id).await;
    let movies_before = movie_tuples(db, data.user_id).await;
    let catalog_before = catalog_counts(db).await;

    let archive = export_decoded(db, data.user_id).await;
    let summary = db
        .backup
        .restore(data.user_id, &archive, RestoreBudget::default())
        .await
        .unwrap();

    assert!(summary.profile);
    assert_eq!(summary.api_credentials, 1);
    assert_eq!(summary.library_entries.total(), 5);
    assert_eq!(summary.catalog_created.total(), 0);
    assert_eq!(summary.catalog_reused.total(), 5);
    assert_eq!(summary.skipped_entries.total(), 0);

    assert_eq!(game_tuples(db, data.user_id).await, games_before);
    assert_eq!(movie_tuples(db, data.user_id).await, movies_before);
    assert_eq!(catalog_counts(db).await, catalog_before);

    let shows = db.library.list_for_user(MediaKind::Show, data.user_id).await.unwrap();
    assert_eq!(shows[0].current_episode, Some(5));
    let books = db.library.list_for_user(MediaKind::Book, data.user_id).await.unwrap();
    assert_eq!(books[0].current_page, Some(120));

    let credentials = db.credentials.list_for_user(data.user_id).await.unwrap();
    assert_eq!(credentials.len(), 1);
    assert_eq!(credentials[0].client_secret.as_deref(), Some("igdb-secret"));
}

#[tokio::test]
async fn test_import_reuses_catalog_rows_owned_by_other_users() {
    let test_db = TestDatabase::new().await;
    let db = &test_db.db;
    let a = TestDataBuilder::new(db, "a@example.com")
        .with_game(100, LibraryStatus::Completed, Some("A's notes"))
        .with_movie(55, LibraryStatus::Backlog, None)
        .build()
        .await;
    let b = TestDataBuilder::new(db, "b@example.com")
        .with_game(100, LibraryStatus::Active, Some("B's notes"))
        .build()
        .await;
    let c = TestDataBuilder::new(db, "c@example.com").build().await;

    let b_before = game_tuples(db, b.user_id).await;
    let b_entries_before = db.library.list_for_user(MediaKind::Game, b.user_id).await.unwrap();
    let games_before = db.catalog.count::<Game>().await.unwrap();

    let archive = export_decoded(db, a.user_id).await;
    let summary = db
        .backup
        .restore(c.user_id, &archive, RestoreBudget::default())
        .await
        .unwrap();

    assert_eq!(summary.catalog_created.games, 0);
    assert_eq!(summary.catalog_reused.games, 1);
    assert_eq!(db.catalog.count::<Game>().await.unwrap(), games_before);

    let c_games = db.library.list_for_user(MediaKind::Game, c.user_id).await.unwrap();
    assert_eq!(c_games.len(), 1);
    assert_eq!(c_games[0].catalog_item_id, b.catalog_ids(MediaKind::Game)[0]);
    assert_eq!(c_games[0].notes.as_deref(), Some("A's notes"));

    assert_eq!(game_tuples(db, b.user_id).await, b_before);
    assert_eq!(
        db.library.list_for_user(MediaKind::Game, b.user_id).await.unwrap(),
        b_entries_before
    );
}

#[tokio::test]
async fn test_failure_inside_library_restore_rolls_back_everything() {
    let test_db = TestDatabase::new().await;
    let db = &test_db.db;
    let data = TestDataBuilder::new(db, "owner@example.com")
        .with_game(100, LibraryStatus::Completed, Some("keep me"))
        .with_game(200, LibraryStatus::Backlog, None)
        .with_movie(55, LibraryStatus::Active, Some("watching"))
        .with_credential("tmdb")
        .build()
        .await;

    let mut archive = export_decoded(db, data.user_id).await;
    archive.dump.catalog_items.games.push(Game {
        id: 9_001,
        ..sample_game(777)
    });
    archive.dump.library_entries.games.push({
        let mut entry = sample_entry(LibraryStatus::Backlog, None);
        entry.catalog_item_id = 9_001;
        entry
    });
    archive.dump.library_entries.movies[0].notes = Some("poison".to_string());
    archive.user_data.profile.first_name = Some("Changed".to_string());

    sqlx::query(
        "CREATE TRIGGER poison_movie BEFORE INSERT ON user_movies
         WHEN NEW.notes = 'poison'
         BEGIN SELECT RAISE(ABORT, 'injected failure'); END",
    )
    .execute(&test_db.pool)
    .await
    .unwrap();

    let before = db.backup.snapshot(data.user_id).await.unwrap();
    let catalog_before = catalog_counts(db).await;

    let err = db
        .backup
        .restore(data.user_id, &archive, RestoreBudget::default())
        .await
        .unwrap_err();
    match err {
        Error::ImportFailed { step, .. } => assert_eq!(step, ImportStep::RestoreLibrary),
        other => panic!("Expected ImportFailed, got {:?}", other),
    }

    let after = db.backup.snapshot(data.user_id).await.unwrap();
    assert_eq!(after.profile, before.profile);
    assert_eq!(after.credentials, before.credentials);
    assert_eq!(after.games, before.games);
    assert_eq!(after.movies, before.movies);
    assert_eq!(after.shows, before.shows);
    assert_eq!(after.books, before.books);
    assert_eq!(catalog_counts(db).await, catalog_before);
}

#[tokio::test]
async fn test_dangling_library_entry_is_skipped_and_counted() {
    let test_db = TestDatabase::new().await;
    let db = &test_db.db;
    let data = TestDataBuilder::new(db, "owner@example.com")
        .with_game(100, LibraryStatus::Completed, None)
        .with_game(200, LibraryStatus::Active, None)
        .with_movie(55, LibraryStatus::Backlog, None)
        .build()
        .await;

    let mut archive = export_decoded(db, data.user_id).await;
    archive.dump.library_entries.games.push({
        let mut entry = sample_entry(LibraryStatus::Dropped, Some("orphan"));
        entry.catalog_item_id = 424_242;
        entry
    });

    let summary = db
        .backup
        .restore(data.user_id, &archive, RestoreBudget::default())
        .await
        .unwrap();

    assert_eq!(summary.skipped_entries.games, 1);
    assert_eq!(summary.library_entries.games, 2);
    assert_eq!(summary.library_entries.movies, 1);
    assert_eq!(
        db.library.count_for_user(MediaKind::Game, data.user_id).await.unwrap(),
        2
    );
}

#[tokio::test]
async fn test_duplicate_entries_for_one_catalog_item_are_skipped() {
    let test_db = TestDatabase::new().await;
    let db = &test_db.db;
    let data = TestDataBuilder::new(db, "owner@example.com")
        .with_game(100, LibraryStatus::Completed, None)
        .build()
        .await;

    let mut archive = export_decoded(db, data.user_id).await;
    let duplicate = archive.dump.library_entries.games[0].clone();
    archive.dump.library_entries.games.push(duplicate);

    let summary = db
        .backup
        .restore(data.user_id, &archive, RestoreBudget::default())
        .await
        .unwrap();

    assert_eq!(summary.library_entries.games, 1);
    assert_eq!(summary.skipped_entries.games, 1);
}

#[tokio::test]
async fn test_import_never_changes_email() {
    let test_db = TestDatabase::new().await;
    let db = &test_db.db;
    let data = TestDataBuilder::new(db, "live@example.com")
        .with_game(100, LibraryStatus::Backlog, None)
        .build()
        .await;

    let mut archive = export_decoded(db, data.user_id).await;
    archive.user_data.profile.email = "someone-else@example.com".to_string();
    archive.user_data.profile.timezone = Some("Asia/Tokyo".to_string());
    archive.user_data.profile.theme_preference = Some("dark".to_string());

    db.backup
        .restore(data.user_id, &archive, RestoreBudget::default())
        .await
        .unwrap();

    let profile = db.users.get_profile(data.user_id).await.unwrap();
    assert_eq!(profile.email, "live@example.com");
    assert_eq!(profile.timezone.as_deref(), Some("Asia/Tokyo"));
    assert_eq!(profile.theme_preference.as_deref(), Some("dark"));

    let hash: String = sqlx::query_scalar("SELECT password_hash FROM users WHERE id = ?")
        .bind(data.user_id)
        .fetch_one(&test_db.pool)
        .await
        .unwrap();
    assert_eq!(hash, "$argon2id$v=19$test");
}

#[tokio::test]
async fn test_concrete_scenario_into_fresh_deployment() {
    let source = TestDatabase::new().await;
    let data = TestDataBuilder::new(&source.db, "owner@example.com")
        .with_game(100, LibraryStatus::Completed, Some("first"))
        .with_game(200, LibraryStatus::Backlog, Some("second"))
        .with_movie(55, LibraryStatus::Active, Some("third"))
        .build()
        .await;

    let images = MemoryImageCache::new();
    for url in ["https://img.example.com/co100.jpg", "https://img.example.com/co200.jpg"] {
        images.cache(url).await.unwrap();
    }
    let bytes = export(&source.db, data.user_id, &images).await;
    let archive = read_archive(&bytes).unwrap();

    assert_eq!(archive.dump.catalog_items.games.len(), 2);
    assert_eq!(archive.dump.library_entries.games.len(), 2);
    assert_eq!(archive.dump.catalog_items.movies.len(), 1);
    assert_eq!(archive.user_data.api_credentials.len(), 0);
    assert_eq!(archive.images.len(), 2);

    // Fresh deployment whose ID sequences are already advanced by unrelated rows
    let target = TestDatabase::new().await;
    TestDataBuilder::new(&target.db, "other@example.com")
        .with_game(1, LibraryStatus::Backlog, None)
        .with_game(2, LibraryStatus::Backlog, None)
        .with_game(3, LibraryStatus::Backlog, None)
        .with_movie(1, LibraryStatus::Backlog, None)
        .build()
        .await;
    let fresh = TestDataBuilder::new(&target.db, "fresh@example.com").build().await;

    let summary = target
        .db
        .backup
        .restore(fresh.user_id, &archive, RestoreBudget::default())
        .await
        .unwrap();
    assert_eq!(summary.catalog_created.games, 2);
    assert_eq!(summary.catalog_created.movies, 1);

    let games = target
        .db
        .library
        .list_items_for_user::<Game>(fresh.user_id)
        .await
        .unwrap();
    let movies = target
        .db
        .library
        .list_items_for_user::<Movie>(fresh.user_id)
        .await
        .unwrap();
    assert_eq!(games.len(), 2);
    assert_eq!(movies.len(), 1);

    for restored in &games {
        let original = archive
            .dump
            .catalog_items
            .games
            .iter()
            .find(|g| g.igdb_id == restored.catalog.igdb_id)
            .unwrap();
        assert_ne!(restored.catalog.id, original.id);
        let original_entry = archive
            .dump
            .library_entries
            .games
            .iter()
            .find(|e| e.catalog_item_id == original.id)
            .unwrap();
        assert_eq!(restored.entry.status, original_entry.status);
        assert_eq!(restored.entry.notes, original_entry.notes);
        assert_ne!(restored.entry.user_id, original_entry.user_id);
    }
    assert_eq!(movies[0].catalog.tmdb_id, 55);
    assert_eq!(movies[0].entry.notes.as_deref(), Some("third"));
}

#[tokio::test]
async fn test_restore_exceeding_budget_times_out_without_changes() {
    let test_db = TestDatabase::new().await;
    let db = &test_db.db;
    let data = TestDataBuilder::new(db, "owner@example.com")
        .with_game(100, LibraryStatus::Completed, Some("unchanged"))
        .build()
        .await;

    let mut archive = export_decoded(db, data.user_id).await;
    archive.dump.library_entries.games[0].notes = Some("changed".to_string());

    let err = db
        .backup
        .restore(data.user_id, &archive, RestoreBudget::new(Duration::ZERO, Duration::ZERO))
        .await
        .unwrap_err();
    assert!(
        matches!(err, Error::ImportFailed { step: ImportStep::Timeout, .. }),
        "got {:?}",
        err
    );

    // Give the pool a moment to roll back the abandoned transaction
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        game_tuples(db, data.user_id).await,
        vec![(100, LibraryStatus::Completed, Some(4.0), Some("unchanged".to_string()))]
    );
}

#[tokio::test]
async fn test_restore_for_unknown_user_is_not_found() {
    let test_db = TestDatabase::new().await;
    let db = &test_db.db;
    let data = TestDataBuilder::new(db, "owner@example.com").build().await;
    let archive = export_decoded(db, data.user_id).await;

    let err = db
        .backup
        .restore(data.user_id + 1000, &archive, RestoreBudget::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
    assert!(db.users.exists(data.user_id).await.unwrap());
}

#[tokio::test]
async fn test_snapshot_for_unknown_user_is_not_found() {
    let test_db = TestDatabase::new().await;
    let err = test_db.db.backup.snapshot(12345).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}
