//! Persistence round-trips and weekly aggregation.

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use devblog_curator::aggregate::load_week;
use devblog_curator::model::{Article, DailyRecord};
use devblog_curator::storage::{daily_key, load_json, save_json, FsStorage, MemoryStorage, Storage};
use devblog_curator::week::WeekId;

fn classified(id: &str, minute: u32, score: f64) -> Article {
    Article {
        id: id.into(),
        title: format!("Title {id}"),
        url: format!("https://blog.test/{id}"),
        summary: "Summary with <unicode> ✓".into(),
        content: Some("Full body".into()),
        author: Some("Lin".into()),
        published_date: Utc.with_ymd_and_hms(2026, 10, 12, 8, 30, 15).unwrap(),
        source_feed: "blog".into(),
        tags: ["rust".to_string(), "async".to_string()].into(),
        category_scores: [("system_design".to_string(), score), ("ai_ml".to_string(), 12.25)].into(),
        classification_timestamp: Some(Utc.with_ymd_and_hms(2026, 10, 12, 9, minute, 0).unwrap()),
        classification_error: None,
    }
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
}

async fn put_day(storage: &dyn Storage, date: NaiveDate, articles: Vec<Article>) {
    let record = DailyRecord {
        date,
        generated_at: Utc::now(),
        articles,
    };
    save_json(storage, &daily_key(date), &record).await.unwrap();
}

#[tokio::test]
async fn article_round_trips_field_for_field_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let storage = FsStorage::new(dir.path());

    let mut fallback = classified("b", 1, 50.0);
    fallback.category_scores = [("technical_excellence".to_string(), 50.0)].into();
    fallback.classification_error = Some("classification timed out after 30s".into());
    fallback.content = None;
    fallback.author = None;

    let record = DailyRecord {
        date: day(12),
        generated_at: Utc::now(),
        articles: vec![classified("a", 0, 71.5), fallback],
    };
    save_json(&storage, "daily/2026-10-12", &record).await.unwrap();

    let back: DailyRecord = load_json(&storage, "daily/2026-10-12").await.unwrap().unwrap();
    assert_eq!(back, record);

    // Human-inspectable document.
    let raw = std::fs::read_to_string(dir.path().join("daily/2026-10-12.json")).unwrap();
    assert!(raw.contains("\"category_scores\""));
    assert!(raw.contains("\"classification_timestamp\""));
}

#[tokio::test]
async fn week_load_dedupes_with_last_write_wins() {
    let storage = MemoryStorage::new();
    // Monday and Wednesday of 2026-W42; Sunday of the previous week is outside.
    put_day(&storage, day(12), vec![classified("dup", 5, 20.0), classified("solo", 0, 30.0)]).await;
    put_day(&storage, day(14), vec![classified("dup", 40, 80.0)]).await;
    put_day(&storage, day(11), vec![classified("outside", 0, 90.0)]).await;

    let week = WeekId::from_date(day(14));
    let loaded = load_week(&storage, week).await.unwrap();

    assert_eq!(loaded.days_found, 2);
    assert_eq!(loaded.records_read, 3);
    let ids: Vec<&str> = loaded.articles.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, vec!["dup", "solo"]);
    assert_eq!(loaded.articles[0].category_scores["system_design"], 80.0);
}

#[tokio::test]
async fn later_timestamp_wins_even_from_an_earlier_day() {
    let storage = MemoryStorage::new();
    put_day(&storage, day(12), vec![classified("dup", 50, 99.0)]).await;
    put_day(&storage, day(13), vec![classified("dup", 10, 11.0)]).await;

    let loaded = load_week(&storage, WeekId::from_date(day(12))).await.unwrap();
    assert_eq!(loaded.articles.len(), 1);
    assert_eq!(loaded.articles[0].category_scores["system_design"], 99.0);
}

#[tokio::test]
async fn equal_timestamps_prefer_the_later_day() {
    let storage = MemoryStorage::new();
    put_day(&storage, day(12), vec![classified("dup", 0, 15.0)]).await;
    put_day(&storage, day(16), vec![classified("dup", 0, 65.0)]).await;

    let loaded = load_week(&storage, WeekId::from_date(day(12))).await.unwrap();
    assert_eq!(loaded.articles[0].category_scores["system_design"], 65.0);
}

#[tokio::test]
async fn empty_week_loads_nothing() {
    let storage = MemoryStorage::new();
    let week = WeekId::from_date(day(1) - Duration::days(60));
    let loaded = load_week(&storage, week).await.unwrap();
    assert_eq!(loaded.days_found, 0);
    assert!(loaded.articles.is_empty());
}

#[tokio::test]
async fn corrupt_daily_record_is_an_error() {
    let storage = MemoryStorage::new();
    storage.save(&daily_key(day(13)), "{not json").await.unwrap();
    assert!(load_week(&storage, WeekId::from_date(day(13))).await.is_err());
}
