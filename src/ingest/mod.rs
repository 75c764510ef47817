// src/ingest/mod.rs
pub mod discovery;
pub mod providers;
pub mod types;

use crate::cancel::{CancellationToken, Cancelled};
use crate::ingest::types::{FeedOutcome, FeedSource, FetchReport, ProcessReport};
use crate::model::{Article, CategoryScores, Feed, RawArticle};
use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashSet};
use std::time::{Duration, Instant};

/// Upper bound for stored article bodies (characters).
pub const MAX_BODY_CHARS: usize = 20_000;

/// One-time metrics registration (so series show up in the exposition).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_feeds_total", "Feeds attempted in a fetch fan-out.");
        describe_counter!(
            "ingest_feed_errors_total",
            "Feeds that failed or timed out (skipped)."
        );
        describe_counter!(
            "ingest_articles_total",
            "Raw entries returned by feed sources."
        );
        describe_counter!(
            "ingest_dropped_total",
            "Entries dropped by processing (empty or duplicate id)."
        );
        describe_histogram!("ingest_fetch_ms", "Per-feed fetch+parse time in milliseconds.");
    });
}

/// Normalize text: decode entities, strip tags, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize typographic quotes to ASCII
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 5) Length cap
    if out.chars().count() > MAX_BODY_CHARS {
        out = out.chars().take(MAX_BODY_CHARS).collect();
    }

    out
}

/// Stable article identity: GUID, else link, else a hash of title + publish time.
pub fn article_id(
    guid: Option<&str>,
    link: Option<&str>,
    title: &str,
    published: Option<DateTime<Utc>>,
) -> String {
    if let Some(g) = guid.map(str::trim).filter(|g| !g.is_empty()) {
        return g.to_string();
    }
    if let Some(l) = link.map(str::trim).filter(|l| !l.is_empty()) {
        return l.to_string();
    }
    let mut hasher = Sha256::new();
    hasher.update(title.trim().as_bytes());
    hasher.update(b"|");
    if let Some(p) = published {
        hasher.update(p.to_rfc3339().as_bytes());
    }
    let digest = hasher.finalize();
    let mut out = String::from("sha256:");
    for b in digest.iter().take(12) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Process stage: normalize, drop empty entries, dedupe by id (first wins),
/// and default a missing publish time to `now`.
pub fn process_batch(raw: Vec<RawArticle>, now: DateTime<Utc>) -> ProcessReport {
    ensure_metrics_described();

    let mut report = ProcessReport::default();
    let mut seen: HashSet<String> = HashSet::new();

    for r in raw {
        let title = normalize_text(&r.title);
        let summary = normalize_text(&r.summary);
        let content = r
            .content
            .as_deref()
            .map(normalize_text)
            .filter(|c| !c.is_empty());

        if title.is_empty() && summary.is_empty() && content.is_none() {
            report.dropped_empty += 1;
            continue;
        }
        if !seen.insert(r.id.clone()) {
            report.duplicates += 1;
            continue;
        }

        let tags: BTreeSet<String> = r
            .tags
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();

        report.articles.push(Article {
            id: r.id,
            title: if title.is_empty() {
                "Untitled".to_string()
            } else {
                title
            },
            url: r.url.trim().to_string(),
            summary,
            content,
            author: r
                .author
                .map(|a| normalize_text(&a))
                .filter(|a| !a.is_empty()),
            published_date: r.published.unwrap_or(now),
            source_feed: r.source_feed,
            tags,
            category_scores: CategoryScores::new(),
            classification_timestamp: None,
            classification_error: None,
        });
    }

    counter!("ingest_dropped_total").increment((report.dropped_empty + report.duplicates) as u64);
    report
}

/// Fetch every active feed concurrently (one request per feed).
///
/// Each feed runs under `timeout`; failures and timeouts are recorded in the
/// report and never abort the fan-out. Cancellation drops all pending requests.
pub async fn fetch_all(
    source: &dyn FeedSource,
    feeds: &[Feed],
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<FetchReport, Cancelled> {
    ensure_metrics_described();

    let active: Vec<&Feed> = feeds.iter().filter(|f| f.is_active()).collect();
    counter!("ingest_feeds_total").increment(active.len() as u64);

    let tasks = active.iter().map(|feed| async move {
        let t0 = Instant::now();
        let res = tokio::time::timeout(timeout, source.fetch(feed)).await;
        histogram!("ingest_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        (*feed, res)
    });

    let results = tokio::select! {
        _ = cancel.cancelled() => {
            tracing::warn!(target: "ingest", "fetch fan-out cancelled");
            return Err(Cancelled);
        }
        results = futures::future::join_all(tasks) => results,
    };

    let mut report = FetchReport::default();
    for (feed, res) in results {
        match res {
            Ok(Ok(mut articles)) => {
                tracing::info!(target: "ingest", feed = %feed.id, articles = articles.len(), "feed fetched");
                counter!("ingest_articles_total").increment(articles.len() as u64);
                report.outcomes.push(FeedOutcome::Fetched {
                    feed_id: feed.id.clone(),
                    articles: articles.len(),
                });
                report.articles.append(&mut articles);
            }
            Ok(Err(e)) => {
                tracing::warn!(target: "ingest", feed = %feed.id, source = source.name(), error = ?e, "feed fetch failed");
                counter!("ingest_feed_errors_total").increment(1);
                report.outcomes.push(FeedOutcome::Failed {
                    feed_id: feed.id.clone(),
                    error: format!("{e:#}"),
                });
            }
            Err(_) => {
                tracing::warn!(target: "ingest", feed = %feed.id, timeout_secs = timeout.as_secs(), "feed fetch timed out");
                counter!("ingest_feed_errors_total").increment(1);
                report.outcomes.push(FeedOutcome::Failed {
                    feed_id: feed.id.clone(),
                    error: format!("timed out after {}s", timeout.as_secs()),
                });
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn raw(id: &str, title: &str, summary: &str) -> RawArticle {
        RawArticle {
            id: id.into(),
            title: title.into(),
            url: format!("https://blog.test/{id}"),
            summary: summary.into(),
            content: None,
            author: None,
            published: None,
            source_feed: "blog".into(),
            tags: vec![],
        }
    }

    #[test]
    fn normalize_text_strips_markup_and_collapses_ws() {
        let s = "  <p>Hello,&nbsp;&nbsp; <b>world</b></p>\n\n&ldquo;ok&rdquo; ";
        assert_eq!(normalize_text(s), r#"Hello, world "ok""#);
    }

    #[test]
    fn id_prefers_guid_then_link_then_hash() {
        assert_eq!(article_id(Some(" g-1 "), Some("https://x"), "t", None), "g-1");
        assert_eq!(article_id(Some(""), Some("https://x"), "t", None), "https://x");
        let a = article_id(None, None, "Title", None);
        let b = article_id(None, None, "Title", None);
        assert_eq!(a, b);
        assert!(a.starts_with("sha256:"));
        assert_ne!(a, article_id(None, None, "Other", None));
    }

    #[test]
    fn process_dedupes_by_id_and_drops_empty() {
        let now = Utc.with_ymd_and_hms(2026, 10, 14, 6, 0, 0).unwrap();
        let mut with_tags = raw("a", "First", "<p>body</p>");
        with_tags.tags = vec![" Rust ".into(), "rust".into(), "".into()];
        let report = process_batch(
            vec![with_tags, raw("a", "Again", "dup"), raw("b", " ", "<br/>")],
            now,
        );
        assert_eq!(report.articles.len(), 1);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.dropped_empty, 1);

        let a = &report.articles[0];
        assert_eq!(a.summary, "body");
        assert_eq!(a.published_date, now);
        assert_eq!(a.tags.iter().collect::<Vec<_>>(), vec!["rust"]);
        assert!(a.category_scores.is_empty());
    }
}
