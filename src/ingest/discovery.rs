// src/ingest/discovery.rs
//! Feed discovery: validate configured candidates by fetching them once.
//!
//! Candidates whose URL is already registered are skipped. A candidate is
//! valid when it fetches and parses into at least one entry. Validated feeds
//! are proposed as `inactive` entries for review; nothing is activated here.

use serde::Serialize;
use std::time::Duration;

use crate::cancel::{CancellationToken, Cancelled};
use crate::config::settings::FeedCandidate;
use crate::ingest::types::FeedSource;
use crate::model::{Feed, FeedStatus};

#[derive(Debug, Clone, Serialize)]
pub struct ValidatedFeed {
    pub entries: usize,
    pub proposed: Feed,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct DiscoveryReport {
    pub discovered: usize,
    pub skipped_known: usize,
    pub validated: Vec<ValidatedFeed>,
    /// (url, reason)
    pub rejected: Vec<(String, String)>,
}

/// Lowercase ASCII slug used as the proposed feed id.
pub fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut dash = false;
    for ch in name.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            dash = false;
        } else if !dash && !out.is_empty() {
            out.push('-');
            dash = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

fn same_url(a: &str, b: &str) -> bool {
    let norm = |s: &str| s.trim().trim_end_matches('/').to_ascii_lowercase();
    norm(a) == norm(b)
}

pub async fn discover_and_validate(
    source: &dyn FeedSource,
    candidates: &[FeedCandidate],
    known: &[Feed],
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<DiscoveryReport, Cancelled> {
    let mut report = DiscoveryReport {
        discovered: candidates.len(),
        ..Default::default()
    };

    let fresh: Vec<&FeedCandidate> = candidates
        .iter()
        .filter(|c| !known.iter().any(|f| same_url(&f.url, &c.url)))
        .collect();
    report.skipped_known = candidates.len() - fresh.len();

    let probes: Vec<Feed> = fresh
        .iter()
        .map(|c| Feed {
            id: slugify(&c.name),
            name: c.name.clone(),
            url: c.url.clone(),
            description: c.description.clone(),
            authority_score: c.estimated_authority.clamp(0.0, 100.0),
            category_hints: vec![],
            tags: vec![],
            status: FeedStatus::Inactive,
        })
        .collect();

    let checks = probes.iter().map(|probe| async move {
        let res = tokio::time::timeout(timeout, source.fetch(probe)).await;
        (probe, res)
    });

    let results = tokio::select! {
        _ = cancel.cancelled() => return Err(Cancelled),
        r = futures::future::join_all(checks) => r,
    };

    for (probe, res) in results {
        match res {
            Ok(Ok(entries)) if !entries.is_empty() => {
                tracing::info!(target: "discovery", url = %probe.url, entries = entries.len(), "candidate validated");
                report.validated.push(ValidatedFeed {
                    entries: entries.len(),
                    proposed: probe.clone(),
                });
            }
            Ok(Ok(_)) => report
                .rejected
                .push((probe.url.clone(), "feed has no entries".to_string())),
            Ok(Err(e)) => {
                tracing::warn!(target: "discovery", url = %probe.url, error = ?e, "candidate validation failed");
                report.rejected.push((probe.url.clone(), format!("{e:#}")));
            }
            Err(_) => report
                .rejected
                .push((probe.url.clone(), "timed out".to_string())),
        }
    }

    Ok(report)
}
