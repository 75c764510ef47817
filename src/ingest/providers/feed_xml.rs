// src/ingest/providers/feed_xml.rs
//! RSS 2.0 / Atom parsing into `RawArticle`s (quick-xml serde).

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use metrics::counter;
use quick_xml::de::from_str;
use serde::Deserialize;
use time::{
    format_description::well_known::{Rfc2822, Rfc3339},
    OffsetDateTime,
};

use crate::ingest::article_id;
use crate::model::RawArticle;

// ---------- RSS 2.0 ----------

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    guid: Option<Text>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    #[serde(rename = "content:encoded", alias = "encoded")]
    content: Option<String>,
    #[serde(alias = "dc:creator", alias = "creator")]
    author: Option<String>,
    #[serde(rename = "category", default)]
    categories: Vec<Text>,
}

// ---------- Atom ----------

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entry: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    id: Option<String>,
    title: Option<Text>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    published: Option<String>,
    updated: Option<String>,
    summary: Option<Text>,
    content: Option<Text>,
    author: Option<AtomAuthor>,
    #[serde(rename = "category", default)]
    categories: Vec<AtomCategory>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: String,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomAuthor {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomCategory {
    #[serde(rename = "@term")]
    term: String,
}

/// Element text with attributes ignored (`<guid isPermaLink="false">`, `<title type="html">`).
#[derive(Debug, Deserialize, Default)]
struct Text {
    #[serde(rename = "$text", default)]
    value: String,
}

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    let ts = ts.trim();
    OffsetDateTime::parse(ts, &Rfc2822)
        .ok()
        .and_then(to_chrono)
        // chrono accepts the obsolete zone names ("GMT", "EST") that feeds still emit
        .or_else(|| {
            DateTime::parse_from_rfc2822(ts)
                .ok()
                .map(|d| d.with_timezone(&Utc))
        })
}

fn parse_rfc3339(ts: &str) -> Option<DateTime<Utc>> {
    OffsetDateTime::parse(ts.trim(), &Rfc3339)
        .ok()
        .and_then(to_chrono)
}

fn to_chrono(dt: OffsetDateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(dt.unix_timestamp(), dt.nanosecond())
}

/// Parse a feed document. The format is sniffed from the root element.
pub fn parse_feed(xml: &str, feed_id: &str) -> Result<Vec<RawArticle>> {
    let xml_clean = scrub_html_entities_for_xml(xml);
    let head: String = xml_clean.chars().take(512).collect::<String>().to_ascii_lowercase();

    let out = if head.contains("<rss") {
        parse_rss(&xml_clean, feed_id)?
    } else if head.contains("<feed") {
        parse_atom(&xml_clean, feed_id)?
    } else {
        counter!("ingest_parse_errors_total").increment(1);
        anyhow::bail!("feed '{feed_id}': unrecognized document (expected <rss> or <feed>)");
    };
    Ok(out)
}

fn parse_rss(xml: &str, feed_id: &str) -> Result<Vec<RawArticle>> {
    let rss: Rss = from_str(xml).with_context(|| format!("parsing rss xml for '{feed_id}'"))?;
    let mut out = Vec::with_capacity(rss.channel.item.len());
    for it in rss.channel.item {
        let title = it.title.unwrap_or_default();
        let published = it.pub_date.as_deref().and_then(parse_rfc2822);
        let guid = it.guid.map(|g| g.value);
        out.push(RawArticle {
            id: article_id(guid.as_deref(), it.link.as_deref(), &title, published),
            title,
            url: it.link.unwrap_or_default(),
            summary: it.description.unwrap_or_default(),
            content: it.content,
            author: it.author,
            published,
            source_feed: feed_id.to_string(),
            tags: it.categories.into_iter().map(|c| c.value).collect(),
        });
    }
    Ok(out)
}

fn parse_atom(xml: &str, feed_id: &str) -> Result<Vec<RawArticle>> {
    let feed: AtomFeed =
        from_str(xml).with_context(|| format!("parsing atom xml for '{feed_id}'"))?;
    let mut out = Vec::with_capacity(feed.entry.len());
    for e in feed.entry {
        let title = e.title.map(|t| t.value).unwrap_or_default();
        let published = e
            .published
            .as_deref()
            .or(e.updated.as_deref())
            .and_then(parse_rfc3339);
        let link = e
            .links
            .iter()
            .find(|l| l.rel.as_deref().map_or(true, |r| r == "alternate"))
            .or_else(|| e.links.first())
            .map(|l| l.href.clone());
        out.push(RawArticle {
            id: article_id(e.id.as_deref(), link.as_deref(), &title, published),
            title,
            url: link.unwrap_or_default(),
            summary: e.summary.map(|s| s.value).unwrap_or_default(),
            content: e.content.map(|c| c.value),
            author: e.author.and_then(|a| a.name),
            published,
            source_feed: feed_id.to_string(),
            tags: e.categories.into_iter().map(|c| c.term).collect(),
        });
    }
    Ok(out)
}

/// Named HTML entities are not valid XML; rewrite the common ones before parsing.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Blog</title>
    <item>
      <title>Zero-cost abstractions&nbsp;revisited</title>
      <link>https://blog.test/zero-cost</link>
      <guid isPermaLink="false">post-17</guid>
      <pubDate>Tue, 13 Oct 2026 09:30:00 +0000</pubDate>
      <description><![CDATA[<p>Why <b>iterators</b> compile down.</p>]]></description>
      <category>rust</category>
      <category>performance</category>
    </item>
    <item>
      <title>No guid here</title>
      <link>https://blog.test/no-guid</link>
      <pubDate>Mon, 12 Oct 2026 18:00:00 GMT</pubDate>
    </item>
  </channel>
</rss>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Blog</title>
  <entry>
    <id>tag:atom.test,2026:1</id>
    <title type="html">Designing for failure</title>
    <link rel="alternate" href="https://atom.test/failure"/>
    <published>2026-10-11T07:00:00Z</published>
    <summary>Retries, budgets, and backoff.</summary>
    <author><name>Ada</name></author>
    <category term="reliability"/>
  </entry>
</feed>"#;

    #[test]
    fn parses_rss_items() {
        let items = parse_feed(RSS, "blog").unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, "post-17");
        assert_eq!(items[0].tags, vec!["rust", "performance"]);
        assert!(items[0].summary.contains("iterators"));
        assert!(items[0].published.is_some());
        assert_eq!(items[1].id, "https://blog.test/no-guid");
        assert!(items[1].published.is_some(), "GMT zone should parse");
        assert!(items.iter().all(|i| i.source_feed == "blog"));
    }

    #[test]
    fn parses_atom_entries() {
        let items = parse_feed(ATOM, "atom").unwrap();
        assert_eq!(items.len(), 1);
        let e = &items[0];
        assert_eq!(e.id, "tag:atom.test,2026:1");
        assert_eq!(e.url, "https://atom.test/failure");
        assert_eq!(e.title, "Designing for failure");
        assert_eq!(e.author.as_deref(), Some("Ada"));
        assert_eq!(e.tags, vec!["reliability"]);
    }

    #[test]
    fn rejects_non_feed_documents() {
        assert!(parse_feed("<html><body>nope</body></html>", "x").is_err());
    }
}
