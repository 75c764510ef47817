// src/ingest/providers/mod.rs
pub mod feed_xml;
pub mod fixture;
pub mod http;

pub use feed_xml::parse_feed;
pub use fixture::FixtureFeedSource;
pub use http::HttpFeedSource;
