//! Source adapters for the Collector: one per feed shape named in the feed
//! configuration (spec §4.2 / §4.3). Each adapter turns a configured feed
//! into a flat list of [`Candidate`]s; URL normalization and dedup happen
//! downstream in the pipeline, not here.

pub mod feed;
pub mod html_listing;
pub mod json_api;
pub mod sitemap;

use chrono::{DateTime, Utc};

/// One freshly-collected link, before normalization or persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub source: String,
    pub raw_url: String,
    pub title: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}
