pub mod extract;
pub mod http;
pub mod redirect;
pub mod sources;

#[cfg(feature = "test-support")]
pub mod mock;

pub use extract::{ContentExtractor, ExtractionOutcome, MIN_USABLE_CHARS};
pub use http::{FetchedPage, HttpFetcher, PageFetcher};
pub use sources::Candidate;

#[cfg(feature = "test-support")]
pub use mock::MockPageFetcher;
