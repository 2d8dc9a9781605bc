pub mod cancel;
pub mod clock;
pub mod config;
pub mod dates;
pub mod error;
pub mod source_tier;
pub mod types;
pub mod url_key;

pub use cancel::CancellationToken;
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::Config;
pub use dates::parse_lenient;
pub use error::{PipelineError, Result};
pub use url_key::{normalize_url, title_similarity, url_hash};
