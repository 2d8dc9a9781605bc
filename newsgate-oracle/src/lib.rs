pub mod openai;
pub mod schema;
pub mod traits;
mod wire;

#[cfg(feature = "test-support")]
pub mod mock;

pub use openai::OpenAiOracle;
pub use traits::*;

#[cfg(feature = "test-support")]
pub use mock::MockOracle;
