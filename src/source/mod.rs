//! Where observations come from.

pub mod error;
pub mod frost;

use crate::observations::Observation;
use crate::source::error::FetchError;
use crate::window::CollectionWindow;
use async_trait::async_trait;

/// A provider of observations for a station over a window of time.
///
/// The stock implementation is [`frost::FrostClient`]; tests substitute their
/// own.
#[async_trait]
pub trait ObservationSource: Send + Sync {
    /// Fetches every observation for `station` that falls inside `window`.
    /// An empty result means the source has no data there, which is not an
    /// error.
    async fn fetch(
        &self,
        station: &str,
        window: &CollectionWindow,
    ) -> Result<Vec<Observation>, FetchError>;
}
