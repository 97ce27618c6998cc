use std::collections::BTreeSet;
use std::future::Future;

use crate::error::Result;

pub mod s3;

/// Read access to the nPVR archive. Chunks of a channel are stored under
/// `{channel}/{YYYY-MM-DD}/`, one directory per UTC day.
pub trait Archive: Send + Sync {
    /// List every object key stored for `channel` under any of `dates`.
    fn list_chunk_keys(
        &self,
        channel: &str,
        dates: &BTreeSet<String>,
    ) -> impl Future<Output = Result<BTreeSet<String>>> + Send;
}
