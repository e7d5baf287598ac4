use thiserror::Error;

/// Failures talking to the Azure DevOps REST API.
///
/// Transport failures and non-2xx replies are folded into the same variant
/// per call shape; the upstream status is kept when the response got far
/// enough to have one.
#[derive(Debug, Error)]
pub enum DevOpsError {
    /// The WIQL query call failed.
    #[error("work item query failed{}: {body}", fmt_status(.status))]
    Query { status: Option<u16>, body: String },

    /// A work item detail fetch failed.
    #[error("work item fetch failed{}: {body}", fmt_status(.status))]
    Detail { status: Option<u16>, body: String },

    /// One fetch in a parallel detail batch failed; the whole batch is
    /// abandoned (no partial results).
    #[error("detail batch aborted: work item {id} could not be fetched")]
    Batch {
        id: i64,
        #[source]
        source: Box<DevOpsError>,
    },
}

fn fmt_status(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" ({code})"),
        None => String::new(),
    }
}

impl DevOpsError {
    pub fn batch(id: i64, source: DevOpsError) -> Self {
        DevOpsError::Batch {
            id,
            source: Box::new(source),
        }
    }
}
