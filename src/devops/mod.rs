pub mod sanitize;

use std::time::Duration;

use anyhow::{Context, Result};
use base64::Engine;
use chrono::NaiveDate;
use futures::future;
use serde::Serialize;
use tracing::{debug, error};

use crate::error::DevOpsError;
use crate::model::work_item::{WorkItem, WorkItemBatchResponse, WorkItemQueryResponse};


const DEFAULT_BASE_URL: &str = "https://dev.azure.com";
const API_VERSION: &str = "7.1";

/// Single-page cap requested on every WIQL query. Matching items beyond this
/// are dropped; there is no pagination loop.
pub const MAX_QUERY_RESULTS: u32 = 19998;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct WiqlQuery<'a> {
    query: &'a str,
}

/// Authenticated client for the Azure DevOps work-item-tracking API.
pub struct DevOpsClient {
    base_url: String,
    organization: String,
    auth_header: String,
    client: reqwest::Client,
}

/// WIQL selecting everything created in `project` after `cutoff`.
pub fn created_after_wiql(project: &str, cutoff: NaiveDate) -> String {
    format!(
        "SELECT * FROM WorkItems WHERE [System.TeamProject] = '{project}' AND [System.CreatedDate] > '{}'",
        cutoff.format("%Y-%m-%d")
    )
}

impl DevOpsClient {
    pub fn new(organization: String, personal_access_token: &str) -> Result<Self> {
        Self::with_base_url(
            DEFAULT_BASE_URL.to_string(),
            organization,
            personal_access_token,
        )
    }

    pub fn with_base_url(
        base_url: String,
        organization: String,
        personal_access_token: &str,
    ) -> Result<Self> {
        // Azure DevOps PATs go over Basic auth with an empty username.
        let encoded =
            base64::engine::general_purpose::STANDARD.encode(format!(":{personal_access_token}"));
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            base_url,
            organization,
            auth_header: format!("Basic {encoded}"),
            client,
        })
    }

    /// Run a WIQL query against `project`, returning the (id, url) references
    /// of matching work items.
    pub async fn query_work_items(
        &self,
        project: &str,
        wiql: &str,
    ) -> std::result::Result<WorkItemQueryResponse, DevOpsError> {
        let url = format!(
            "{}/{}/{project}/_apis/wit/wiql?api-version={API_VERSION}&$top={MAX_QUERY_RESULTS}",
            self.base_url, self.organization
        );
        debug!(%url, "running wiql query");

        let resp = self
            .client
            .post(&url)
            .header("Authorization", &self.auth_header)
            .header("Accept", "application/json")
            .json(&WiqlQuery { query: wiql })
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "wiql query transport failure");
                DevOpsError::Query {
                    status: e.status().map(|s| s.as_u16()),
                    body: e.to_string(),
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            error!(status = status.as_u16(), %body, "wiql query rejected");
            return Err(DevOpsError::Query {
                status: Some(status.as_u16()),
                body,
            });
        }

        resp.json().await.map_err(|e| {
            error!(error = %e, "wiql response could not be decoded");
            DevOpsError::Query {
                status: Some(status.as_u16()),
                body: e.to_string(),
            }
        })
    }

    /// Fetch the full field set of one work item.
    ///
    /// The project-scoped URL is the authoritative form; passing `None` uses
    /// the organization-wide endpoint for callers that only know the id.
    pub async fn get_work_item(
        &self,
        project: Option<&str>,
        id: i64,
    ) -> std::result::Result<WorkItem, DevOpsError> {
        let url = match project {
            Some(project) => format!(
                "{}/{}/{project}/_apis/wit/workItems/{id}?api-version={API_VERSION}",
                self.base_url, self.organization
            ),
            None => format!(
                "{}/{}/_apis/wit/workItems/{id}?api-version={API_VERSION}",
                self.base_url, self.organization
            ),
        };
        debug!(%url, id, "fetching work item");

        let resp = self
            .client
            .get(&url)
            .header("Authorization", &self.auth_header)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, id, "work item fetch transport failure");
                DevOpsError::Detail {
                    status: e.status().map(|s| s.as_u16()),
                    body: e.to_string(),
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            error!(status = status.as_u16(), id, %body, "work item fetch rejected");
            return Err(DevOpsError::Detail {
                status: Some(status.as_u16()),
                body,
            });
        }

        resp.json().await.map_err(|e| {
            error!(error = %e, id, "work item payload could not be decoded");
            DevOpsError::Detail {
                status: Some(status.as_u16()),
                body: e.to_string(),
            }
        })
    }

    /// Fetch several work items in one round trip via the batch-by-ids
    /// endpoint. Not used by the query pipeline, which fans out per-item
    /// fetches instead, but kept as a capability for direct callers.
    pub async fn get_work_items(
        &self,
        ids: &[i64],
    ) -> std::result::Result<Vec<WorkItem>, DevOpsError> {
        let csv = ids
            .iter()
            .map(i64::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let url = format!(
            "{}/{}/_apis/wit/workitems?ids={csv}&api-version={API_VERSION}",
            self.base_url, self.organization
        );
        debug!(%url, "fetching work item batch");

        let resp = self
            .client
            .get(&url)
            .header("Authorization", &self.auth_header)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "work item batch transport failure");
                DevOpsError::Detail {
                    status: e.status().map(|s| s.as_u16()),
                    body: e.to_string(),
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            error!(status = status.as_u16(), %body, "work item batch rejected");
            return Err(DevOpsError::Detail {
                status: Some(status.as_u16()),
                body,
            });
        }

        let batch: WorkItemBatchResponse = resp.json().await.map_err(|e| {
            error!(error = %e, "work item batch payload could not be decoded");
            DevOpsError::Detail {
                status: Some(status.as_u16()),
                body: e.to_string(),
            }
        })?;
        debug!(count = batch.count, "work item batch fetched");
        Ok(batch.value)
    }

    /// Query `project` for items created after `cutoff`, fetch every match's
    /// details in parallel, and return them sanitized, in query order.
    ///
    /// All detail fetches launch at once. The join is fail-fast: the first
    /// fetch to fail aborts the batch and the whole call reports
    /// [`DevOpsError::Batch`] with no partial results.
    pub async fn query_work_items_with_details(
        &self,
        project: &str,
        cutoff: NaiveDate,
    ) -> std::result::Result<Vec<WorkItem>, DevOpsError> {
        let wiql = created_after_wiql(project, cutoff);
        let response = self.query_work_items(project, &wiql).await?;

        let fetches = response.work_items.iter().map(|reference| {
            let id = reference.id;
            async move {
                self.get_work_item(Some(project), id)
                    .await
                    .map_err(|e| DevOpsError::batch(id, e))
            }
        });
        // try_join_all keeps the input order in its output regardless of
        // which fetch completes first.
        let mut details = future::try_join_all(fetches).await?;

        for item in &mut details {
            sanitize::sanitize_work_item(item);
        }
        Ok(details)
    }
}
