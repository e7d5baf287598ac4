//! MCP surface: three tools over the work-item retrieval pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rmcp::model::{
    Annotated, CallToolRequestParam, CallToolResult, Implementation, ListToolsResult,
    PaginatedRequestParam, ProtocolVersion, RawContent, RawTextContent, ServerCapabilities,
    ServerInfo, Tool, ToolsCapability,
};
use rmcp::service::RequestContext;
use rmcp::{Error as McpError, RoleServer, ServerHandler};
use serde::Deserialize;
use serde_json::Value;
use tracing::error;

use crate::config::DevOpsConfig;
use crate::devops::sanitize::sanitize_work_item;
use crate::devops::{created_after_wiql, DevOpsClient};

/// How far back the date-window tools look.
const QUERY_WINDOW_DAYS: i64 = 7;

/// Shared state handed to every tool invocation.
pub struct ToolContext {
    pub client: Arc<DevOpsClient>,
    pub config: Arc<DevOpsConfig>,
}

#[async_trait]
pub trait DevOpsTool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn input_schema(&self) -> Value;
    async fn call(
        &self,
        arguments: serde_json::Map<String, Value>,
        context: &ToolContext,
    ) -> Result<CallToolResult, McpError>;
}

fn text_result(text: String) -> CallToolResult {
    CallToolResult {
        content: vec![Annotated::new(
            RawContent::Text(RawTextContent { text }),
            None,
        )],
        is_error: Some(false),
    }
}

/// Upstream failures become tool-level error results rather than protocol
/// errors, so the client sees what went wrong instead of a dropped call.
fn error_result(text: String) -> CallToolResult {
    CallToolResult {
        content: vec![Annotated::new(
            RawContent::Text(RawTextContent { text }),
            None,
        )],
        is_error: Some(true),
    }
}

/// Render an error with its full cause chain, so a wrapped upstream failure
/// (e.g. the fetch inside a batch error) keeps its status and body in the
/// user-visible message.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

fn parse_arguments<T: serde::de::DeserializeOwned>(
    arguments: serde_json::Map<String, Value>,
) -> Result<T, McpError> {
    serde_json::from_value(Value::Object(arguments))
        .map_err(|e| McpError::invalid_request(format!("Invalid arguments: {e}"), None))
}

fn to_pretty_json<T: serde::Serialize>(value: &T) -> Result<String, McpError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| McpError::internal_error(format!("Failed to serialize result: {e}"), None))
}

fn week_ago() -> chrono::NaiveDate {
    Utc::now().date_naive() - chrono::Duration::days(QUERY_WINDOW_DAYS)
}

/// `get-devops-work-items-with-details`: query pipeline with process-config
/// credentials, sanitized details in query order.
pub struct GetWorkItemsWithDetailsTool;

#[async_trait]
impl DevOpsTool for GetWorkItemsWithDetailsTool {
    fn name(&self) -> &'static str {
        "get-devops-work-items-with-details"
    }

    fn description(&self) -> &'static str {
        "Get Azure DevOps work items created in the last week, with full sanitized details"
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn call(
        &self,
        _arguments: serde_json::Map<String, Value>,
        context: &ToolContext,
    ) -> Result<CallToolResult, McpError> {
        match context
            .client
            .query_work_items_with_details(&context.config.project, week_ago())
            .await
        {
            Ok(details) => Ok(text_result(to_pretty_json(&details)?)),
            Err(e) => {
                error!(error = %e, "work item pipeline failed");
                Ok(error_result(format!(
                    "Failed to retrieve work items from Azure DevOps: {}",
                    error_chain(&e)
                )))
            }
        }
    }
}

#[derive(Deserialize)]
struct GetWorkItemByIdArgs {
    id: String,
}

/// `get-devops-work-item-by-id`: one sanitized work item.
///
/// Single-item fetches are always sanitized, same as the batch pipeline.
pub struct GetWorkItemByIdTool;

#[async_trait]
impl DevOpsTool for GetWorkItemByIdTool {
    fn name(&self) -> &'static str {
        "get-devops-work-item-by-id"
    }

    fn description(&self) -> &'static str {
        "Get one Azure DevOps work item by ID"
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "id": {
                    "type": "string",
                    "description": "ID of the Azure DevOps work item"
                }
            },
            "required": ["id"]
        })
    }

    async fn call(
        &self,
        arguments: serde_json::Map<String, Value>,
        context: &ToolContext,
    ) -> Result<CallToolResult, McpError> {
        let args: GetWorkItemByIdArgs = parse_arguments(arguments)?;
        let id: i64 = args
            .id
            .parse()
            .map_err(|_| McpError::invalid_request(format!("Invalid work item id: {}", args.id), None))?;

        match context
            .client
            .get_work_item(Some(&context.config.project), id)
            .await
        {
            Ok(mut item) => {
                sanitize_work_item(&mut item);
                Ok(text_result(to_pretty_json(&item)?))
            }
            Err(e) => {
                error!(error = %e, id, "work item fetch failed");
                Ok(error_result(format!(
                    "Failed to retrieve work item {id} from Azure DevOps: {}",
                    error_chain(&e)
                )))
            }
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetWorkItemsArgs {
    organization: String,
    project: String,
    personal_access_token: String,
}

/// `get-devops-work-items`: legacy variant taking credentials per call and
/// returning the raw query response, references only and unsanitized.
pub struct GetWorkItemsTool;

#[async_trait]
impl DevOpsTool for GetWorkItemsTool {
    fn name(&self) -> &'static str {
        "get-devops-work-items"
    }

    fn description(&self) -> &'static str {
        "Get Azure DevOps work items from the last week using caller-supplied credentials"
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "organization": {
                    "type": "string",
                    "description": "Azure DevOps organization name"
                },
                "project": {
                    "type": "string",
                    "description": "Azure DevOps project name"
                },
                "personalAccessToken": {
                    "type": "string",
                    "description": "Personal Access Token for Azure DevOps"
                }
            },
            "required": ["organization", "project", "personalAccessToken"]
        })
    }

    async fn call(
        &self,
        arguments: serde_json::Map<String, Value>,
        _context: &ToolContext,
    ) -> Result<CallToolResult, McpError> {
        let args: GetWorkItemsArgs = parse_arguments(arguments)?;
        let client = DevOpsClient::new(args.organization, &args.personal_access_token)
            .map_err(|e| McpError::internal_error(format!("Failed to build client: {e}"), None))?;

        let wiql = created_after_wiql(&args.project, week_ago());
        match client.query_work_items(&args.project, &wiql).await {
            Ok(response) => Ok(text_result(to_pretty_json(&response)?)),
            Err(e) => {
                error!(error = %e, "work item query failed");
                Ok(error_result(format!(
                    "Failed to retrieve work items from Azure DevOps: {}",
                    error_chain(&e)
                )))
            }
        }
    }
}

#[derive(Clone)]
pub struct DevOpsMcpServer {
    context: Arc<ToolContext>,
    tools: Arc<Vec<Box<dyn DevOpsTool>>>,
}

impl DevOpsMcpServer {
    pub fn new(config: Arc<DevOpsConfig>) -> anyhow::Result<Self> {
        let client =
            DevOpsClient::new(config.organization.clone(), &config.personal_access_token)?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: DevOpsClient, config: Arc<DevOpsConfig>) -> Self {
        let tools: Vec<Box<dyn DevOpsTool>> = vec![
            Box::new(GetWorkItemsWithDetailsTool),
            Box::new(GetWorkItemByIdTool),
            Box::new(GetWorkItemsTool),
        ];
        Self {
            context: Arc::new(ToolContext {
                client: Arc::new(client),
                config,
            }),
            tools: Arc::new(tools),
        }
    }

    fn find_tool(&self, name: &str) -> Option<&dyn DevOpsTool> {
        self.tools
            .iter()
            .find(|tool| tool.name() == name)
            .map(|tool| tool.as_ref())
    }
}

impl ServerHandler for DevOpsMcpServer {
    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        let tools = self
            .tools
            .iter()
            .map(|tool| {
                let schema = match tool.input_schema() {
                    Value::Object(map) => map,
                    _ => serde_json::Map::new(),
                };
                Tool {
                    name: tool.name().into(),
                    description: Some(tool.description().into()),
                    input_schema: Arc::new(schema),
                    annotations: None,
                }
            })
            .collect();

        Ok(ListToolsResult {
            tools,
            next_cursor: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        match self.find_tool(&request.name) {
            Some(tool) => {
                tool.call(request.arguments.unwrap_or_default(), &self.context)
                    .await
            }
            None => Err(McpError::invalid_request(
                format!("Unknown tool: {}", request.name),
                None,
            )),
        }
    }

    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::default(),
            capabilities: ServerCapabilities {
                prompts: None,
                tools: Some(ToolsCapability { list_changed: None }),
                resources: None,
                logging: None,
                completions: None,
                experimental: None,
            },
            server_info: Implementation {
                name: "devops-mcp".into(),
                version: env!("CARGO_PKG_VERSION").into(),
            },
            instructions: Some(
                "Azure DevOps work item server. Use get-devops-work-items-with-details for \
                 recently created items with full fields, or get-devops-work-item-by-id for a \
                 single item."
                    .into(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn context(server: &MockServer) -> ToolContext {
        let client =
            DevOpsClient::with_base_url(server.uri(), "contoso".into(), "secret").unwrap();
        ToolContext {
            client: Arc::new(client),
            config: Arc::new(DevOpsConfig {
                organization: "contoso".into(),
                project: "Alpha".into(),
                personal_access_token: "secret".into(),
            }),
        }
    }

    fn server_under_test() -> DevOpsMcpServer {
        let config = Arc::new(DevOpsConfig {
            organization: "contoso".into(),
            project: "Alpha".into(),
            personal_access_token: "secret".into(),
        });
        DevOpsMcpServer::new(config).unwrap()
    }

    fn args(value: Value) -> serde_json::Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn all_three_tools_are_registered() {
        let server = server_under_test();
        for name in [
            "get-devops-work-items-with-details",
            "get-devops-work-item-by-id",
            "get-devops-work-items",
        ] {
            assert!(server.find_tool(name).is_some(), "missing tool {name}");
        }
        assert!(server.find_tool("no-such-tool").is_none());
    }

    #[test]
    fn by_id_schema_requires_id() {
        let schema = GetWorkItemByIdTool.input_schema();
        assert_eq!(schema["required"], json!(["id"]));
        assert_eq!(schema["properties"]["id"]["type"], "string");
    }

    #[test]
    fn legacy_schema_takes_per_call_credentials() {
        let schema = GetWorkItemsTool.input_schema();
        assert_eq!(
            schema["required"],
            json!(["organization", "project", "personalAccessToken"])
        );
    }

    #[tokio::test]
    async fn by_id_tool_returns_sanitized_item() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/contoso/Alpha/_apis/wit/workItems/297"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 297,
                "rev": 1,
                "fields": {
                    "System.Title": "Fix bug",
                    "Custom.Prioritylabel": "P1"
                },
                "url": "https://example.test/297"
            })))
            .mount(&server)
            .await;

        let result = GetWorkItemByIdTool
            .call(args(json!({ "id": "297" })), &context(&server))
            .await
            .unwrap();

        assert_eq!(result.is_error, Some(false));
        let RawContent::Text(text) = &result.content[0].raw else {
            panic!("expected text content");
        };
        assert!(text.text.contains("System.Title"));
        assert!(!text.text.contains("Custom.Prioritylabel"));
        assert!(!text.text.contains("example.test"));
    }

    #[tokio::test]
    async fn by_id_tool_rejects_non_numeric_id() {
        let server = MockServer::start().await;
        let result = GetWorkItemByIdTool
            .call(args(json!({ "id": "banana" })), &context(&server))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn by_id_tool_reports_upstream_failure_as_error_result() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("gone"))
            .mount(&server)
            .await;

        let result = GetWorkItemByIdTool
            .call(args(json!({ "id": "1" })), &context(&server))
            .await
            .unwrap();

        assert_eq!(result.is_error, Some(true));
    }

    #[tokio::test]
    async fn details_tool_reports_pipeline_failure_as_error_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
            .mount(&server)
            .await;

        let result = GetWorkItemsWithDetailsTool
            .call(serde_json::Map::new(), &context(&server))
            .await
            .unwrap();

        assert_eq!(result.is_error, Some(true));
        let RawContent::Text(text) = &result.content[0].raw else {
            panic!("expected text content");
        };
        assert!(text.text.contains("401"));
    }

    #[tokio::test]
    async fn details_tool_error_keeps_failing_fetch_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "queryType": "flat",
                "queryResultType": "workItem",
                "asOf": "2025-09-15T12:00:00Z",
                "workItems": [{ "id": 5, "url": "https://example.test/5" }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/contoso/Alpha/_apis/wit/workItems/5"))
            .respond_with(ResponseTemplate::new(503).set_body_string("service unavailable"))
            .mount(&server)
            .await;

        let result = GetWorkItemsWithDetailsTool
            .call(serde_json::Map::new(), &context(&server))
            .await
            .unwrap();

        assert_eq!(result.is_error, Some(true));
        let RawContent::Text(text) = &result.content[0].raw else {
            panic!("expected text content");
        };
        // The batch wrapper names the failing item and the wrapped fetch
        // failure keeps its upstream status and body.
        assert!(text.text.contains("work item 5"));
        assert!(text.text.contains("503"));
        assert!(text.text.contains("service unavailable"));
    }

    #[tokio::test]
    async fn details_tool_returns_items_in_query_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "queryType": "flat",
                "queryResultType": "workItem",
                "asOf": "2025-09-15T12:00:00Z",
                "workItems": [
                    { "id": 2, "url": "https://example.test/2" },
                    { "id": 1, "url": "https://example.test/1" }
                ]
            })))
            .mount(&server)
            .await;
        for id in [1, 2] {
            Mock::given(method("GET"))
                .and(path(format!("/contoso/Alpha/_apis/wit/workItems/{id}")))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "id": id,
                    "rev": 1,
                    "fields": { "System.Title": format!("Item {id}") }
                })))
                .mount(&server)
                .await;
        }

        let result = GetWorkItemsWithDetailsTool
            .call(serde_json::Map::new(), &context(&server))
            .await
            .unwrap();

        assert_eq!(result.is_error, Some(false));
        let RawContent::Text(text) = &result.content[0].raw else {
            panic!("expected text content");
        };
        let items: Vec<Value> = serde_json::from_str(&text.text).unwrap();
        let ids: Vec<i64> = items.iter().map(|i| i["id"].as_i64().unwrap()).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[tokio::test]
    async fn legacy_tool_rejects_missing_credentials() {
        let server = MockServer::start().await;
        let result = GetWorkItemsTool
            .call(args(json!({ "organization": "contoso" })), &context(&server))
            .await;
        assert!(result.is_err());
    }
}
