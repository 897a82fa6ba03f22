//! Local HTTP surface: a read API over the sheet cache plus POST action
//! endpoints that forward to the mutation gateway.
//!
//! GET routes never talk to Google; they serve whatever the cache holds.
//! POST actions are accepted with 202 and run on the async runtime without
//! the response waiting for the write. The listener runs on a blocking task
//! owned by the bridge and is unblocked and joined on shutdown.

use crate::a1;
use crate::cache::SheetCache;
use crate::error::{AppError, Result};
use crate::mutation::{Adjustment, MutationGateway};
use crate::sheets::types::Dimension;
use crate::sheets::{SheetsApi, SheetsClient, TokenManager, TokenSource};
use anyhow::anyhow;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;
use tiny_http::{Header, Method, Response, Server};
use tokio::runtime::Handle;
use tracing::{debug, warn};
use url::Url;

pub struct ApiResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
    pub location: Option<String>,
}

impl ApiResponse {
    fn json(status: u16, body: String) -> Self {
        Self {
            status,
            content_type: "application/json",
            body,
            location: None,
        }
    }

    fn error(status: u16, message: &str) -> Self {
        Self::json(status, json!({ "status": status, "message": message }).to_string())
    }

    fn redirect(location: String) -> Self {
        Self {
            status: 302,
            content_type: "text/plain",
            body: String::new(),
            location: Some(location),
        }
    }
}

/// Route a GET request. `consent_url` is the OAuth consent URL when client
/// credentials are configured.
pub fn route(
    path: &str,
    query: &HashMap<String, String>,
    host: &str,
    cache: &SheetCache,
    consent_url: Option<&Url>,
) -> ApiResponse {
    match path.trim_matches('/').to_lowercase().as_str() {
        "spreadsheets" => list_spreadsheets(host, cache),
        "spreadsheet" => get_spreadsheet(query, cache),
        "auth" => match consent_url {
            Some(url) => ApiResponse::redirect(url.to_string()),
            None => ApiResponse::error(400, "OAuth client not configured"),
        },
        _ => ApiResponse::error(404, "Not Found"),
    }
}

fn list_spreadsheets(host: &str, cache: &SheetCache) -> ApiResponse {
    let data: Vec<Value> = cache
        .summaries()
        .into_iter()
        .map(|summary| {
            let links: Vec<String> = summary
                .sheet_titles
                .iter()
                .filter_map(|title| {
                    Url::parse_with_params(
                        &format!("http://{}/spreadsheet", host),
                        &[("id", summary.id.as_str()), ("sheet", title.as_str())],
                    )
                    .ok()
                    .map(String::from)
                })
                .collect();
            json!({ "id": summary.id, "title": summary.title, "sheets": links })
        })
        .collect();

    ApiResponse::json(200, serde_json::to_string_pretty(&data).unwrap_or_default())
}

fn get_spreadsheet(query: &HashMap<String, String>, cache: &SheetCache) -> ApiResponse {
    let id = query.get("id").map(String::as_str).unwrap_or_default();
    let sheet = query.get("sheet").map(String::as_str).unwrap_or_default();
    let format = query.get("format").map(String::as_str).unwrap_or("json");

    if !cache.contains(id) {
        return ApiResponse::error(404, "Spreadsheet ID not found");
    }
    let Some(rows) = cache.sheet_rows(id, sheet) else {
        return ApiResponse::error(404, "Sheet Title not found");
    };

    match format {
        "json" => ApiResponse::json(200, rows_to_json(&rows)),
        "csv" => match rows_to_csv(&rows) {
            Ok(body) => ApiResponse {
                status: 200,
                content_type: "text/csv",
                body,
                location: None,
            },
            Err(e) => {
                warn!("CSV export failed: {}", e);
                ApiResponse::error(500, "CSV export failed")
            }
        },
        _ => ApiResponse::error(400, "Unsupported format"),
    }
}

/// Rows as JSON objects keyed by column letter.
fn rows_to_json(rows: &[Vec<String>]) -> String {
    let data: Vec<Value> = rows
        .iter()
        .map(|row| {
            let mut object = Map::new();
            for (index, value) in row.iter().enumerate() {
                object.insert(a1::column_index_to_letter(index), Value::String(value.clone()));
            }
            Value::Object(object)
        })
        .collect();

    serde_json::to_string_pretty(&data).unwrap_or_default()
}

fn rows_to_csv(rows: &[Vec<String>]) -> Result<String> {
    // Sparse rows have ragged lengths, so the writer must be flexible
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new());
    for row in rows {
        writer
            .write_record(row)
            .map_err(|e| AppError::Other(anyhow!("{}", e)))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| AppError::Other(anyhow!("{}", e)))?;
    String::from_utf8(bytes).map_err(|e| AppError::Other(anyhow!("{}", e)))
}

/// A spreadsheet operation posted to `/action/<endpoint>`.
///
/// Variant and field names follow the JSON bodies; the endpoint segment in
/// the URL selects the variant.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    AdjustCell {
        spreadsheet: String,
        #[serde(default)]
        adjustment: Adjustment,
        cell: String,
        value: String,
    },
    AddSheet {
        spreadsheet: String,
        name: String,
    },
    DuplicateSheet {
        spreadsheet: String,
        source: String,
        name: String,
    },
    ClearSheet {
        spreadsheet: String,
        sheet: String,
    },
    DeleteRowColumn {
        spreadsheet: String,
        sheet: String,
        dimension: Dimension,
        start: String,
        stop: String,
    },
}

pub fn parse_action(endpoint: &str, body: &str) -> Option<Action> {
    let tag = match endpoint {
        "adjust-cell" => "adjustCell",
        "add-sheet" => "addSheet",
        "duplicate-sheet" => "duplicateSheet",
        "clear-sheet" => "clearSheet",
        "delete-row-column" => "deleteRowColumn",
        _ => return None,
    };
    let payload: Value = serde_json::from_str(body).ok()?;
    serde_json::from_value(json!({ tag: payload })).ok()
}

pub async fn run_action<A, T>(gateway: &MutationGateway<A, T>, action: Action)
where
    A: SheetsApi,
    T: TokenSource,
{
    match action {
        Action::AdjustCell {
            spreadsheet,
            adjustment,
            cell,
            value,
        } => {
            gateway
                .adjust_cell(adjustment, &spreadsheet, &cell, &value)
                .await
        }
        Action::AddSheet { spreadsheet, name } => gateway.add_sheet(&spreadsheet, &name).await,
        Action::DuplicateSheet {
            spreadsheet,
            source,
            name,
        } => gateway.duplicate_sheet(&spreadsheet, &source, &name).await,
        Action::ClearSheet {
            spreadsheet,
            sheet,
        } => gateway.clear_sheet(&spreadsheet, &sheet).await,
        Action::DeleteRowColumn {
            spreadsheet,
            sheet,
            dimension,
            start,
            stop,
        } => {
            gateway
                .delete_row_column(&spreadsheet, &sheet, dimension, &start, &stop)
                .await
        }
    }
}

fn handle_post(
    path: &str,
    body: &str,
    gateway: &Arc<MutationGateway<SheetsClient, TokenManager>>,
    runtime: &Handle,
) -> ApiResponse {
    let lowered = path.trim_matches('/').to_lowercase();
    let Some(endpoint) = lowered.strip_prefix("action/") else {
        return ApiResponse::error(404, "Not Found");
    };
    match parse_action(endpoint, body) {
        Some(action) => {
            let gateway = gateway.clone();
            runtime.spawn(async move { run_action(&gateway, action).await });
            ApiResponse::json(202, json!({ "status": 202, "message": "Accepted" }).to_string())
        }
        None => ApiResponse::error(400, "Invalid action request"),
    }
}

pub struct HttpServer {
    server: Arc<Server>,
    handle: tokio::task::JoinHandle<()>,
}

impl HttpServer {
    /// Bind the listener and serve requests on a blocking task.
    ///
    /// Must be called from within the tokio runtime; posted actions are
    /// spawned back onto it.
    pub fn spawn(
        port: u16,
        cache: Arc<SheetCache>,
        gateway: Arc<MutationGateway<SheetsClient, TokenManager>>,
        consent_url: Option<Url>,
    ) -> Result<HttpServer> {
        let bind_addr = format!("0.0.0.0:{}", port);
        let server = Arc::new(
            Server::http(&bind_addr)
                .map_err(|e| AppError::Config(format!("Failed to bind to {}: {}", bind_addr, e)))?,
        );
        debug!(addr = bind_addr, "HTTP server listening");

        let runtime = Handle::current();
        let listener = server.clone();
        let handle = tokio::task::spawn_blocking(move || {
            for mut request in listener.incoming_requests() {
                let host = request
                    .headers()
                    .iter()
                    .find(|header| header.field.equiv("Host"))
                    .map(|header| header.value.as_str().to_string())
                    .unwrap_or_else(|| "localhost".to_string());

                let (path, query) = split_request_url(request.url());
                let api_response = if *request.method() == Method::Post {
                    let mut body = String::new();
                    let _ = request.as_reader().read_to_string(&mut body);
                    handle_post(&path, &body, &gateway, &runtime)
                } else {
                    route(&path, &query, &host, &cache, consent_url.as_ref())
                };

                let mut response = Response::from_string(api_response.body)
                    .with_status_code(api_response.status);
                if let Ok(header) =
                    Header::from_bytes("Content-Type", api_response.content_type)
                {
                    response = response.with_header(header);
                }
                if let Some(location) = api_response.location
                    && let Ok(header) = Header::from_bytes("Location", location)
                {
                    response = response.with_header(header);
                }

                if let Err(e) = request.respond(response) {
                    debug!("Failed to send HTTP response: {}", e);
                }
            }
        });

        Ok(HttpServer { server, handle })
    }

    /// Stop accepting requests and wait for the serving task to finish.
    pub async fn shutdown(self) {
        self.server.unblock();
        let _ = self.handle.await;
    }
}

fn split_request_url(raw: &str) -> (String, HashMap<String, String>) {
    match Url::parse(&format!("http://localhost{}", raw)) {
        Ok(url) => {
            let query = url
                .query_pairs()
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            (url.path().to_string(), query)
        }
        Err(_) => (raw.to_string(), HashMap::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::test_helpers::populated_cache;

    fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_list_spreadsheets() {
        let cache = populated_cache();
        let response = route("/spreadsheets", &query(&[]), "localhost:8787", &cache, None);

        assert_eq!(response.status, 200);
        let body: serde_json::Value = serde_json::from_str(&response.body).unwrap();
        assert_eq!(body[0]["id"], "S1");
        assert_eq!(body[0]["title"], "Scores");
        assert_eq!(
            body[0]["sheets"][0],
            "http://localhost:8787/spreadsheet?id=S1&sheet=Sheet1"
        );
    }

    #[test]
    fn test_get_spreadsheet_json() {
        let cache = populated_cache();
        let response = route(
            "/spreadsheet",
            &query(&[("id", "S1"), ("sheet", "Sheet1")]),
            "localhost",
            &cache,
            None,
        );

        assert_eq!(response.status, 200);
        let body: serde_json::Value = serde_json::from_str(&response.body).unwrap();
        assert_eq!(body[0]["A"], "10");
        assert_eq!(body[0]["B"], "20");
    }

    #[test]
    fn test_get_spreadsheet_csv() {
        let cache = populated_cache();
        let response = route(
            "/spreadsheet",
            &query(&[("id", "S1"), ("sheet", "Sheet1"), ("format", "csv")]),
            "localhost",
            &cache,
            None,
        );

        assert_eq!(response.status, 200);
        assert_eq!(response.content_type, "text/csv");
        assert_eq!(response.body.trim(), "10,20");
    }

    #[test]
    fn test_get_spreadsheet_not_found() {
        let cache = populated_cache();

        let response = route(
            "/spreadsheet",
            &query(&[("id", "nope"), ("sheet", "Sheet1")]),
            "localhost",
            &cache,
            None,
        );
        assert_eq!(response.status, 404);
        assert!(response.body.contains("Spreadsheet ID not found"));

        let response = route(
            "/spreadsheet",
            &query(&[("id", "S1"), ("sheet", "Nope")]),
            "localhost",
            &cache,
            None,
        );
        assert_eq!(response.status, 404);
        assert!(response.body.contains("Sheet Title not found"));
    }

    #[test]
    fn test_get_spreadsheet_bad_format() {
        let cache = populated_cache();
        let response = route(
            "/spreadsheet",
            &query(&[("id", "S1"), ("sheet", "Sheet1"), ("format", "xml")]),
            "localhost",
            &cache,
            None,
        );
        assert_eq!(response.status, 400);
    }

    #[test]
    fn test_auth_redirects_when_configured() {
        let cache = SheetCache::new();
        let consent = Url::parse("https://accounts.google.com/o/oauth2/v2/auth?client_id=c").unwrap();

        let response = route("/auth", &query(&[]), "localhost", &cache, Some(&consent));
        assert_eq!(response.status, 302);
        assert_eq!(response.location.as_deref(), Some(consent.as_str()));

        let response = route("/auth", &query(&[]), "localhost", &cache, None);
        assert_eq!(response.status, 400);
    }

    #[test]
    fn test_unknown_path_is_404() {
        let cache = SheetCache::new();
        let response = route("/nope", &query(&[]), "localhost", &cache, None);
        assert_eq!(response.status, 404);
    }

    #[test]
    fn test_parse_action() {
        let action = parse_action(
            "adjust-cell",
            r#"{ "spreadsheet": "S1", "cell": "Sheet1!A1", "value": "5" }"#,
        )
        .unwrap();
        assert_eq!(
            action,
            Action::AdjustCell {
                spreadsheet: "S1".to_string(),
                adjustment: Adjustment::Set,
                cell: "Sheet1!A1".to_string(),
                value: "5".to_string(),
            }
        );

        let action = parse_action(
            "delete-row-column",
            r#"{
                "spreadsheet": "S1",
                "sheet": "Sheet1",
                "dimension": "COLUMNS",
                "start": "A",
                "stop": "C"
            }"#,
        )
        .unwrap();
        assert_eq!(
            action,
            Action::DeleteRowColumn {
                spreadsheet: "S1".to_string(),
                sheet: "Sheet1".to_string(),
                dimension: Dimension::Columns,
                start: "A".to_string(),
                stop: "C".to_string(),
            }
        );

        assert!(parse_action("adjust-cell", "not json").is_none());
        assert!(parse_action("adjust-cell", r#"{ "spreadsheet": "S1" }"#).is_none());
        assert!(parse_action("nope", "{}").is_none());
    }

    #[tokio::test]
    async fn test_run_action_reaches_gateway() {
        use crate::config::PollConfig;
        use crate::ratelimit::RateLimiter;
        use crate::sheets::auth::test_helpers::StaticTokens;
        use crate::sync::mocks::MockSheetsApi;

        let api = Arc::new(MockSheetsApi::default());
        let gateway = MutationGateway::new(
            api.clone(),
            Arc::new(populated_cache()),
            Arc::new(RateLimiter::new()),
            Arc::new(StaticTokens::ready("token")),
            PollConfig {
                spreadsheet_ids: "S1".to_string(),
                reference_by_index: false,
                interval_secs: 1.5,
            },
        );

        run_action(
            &gateway,
            Action::AddSheet {
                spreadsheet: "S1".to_string(),
                name: "Totals".to_string(),
            },
        )
        .await;

        assert_eq!(api.batch_updates.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_split_request_url() {
        let (path, query) = split_request_url("/spreadsheet?id=S1&sheet=My%20Sheet");
        assert_eq!(path, "/spreadsheet");
        assert_eq!(query.get("id").unwrap(), "S1");
        assert_eq!(query.get("sheet").unwrap(), "My Sheet");
    }
}
