//! API Handlers
//!
//! Report runs, workflows and redemptions touch datasources and script
//! engines, so they run on the blocking pool.

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use rpt_core::{
    Compression, ExecutionResults, ExportFormat, ParameterDeclaration, ReportError, RuntimeParameter,
    RuntimeParameters, WorkflowResult,
};
use rpt_engine::ParameterResolver;
use rpt_reports::ExportRequest;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::Instant;

use crate::error::ApiError;
use crate::state::AppState;

async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ApiError::Internal(format!("Worker task failed - {}", e)))?
}

pub async fn health() -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({ "status": "ok", "version": rpt_core::RPT_VERSION })),
    )
}

// ============================================================================
// Reports
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ReportSummary {
    pub name: String,
    #[serde(rename = "type")]
    pub report_type: String,
    pub description: Option<String>,
    pub datasources: Vec<String>,
}

pub async fn list_reports(State(state): State<AppState>) -> Json<Vec<ReportSummary>> {
    Json(
        state
            .reports
            .values()
            .map(|r| ReportSummary {
                name: r.definition.name.clone(),
                report_type: r.definition.report_type.clone(),
                description: r.definition.description.clone(),
                datasources: r.datasource_names.clone(),
            })
            .collect(),
    )
}

#[derive(Debug, Serialize)]
pub struct ParametersResponse {
    pub report: String,
    pub parameters: Vec<ParameterDeclaration>,
    pub required_datasources: usize,
    pub formats: Vec<String>,
}

pub async fn report_parameters(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ParametersResponse>, ApiError> {
    let response = blocking(move || {
        let configured = state
            .report(&name)
            .ok_or_else(|| ApiError::NotFound(format!("No report named [{}]", name)))?;
        let report = configured.build(&state.options)?;
        Ok(ParametersResponse {
            report: report.name().to_string(),
            parameters: report.parameter_schema().iter().cloned().collect(),
            required_datasources: report.required_datasources(),
            formats: report.supported_formats().iter().map(|f| f.name().to_string()).collect(),
        })
    })
    .await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct ExportBody {
    pub format: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub compression: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
}

/// Form text is kept as typed; other JSON values are already resolved
fn form_parameter(name: &str, value: &Value) -> RuntimeParameter {
    match value {
        Value::String(text) => ParameterResolver::from_form(name, Some(text)),
        Value::Null => ParameterResolver::from_form(name, None),
        other => ParameterResolver::direct(name, other.clone()),
    }
}

struct Artifact {
    bytes: Vec<u8>,
    format: ExportFormat,
    compression: Compression,
    filename: String,
}

pub async fn export_report(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<ExportBody>,
) -> Result<Response, ApiError> {
    let artifact = blocking(move || {
        let configured = state
            .report(&name)
            .ok_or_else(|| ApiError::NotFound(format!("No report named [{}]", name)))?;

        let format = ExportFormat::get_type(&body.format);
        let compression = Compression::from_name(body.compression.as_deref());
        let filename = body
            .filename
            .clone()
            .unwrap_or_else(|| format!("{}.{}", configured.definition.compact_name(), format.extension()));
        let request = ExportRequest::new(format)
            .with_compression(compression)
            .with_filename(filename.clone());

        let parameters: RuntimeParameters = body
            .parameters
            .iter()
            .map(|(k, v)| form_parameter(k, v))
            .collect();

        let started = Instant::now();
        let outcome = configured.build(&state.options).and_then(|mut report| {
            report.set_parameters(parameters);
            let mut bytes = Vec::new();
            report.export(&request, &mut bytes, &mut ExecutionResults::new())?;
            Ok(bytes)
        });
        state.metrics.record_export(
            &configured.definition.report_type,
            format.extension(),
            outcome.is_ok(),
            started.elapsed().as_secs_f64(),
        );

        Ok(Artifact {
            bytes: outcome?,
            format,
            compression,
            filename,
        })
    })
    .await?;

    let (content_type, filename) = match artifact.compression.extension() {
        Some(ext) => ("application/gzip", format!("{}.{}", artifact.filename, ext)),
        None => (artifact.format.mime_type(), artifact.filename),
    };
    Ok((
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", filename)),
        ],
        artifact.bytes,
    )
        .into_response())
}

// ============================================================================
// Workflows & actions
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct WorkflowBody {
    #[serde(default)]
    pub settings: Map<String, Value>,
    #[serde(default)]
    pub return_output: bool,
}

pub async fn execute_workflow(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(body): Json<WorkflowBody>,
) -> Result<Json<WorkflowResult>, ApiError> {
    let result = blocking(move || {
        if state.workflows.get(&code).is_none() {
            return Err(ApiError::NotFound(format!("No workflow found with code [{}]", code)));
        }
        let result = state.workflows.run(&code, &body.settings, body.return_output)?;
        state.metrics.record_workflow(!result.in_error());
        Ok(result)
    })
    .await?;
    Ok(Json(result))
}

/// True when the client ranks `text/html` above JSON
pub fn prefers_html(headers: &HeaderMap) -> bool {
    let Some(accept) = headers.get(header::ACCEPT).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let accept = accept.to_ascii_lowercase();
    match (accept.find("text/html"), accept.find("application/json")) {
        (Some(html), Some(json)) => html < json,
        (Some(_), None) => true,
        _ => false,
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn action_page(title: &str, message: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>{title}</title></head>\n<body><h1>{title}</h1><p>{message}</p></body></html>\n",
        title = escape(title),
        message = escape(message).replace('\n', "<br>"),
    )
}

pub async fn redeem_action(
    State(state): State<AppState>,
    Path(guid): Path<String>,
    headers: HeaderMap,
) -> Response {
    let html = prefers_html(&headers);
    let metrics = state.metrics.clone();
    let outcome = blocking(move || state.redeemer.redeem(&guid).map_err(ApiError::from)).await;

    match outcome {
        Ok(result) => {
            metrics.record_redemption(if result.in_error() { "error" } else { "ok" });
            if html {
                let page = match (&result.error, &result.information) {
                    (Some(error), _) => action_page("Action failed", error),
                    (None, Some(info)) => action_page("Action complete", info),
                    (None, None) => action_page("Action complete", ""),
                };
                Html(page).into_response()
            } else {
                Json(result).into_response()
            }
        }
        Err(ApiError::Report(ReportError::InvalidAction)) => {
            metrics.record_redemption("invalid");
            let message = ReportError::InvalidAction.message();
            if html {
                (StatusCode::BAD_REQUEST, Html(action_page("Invalid action", &message))).into_response()
            } else {
                ApiError::from(ReportError::InvalidAction).into_response()
            }
        }
        Err(e) => {
            metrics.record_redemption("error");
            e.into_response()
        }
    }
}

pub async fn metrics(State(state): State<AppState>) -> Result<Response, ApiError> {
    let text = state
        .metrics
        .encode()
        .map_err(|e| ApiError::Internal(format!("Cannot encode metrics - {}", e)))?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], text).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn accept(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_prefers_html() {
        assert!(prefers_html(&accept("text/html,application/xhtml+xml,*/*;q=0.8")));
        assert!(!prefers_html(&accept("application/json, text/html")));
        assert!(!prefers_html(&accept("*/*")));
        assert!(!prefers_html(&HeaderMap::new()));
    }

    #[test]
    fn test_form_parameters() {
        assert_eq!(form_parameter("a", &json!(" select 1 ")).value, json!(" select 1 "));
        assert_eq!(form_parameter("b", &json!("[1..3]")).value, json!("[1..3]"));
        assert_eq!(form_parameter("c", &Value::Null).value, Value::Null);
        assert_eq!(form_parameter("d", &json!([1, 2])).value, json!([1, 2]));
    }

    #[test]
    fn test_action_page_escapes() {
        let page = action_page("Action complete", "<b>done</b>\nnext");
        assert!(page.contains("<p>&lt;b&gt;done&lt;/b&gt;<br>next</p>"));
    }
}
