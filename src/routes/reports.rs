use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde_json::{Value, json};

use crate::{
    AppState,
    error::{AppError, Result},
    models::{ReportFormat, ReportRequest, ScreenReportResponse},
    queries::report_queries,
    routes::attachment,
    services::{prompt_parser, report_builder, report_export},
};

fn prompt_from(payload: &ReportRequest) -> Result<String> {
    payload
        .prompt
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::BadRequest("A prompt is required".to_string()))
}

pub async fn generate_report(
    State(state): State<AppState>,
    Json(payload): Json<ReportRequest>,
) -> Result<Response> {
    let prompt = prompt_from(&payload)?;
    let params = prompt_parser::parse_prompt(&prompt, Utc::now().date_naive());

    tracing::info!(
        "Generating {:?} report grouped by {:?} for {}",
        params.format,
        params.group_by,
        params.period_text
    );
    if params.used_defaults {
        tracing::info!("Prompt '{}' not understood, using defaults", prompt);
    }
    if !params.filters.is_empty() {
        tracing::info!("Report filters: {:?}", params.filters);
    }

    let lines = report_queries::completed_lines(&state.db, params.range, &params.filters).await?;
    let report = report_builder::build_report(&params, &lines);

    let response = match params.format {
        ReportFormat::Screen => Json(ScreenReportResponse {
            prompt,
            params,
            report,
        })
        .into_response(),
        ReportFormat::Pdf => attachment(
            report_export::render_pdf(&report)?,
            report_export::PDF_CONTENT_TYPE,
            &report_export::report_filename(&report, "pdf"),
        ),
        ReportFormat::Excel => attachment(
            report_export::render_xlsx(&report)?,
            report_export::XLSX_CONTENT_TYPE,
            &report_export::report_filename(&report, "xlsx"),
        ),
    };

    Ok(response)
}

/// Shows how a prompt would be understood without running the report.
pub async fn interpret_prompt(Json(payload): Json<ReportRequest>) -> Result<Json<Value>> {
    let prompt = prompt_from(&payload)?;
    let params = prompt_parser::parse_prompt(&prompt, Utc::now().date_naive());

    Ok(Json(json!({
        "prompt": prompt,
        "interpretation": params.interpretation.join("\n"),
        "suggestions": params.suggestions,
        "params": params,
    })))
}
