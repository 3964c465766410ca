use crate::api::AppState;
use crate::api::schemas::bulk::{BulkJobView, ExtractResponse, RecentBulkResponse, RecentQuery, SendBulkResponse};
use crate::domain::job::{AttachmentFile, BulkJobRequest};
use crate::error::{AppError, Result};
use axum::{
    Json,
    extract::{Multipart, Query, State, multipart::Field},
    response::IntoResponse,
};
use bytes::Bytes;

#[derive(Debug)]
struct Upload {
    filename: String,
    data: Bytes,
}

/// Text and file fields of a `/send_bulk` form.
#[derive(Debug, Default)]
struct BulkForm {
    file: Option<Upload>,
    subject: String,
    content: String,
    content_html: Option<String>,
    cc: Vec<String>,
    bcc: Vec<String>,
    attachments: Vec<AttachmentFile>,
}

fn multipart_error(e: impl std::fmt::Display) -> AppError {
    AppError::BadRequest(format!("Malformed form data: {e}"))
}

async fn text(field: Field<'_>) -> Result<String> {
    field.text().await.map_err(multipart_error)
}

async fn upload(field: Field<'_>) -> Result<Upload> {
    let filename = field.file_name().unwrap_or_default().to_string();
    let data = field.bytes().await.map_err(multipart_error)?;
    Ok(Upload { filename, data })
}

/// Splits a comma separated address list, dropping blanks.
fn address_list(raw: &str) -> Vec<String> {
    raw.split(',').map(str::trim).filter(|a| !a.is_empty()).map(ToString::to_string).collect()
}

async fn read_file_field(multipart: &mut Multipart) -> Result<Option<Upload>> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() == Some("file") {
            return upload(field).await.map(Some);
        }
    }
    Ok(None)
}

async fn read_bulk_form(multipart: &mut Multipart, max_attachments: usize) -> Result<BulkForm> {
    let mut form = BulkForm::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => form.file = Some(upload(field).await?),
            "subject" => form.subject = text(field).await?,
            "content" => form.content = text(field).await?,
            "content_html" => form.content_html = Some(text(field).await?),
            "cc" => form.cc = address_list(&text(field).await?),
            "bcc" => form.bcc = address_list(&text(field).await?),
            "attachments" => {
                let content_type = field.content_type().map(ToString::to_string);
                let Upload { filename, data } = upload(field).await?;
                // Browsers submit an empty part for an untouched file input.
                if filename.is_empty() && data.is_empty() {
                    continue;
                }
                if form.attachments.len() == max_attachments {
                    return Err(AppError::BadRequest(format!("At most {max_attachments} attachments are allowed")));
                }
                form.attachments.push(AttachmentFile { filename, content_type, data });
            }
            other => tracing::debug!(field = %other, "Ignoring unknown form field"),
        }
    }

    Ok(form)
}

fn require_named(upload: Option<Upload>) -> Result<Upload> {
    let upload = upload.ok_or_else(|| AppError::BadRequest("No file uploaded".into()))?;
    if upload.filename.trim().is_empty() {
        return Err(AppError::BadRequest("No file selected".into()));
    }
    Ok(upload)
}

/// Returns the recipient list found in an uploaded spreadsheet.
///
/// # Errors
/// Returns `AppError::BadRequest` if no usable file was uploaded,
/// `AppError::InvalidSpreadsheet` or `AppError::NoRecipients` if extraction fails.
pub async fn extract_recipients(State(state): State<AppState>, mut multipart: Multipart) -> Result<impl IntoResponse> {
    let file = require_named(read_file_field(&mut multipart).await?)?;
    let emails = state.recipient_service.extract(&file.filename, file.data).await?;
    Ok(Json(ExtractResponse::from(emails)))
}

/// Sends one message per recipient of the uploaded spreadsheet.
///
/// # Errors
/// Returns a 4xx `AppError` if the job could not start. Per-recipient failures are
/// part of the successful response.
pub async fn send_bulk(State(state): State<AppState>, mut multipart: Multipart) -> Result<impl IntoResponse> {
    let form = read_bulk_form(&mut multipart, state.config.delivery.max_attachments).await?;
    let file = require_named(form.file)?;
    let recipients = state.recipient_service.extract(&file.filename, file.data).await?;

    let request = BulkJobRequest {
        subject: form.subject,
        plain_body: form.content,
        html_body: form.content_html,
        cc: form.cc,
        bcc: form.bcc,
        attachments: form.attachments,
        recipients,
    };

    let report = state.bulk_send_service.send(request).await?;
    Ok(Json(SendBulkResponse::from(report)))
}

/// Lists the most recent bulk jobs with their per-recipient history.
///
/// # Errors
/// Returns `AppError::Database` if the history cannot be read.
pub async fn recent_bulk(State(state): State<AppState>, Query(query): Query<RecentQuery>) -> Result<impl IntoResponse> {
    let jobs = state.history_service.recent(query.limit).await?;
    Ok(Json(RecentBulkResponse { success: true, data: jobs.into_iter().map(BulkJobView::from).collect() }))
}
