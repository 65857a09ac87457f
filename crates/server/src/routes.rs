use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, Request, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use salesdesk_core::FiscalMonth;
use salesdesk_import::{
    import::{import_report, report_workbook},
    merge_monthly, month_wise, process_report, read_any, with_total, write_workbook, ReportKind,
};
use salesdesk_storage::{FileKind, FileMeta};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::error::ApiError;
use crate::state::AppState;

type Record = Map<String, Value>;

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/files", post(upload_file).get(list_files))
        .route("/files/{id}", get(download_file).delete(delete_file))
        .route("/files/{id}/process", post(process_file))
        .route("/merge", post(merge_files))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    id = %uuid::Uuid::new_v4(),
                    method = %req.method(),
                    uri = %req.uri(),
                )
            }),
        )
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

struct Upload {
    file_name: String,
    bytes: Vec<u8>,
}

#[derive(Default)]
struct UploadForm {
    files: Vec<Upload>,
    fields: HashMap<String, String>,
}

impl UploadForm {
    async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = UploadForm::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "file" => {
                    let file_name = field
                        .file_name()
                        .map(str::to_string)
                        .ok_or_else(|| ApiError::bad_request("File part has no file name"))?;
                    check_extension(&file_name)?;
                    let bytes = field.bytes().await?.to_vec();
                    form.files.push(Upload { file_name, bytes });
                }
                "kind" | "sheet" | "header_row" => {
                    let value = field.text().await?;
                    form.fields.insert(name, value.trim().to_string());
                }
                other => tracing::debug!(field = other, "ignoring form field"),
            }
        }
        Ok(form)
    }

    fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    fn header_row(&self) -> Result<usize, ApiError> {
        self.field("header_row")
            .map(|v| v.parse::<usize>())
            .transpose()
            .map_err(|_| ApiError::bad_request("header_row must be a non-negative whole number"))
            .map(Option::unwrap_or_default)
    }
}

const ACCEPTED_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods", "csv"];

fn check_extension(file_name: &str) -> Result<(), ApiError> {
    let ext = std::path::Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    if ACCEPTED_EXTENSIONS.contains(&ext.as_str()) {
        Ok(())
    } else {
        Err(ApiError::bad_request(format!(
            "Unsupported file type '{file_name}'"
        )))
    }
}

const MAX_SHEET_NAME: usize = 31;

/// Worksheet names are limited to 31 characters and may not contain any of `[]:*?/\`.
fn sheet_name(raw: &str) -> String {
    raw.chars()
        .map(|c| if "[]:*?/\\".contains(c) { '-' } else { c })
        .take(MAX_SHEET_NAME)
        .collect()
}

/// Like [`sheet_name`], but names that collide (ignoring case) with one already in
/// `taken` get a ` (n)` suffix, shortening the base so the result still fits.
fn unique_sheet_name(raw: &str, taken: &[String]) -> String {
    let base = sheet_name(raw);
    let used = |candidate: &str| taken.iter().any(|t| t.eq_ignore_ascii_case(candidate));
    if !used(&base) {
        return base;
    }
    let mut n = 2;
    loop {
        let suffix = format!(" ({n})");
        let keep = MAX_SHEET_NAME.saturating_sub(suffix.chars().count());
        let candidate: String = base.chars().take(keep).chain(suffix.chars()).collect();
        if !used(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

fn report_kind(kind: FileKind) -> Option<ReportKind> {
    match kind {
        FileKind::Sales => Some(ReportKind::Sales),
        FileKind::Budget => Some(ReportKind::Budget),
        FileKind::Outstanding => Some(ReportKind::Outstanding),
        FileKind::Processed | FileKind::Merged => None,
    }
}

fn file_stem(name: &str) -> &str {
    std::path::Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub id: i64,
    pub duplicate: bool,
}

async fn upload_file(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    let mut form = UploadForm::read(multipart).await?;

    let kind = form
        .field("kind")
        .ok_or_else(|| ApiError::bad_request("Missing 'kind' field"))?
        .parse::<FileKind>()
        .map_err(ApiError::bad_request)?;
    if !kind.is_source() {
        return Err(ApiError::bad_request(format!(
            "'{kind}' files are produced by the server and cannot be uploaded"
        )));
    }
    if form.files.len() != 1 {
        return Err(ApiError::bad_request("Expected exactly one 'file' part"));
    }
    let upload = form.files.remove(0);

    let outcome =
        salesdesk_storage::insert_file(&state.db, &upload.file_name, kind, &upload.bytes, None)
            .await?;
    let status = if outcome.is_duplicate() {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((
        status,
        Json(UploadResponse {
            id: outcome.id(),
            duplicate: outcome.is_duplicate(),
        }),
    ))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    kind: Option<String>,
}

async fn list_files(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<FileMeta>>, ApiError> {
    let kind = query
        .kind
        .filter(|k| !k.trim().is_empty())
        .map(|k| k.parse::<FileKind>())
        .transpose()
        .map_err(ApiError::bad_request)?;
    Ok(Json(salesdesk_storage::list_files(&state.db, kind).await?))
}

async fn download_file(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let file = salesdesk_storage::get_file(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("File {id} not found")))?;

    let content_type = if file.meta.name.to_lowercase().ends_with(".csv") {
        "text/csv"
    } else {
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
    };
    let disposition = format!(
        "attachment; filename=\"{}\"",
        file.meta.name.replace(['"', '\\'], "_")
    );
    Ok((
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        file.content,
    ))
}

async fn delete_file(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if salesdesk_storage::delete_file(&state.db, id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!("File {id} not found")))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProcessRequest {
    pub sheet: Option<String>,
    /// Physical rows to skip before the search starts.
    pub header_row: usize,
    /// Treat row labels as executive codes and add per-executive sheets.
    pub by_executive: bool,
}

#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    pub processed_id: i64,
    pub duplicate: bool,
    pub kind: ReportKind,
    pub branches: Vec<Record>,
    pub regions: Vec<Record>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executives: Option<Vec<Record>>,
}

async fn process_file(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<ProcessRequest>,
) -> Result<Json<ProcessResponse>, ApiError> {
    let file = salesdesk_storage::get_file(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("File {id} not found")))?;
    let kind = report_kind(file.meta.kind).ok_or_else(|| {
        ApiError::bad_request(format!("'{}' files cannot be processed", file.meta.kind))
    })?;

    let executives = if req.by_executive {
        let directory = state
            .executives
            .clone()
            .ok_or_else(|| ApiError::bad_request("No executive directory is configured"))?;
        Some(directory)
    } else {
        None
    };

    let by_executive = req.by_executive;
    let normalizer = state.normalizer.clone();
    let name = file.meta.name.clone();
    let content = file.content;
    let (report, bytes) = tokio::task::spawn_blocking(move || -> Result<_, ApiError> {
        let report = import_report(
            &name,
            &content,
            req.sheet.as_deref(),
            req.header_row,
            kind,
            &normalizer,
            executives.as_deref(),
        )?;
        let bytes = report_workbook(&report, executives.as_deref())?;
        Ok((report, bytes))
    })
    .await??;

    let processed_name = format!("{}-processed.xlsx", file_stem(&file.meta.name));
    let outcome = salesdesk_storage::insert_file(
        &state.db,
        &processed_name,
        FileKind::Processed,
        &bytes,
        Some(id),
    )
    .await?;

    let executives = state
        .executives
        .as_ref()
        .filter(|_| by_executive)
        .map(|d| d.annotate(&report.extracted).to_records());

    Ok(Json(ProcessResponse {
        processed_id: outcome.id(),
        duplicate: outcome.is_duplicate(),
        kind,
        branches: with_total(report.branches).to_records(),
        regions: with_total(report.regions).to_records(),
        executives,
    }))
}

#[derive(Debug, Serialize)]
pub struct MergeResponse {
    pub id: i64,
    pub duplicate: bool,
    pub months: Vec<String>,
    pub records: Vec<Record>,
}

async fn merge_files(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<MergeResponse>, ApiError> {
    let form = UploadForm::read(multipart).await?;
    if form.files.is_empty() {
        return Err(ApiError::bad_request("No files to merge"));
    }

    let kind = match form.field("kind") {
        Some(k) => k.parse::<ReportKind>().map_err(ApiError::bad_request)?,
        None => ReportKind::Sales,
    };
    let sheet = form.field("sheet").map(str::to_string);
    let header_row = form.header_row()?;

    let mut monthly = Vec::with_capacity(form.files.len());
    for upload in form.files {
        let month = FiscalMonth::from_file_name(&upload.file_name).ok_or_else(|| {
            ApiError::bad_request(format!(
                "Cannot tell the month from file name '{}'",
                upload.file_name
            ))
        })?;
        monthly.push((month, upload));
    }

    let normalizer = state.normalizer.clone();
    let (months, merged, bytes) = tokio::task::spawn_blocking(move || -> Result<_, ApiError> {
        let mut tables = Vec::with_capacity(monthly.len());
        for (month, upload) in &monthly {
            let grid = read_any(&upload.file_name, &upload.bytes, sheet.as_deref(), header_row)?;
            let report = process_report(kind, &grid, &normalizer).map_err(|e| {
                ApiError::unparseable(format!("{} ({})", e, upload.file_name))
            })?;
            tables.push((*month, report.branches));
        }

        let mut months: Vec<FiscalMonth> = tables.iter().map(|(m, _)| *m).collect();
        months.sort();

        let merged = with_total(merge_monthly(tables.clone())?);
        let mut sheets = vec![("Cumulative".to_string(), merged.clone())];
        for header in &merged.headers {
            let spread = with_total(month_wise(tables.clone(), header)?);
            let taken: Vec<String> = sheets.iter().map(|(n, _)| n.clone()).collect();
            sheets.push((unique_sheet_name(&format!("{header} by month"), &taken), spread));
        }
        let named: Vec<(&str, &salesdesk_core::CleanTable)> =
            sheets.iter().map(|(n, t)| (n.as_str(), t)).collect();
        let bytes = write_workbook(&named)?;
        Ok((months, merged, bytes))
    })
    .await??;

    let name = match (months.first(), months.last()) {
        (Some(first), Some(last)) if first != last => format!("{kind}-cumulative-{first}-{last}.xlsx"),
        (Some(only), _) => format!("{kind}-cumulative-{only}.xlsx"),
        _ => format!("{kind}-cumulative.xlsx"),
    };
    let outcome =
        salesdesk_storage::insert_file(&state.db, &name, FileKind::Merged, &bytes, None).await?;

    Ok(Json(MergeResponse {
        id: outcome.id(),
        duplicate: outcome.is_duplicate(),
        months: months.iter().map(FiscalMonth::to_string).collect(),
        records: merged.to_records(),
    }))
}
