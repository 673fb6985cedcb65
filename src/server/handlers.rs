//! Request handlers.

use crate::generate::{generate_invoice, GeneratedInvoice};
use crate::order::{format_date, format_money};
use crate::server::error::ServiceError;
use crate::server::request::{
    DeleteRequest, DeleteResponse, GenerateRequest, GenerateResponse, InvoiceListing, ListQuery,
};
use crate::server::AppState;
use crate::store::InvoiceStore;
use crate::InvoiceError;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde_json::json;
use tracing::{debug, info};

const STREAM_FILENAME: &str = "factura.pdf";

fn store(state: &AppState) -> Result<&InvoiceStore, ServiceError> {
    state
        .store
        .as_ref()
        .ok_or(ServiceError::Invoice(InvoiceError::StorageNotConfigured))
}

/// `POST /api/generar-pdf`
pub async fn generate(
    State(state): State<AppState>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Response, ServiceError> {
    let Json(request) =
        payload.map_err(|e| ServiceError::BadRequest(format!("Invalid payload: {}", e.body_text())))?;
    let order = request.into_order(&state.config.default_owner, Utc::now())?;
    info!(owner = %order.owner, items = order.items.len(), "Generating invoice");

    let generated = generate_invoice(&order, &state.fetcher, state.store.as_ref(), &state.config)
        .await
        .map_err(ServiceError::Generation)?;

    Ok(match generated {
        GeneratedInvoice::Stored(stored) => Json(GenerateResponse {
            success: true,
            url: stored.url,
            pathname: stored.key,
        })
        .into_response(),
        GeneratedInvoice::Inline(document) => pdf_response(document.into_bytes(), STREAM_FILENAME),
    })
}

/// `GET /api/GetFacturas?email=<owner>`
pub async fn list_invoices(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Vec<InvoiceListing>>, ServiceError> {
    let Query(query) = query.map_err(|e| ServiceError::BadRequest(e.body_text()))?;
    let email = query
        .email
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .ok_or_else(|| ServiceError::BadRequest("email is required".into()))?;

    let invoices = store(&state)?.list(&email).await?;
    let offset = state.config.display_offset();
    let symbol = &state.config.currency_symbol;
    debug!("Listing {} invoices for '{}'", invoices.len(), email);

    Ok(Json(
        invoices
            .into_iter()
            .map(|invoice| InvoiceListing {
                url: invoice.url,
                time: format_date(&invoice.created_at, &offset),
                cost: format_money(symbol, &invoice.cost),
            })
            .collect(),
    ))
}

/// `POST /api/DeletePdf`
pub async fn delete_invoice(
    State(state): State<AppState>,
    payload: Result<Json<DeleteRequest>, JsonRejection>,
) -> Result<Json<DeleteResponse>, ServiceError> {
    let Json(request) =
        payload.map_err(|e| ServiceError::BadRequest(format!("Invalid payload: {}", e.body_text())))?;
    let locator = request
        .file_url
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| ServiceError::BadRequest("fileUrl is required".into()))?;

    store(&state)?.delete(locator.trim()).await?;

    Ok(Json(DeleteResponse {
        success: true,
        message: "Invoice deleted".into(),
    }))
}

/// `GET /invoices/{key}`: serve an object from a local backend.
pub async fn download(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response, ServiceError> {
    let bytes = store(&state)?.fetch(&key).await?;
    Ok(pdf_response(bytes, &key))
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "delivery": state.config.delivery,
        "storage": state.store.as_ref().map(InvoiceStore::backend_name),
    }))
}

/// Fallback for known paths hit with the wrong method.
pub async fn method_not_allowed() -> ServiceError {
    ServiceError::MethodNotAllowed
}

/// Inline PDF with caching disabled at every layer.
fn pdf_response(bytes: Vec<u8>, filename: &str) -> Response {
    let filename = filename.replace('"', "");
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{filename}\""),
            ),
            (
                header::CACHE_CONTROL,
                "no-store, no-cache, must-revalidate, proxy-revalidate".to_string(),
            ),
            (header::PRAGMA, "no-cache".to_string()),
            (header::EXPIRES, "0".to_string()),
            (
                HeaderName::from_static("surrogate-control"),
                "no-store".to_string(),
            ),
        ],
        bytes,
    )
        .into_response()
}
