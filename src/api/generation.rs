//! Generation API: submit product batches, re-fetch results, download CSV

use futures::StreamExt;
use tracing::info;

use crate::api::types::{BatchResponse, ProductInput};
use crate::api::{mock, ApiClient};
use crate::csvio;
use crate::error::ApiError;

/// Longest accepted value for any single product field.
const MAX_FIELD_LEN: usize = 500;
/// Largest batch accepted in one submission.
const MAX_BATCH_SIZE: usize = 100;

/// Submit a batch of product inputs for description generation.
pub async fn generate_batch(
    client: &ApiClient,
    inputs: &[ProductInput],
) -> Result<BatchResponse, ApiError> {
    validate_inputs(inputs)?;
    if client.mock_mode() {
        return Ok(mock::generate_batch(inputs));
    }
    let batch: BatchResponse = client.post_json("/api/generate-batch", inputs).await?;
    info!(batch_id = %batch.batch_id, items = batch.items.len(), "batch generated");
    Ok(batch)
}

/// Submit a raw CSV upload for generation. The backend parses the file; in
/// mock mode the CSV is parsed locally with the same row-drop rules.
pub async fn generate_batch_csv(client: &ApiClient, csv: String) -> Result<BatchResponse, ApiError> {
    if csv.trim().is_empty() {
        return Err(ApiError::Validation("CSV upload is empty.".to_string()));
    }
    if client.mock_mode() {
        let inputs =
            csvio::parse_products(&csv).map_err(|e| ApiError::Validation(e.to_string()))?;
        validate_inputs(&inputs)?;
        return Ok(mock::generate_batch(&inputs));
    }

    let part = reqwest::multipart::Part::text(csv)
        .file_name("products.csv")
        .mime_str("text/csv")
        .map_err(ApiError::from_transport)?;
    let form = reqwest::multipart::Form::new().part("file", part);
    let response = ApiClient::send(client.post("/api/generate-batch").multipart(form)).await?;
    let response = ApiClient::check_status(response).await?;
    ApiClient::decode(response).await
}

/// Re-fetch a previously generated batch by id.
pub async fn fetch_batch(client: &ApiClient, batch_id: &str) -> Result<BatchResponse, ApiError> {
    let batch_id = valid_id(batch_id)?;
    if client.mock_mode() {
        return Ok(mock::fetch_batch(batch_id));
    }
    client.get_json(&format!("/batch/{}", batch_id)).await
}

/// Download a batch export (CSV text) from the backend.
pub async fn download_batch(client: &ApiClient, batch_id: &str) -> Result<String, ApiError> {
    let batch_id = valid_id(batch_id)?;
    if client.mock_mode() {
        return Ok(csvio::export_items(&mock::fetch_batch(batch_id).items));
    }

    let response = ApiClient::send(client.get(&format!("/download/{}", batch_id))).await?;
    let response = ApiClient::check_status(response).await?;

    let mut stream = response.bytes_stream();
    let mut buf: Vec<u8> = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(ApiError::from_transport)?;
        buf.extend_from_slice(&chunk);
    }
    String::from_utf8(buf)
        .map_err(|e| ApiError::Unexpected(format!("Download was not valid UTF-8: {}", e)))
}

/// Shape-only validation: presence and length. Business rules (credits,
/// entitlement) are the backend's call.
fn validate_inputs(inputs: &[ProductInput]) -> Result<(), ApiError> {
    if inputs.is_empty() {
        return Err(ApiError::Validation(
            "Add at least one product before generating.".to_string(),
        ));
    }
    if inputs.len() > MAX_BATCH_SIZE {
        return Err(ApiError::Validation(format!(
            "A batch can hold at most {} products.",
            MAX_BATCH_SIZE
        )));
    }
    for (row, input) in inputs.iter().enumerate() {
        let required = [
            ("product name", &input.product_name),
            ("category", &input.category),
            ("features", &input.features),
            ("audience", &input.audience),
        ];
        for (label, value) in required {
            if value.trim().is_empty() {
                return Err(ApiError::Validation(format!(
                    "Row {}: {} is required.",
                    row + 1,
                    label
                )));
            }
            if value.len() > MAX_FIELD_LEN {
                return Err(ApiError::Validation(format!(
                    "Row {}: {} is longer than {} characters.",
                    row + 1,
                    label,
                    MAX_FIELD_LEN
                )));
            }
        }
        if let Some(keywords) = &input.keywords {
            if keywords.len() > MAX_FIELD_LEN {
                return Err(ApiError::Validation(format!(
                    "Row {}: keywords are longer than {} characters.",
                    row + 1,
                    MAX_FIELD_LEN
                )));
            }
        }
    }
    Ok(())
}

fn valid_id(id: &str) -> Result<&str, ApiError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(ApiError::Validation("Batch id is required.".to_string()));
    }
    Ok(id)
}
