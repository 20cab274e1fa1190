//! Wire types for the HTTP surface.

use serde::{Deserialize, Serialize};

/// One classified upload: the client-supplied filename and the raw
/// probability tensor, one row per image submitted to the model in that
/// call and one column per category label.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileClassification {
    pub file_name: String,
    pub probs: Vec<Vec<f32>>,
}

/// Successful `/predict` response. Entries appear in submission order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PredictResponse {
    pub results: Vec<FileClassification>,
}

/// Uniform error body for failed requests.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorDetail {
    pub detail: String,
}

/// Fixed acknowledgement returned by `/upload_files`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadAck {
    pub message: String,
}
