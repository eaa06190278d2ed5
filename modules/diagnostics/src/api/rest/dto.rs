use serde::Serialize;

/// Response of `GET /Diagnostics/Info`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoDto {
    pub title: String,
    pub version: String,
    pub product_name: String,
    pub started_at: String,
    pub uptime_secs: i64,
}
