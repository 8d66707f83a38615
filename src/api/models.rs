use crate::api::{ModelError, ModelInfo, TagsResponse};
use crate::utils::url::construct_api_url;

/// Summarise an error body: the `error` field of a JSON payload when
/// present, otherwise the trimmed text collapsed onto one line.
pub fn extract_error_summary(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    let summary = serde_json::from_str::<serde_json::Value>(trimmed)
        .ok()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .and_then(|v| v.as_str())
                .map(str::to_owned)
                .or_else(|| {
                    value
                        .get("error")
                        .and_then(|v| v.as_str().map(str::to_owned))
                })
        });

    let text = summary.unwrap_or_else(|| trimmed.to_string());
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ModelError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(ModelError::Status {
        status,
        message: extract_error_summary(&body),
    })
}

pub async fn fetch_models(
    client: &reqwest::Client,
    base_url: &str,
) -> Result<Vec<ModelInfo>, ModelError> {
    let tags_url = construct_api_url(base_url, "api/tags");
    let response = client.get(tags_url).send().await?;
    let response = check_status(response).await?;
    let tags = response
        .json::<TagsResponse>()
        .await
        .map_err(|err| ModelError::Decode(err.to_string()))?;
    Ok(tags.models)
}

pub fn sort_models(models: &mut [ModelInfo]) {
    // Newest first when the server reports modification times, then by name.
    models.sort_by(|a, b| match (&a.modified_at, &b.modified_at) {
        (Some(a_at), Some(b_at)) => b_at.cmp(a_at).then_with(|| a.name.cmp(&b.name)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.name.cmp(&b.name),
    });
}
