//! Helpers for the model endpoint URL.

/// Strip trailing slashes so endpoint paths can be appended safely.
///
/// ```
/// use aiterm::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("http://localhost:11434/"), "http://localhost:11434");
/// assert_eq!(normalize_base_url("http://gpu-box:11434///"), "http://gpu-box:11434");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Join a base URL and an API path with exactly one slash between them.
///
/// ```
/// use aiterm::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("http://localhost:11434/", "/api/generate"),
///     "http://localhost:11434/api/generate"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let endpoint = endpoint.trim_start_matches('/');
    format!("{}/{}", normalized_base, endpoint)
}

/// Check that `value` is an absolute http(s) URL and return it normalised.
pub fn validate_model_url(value: &str) -> Result<String, String> {
    let trimmed = value.trim();
    let parsed =
        reqwest::Url::parse(trimmed).map_err(|err| format!("Invalid URL '{trimmed}': {err}"))?;
    match parsed.scheme() {
        "http" | "https" => Ok(normalize_base_url(trimmed)),
        other => Err(format!(
            "Unsupported URL scheme '{other}' (expected http or https)"
        )),
    }
}
