use url::Url;

/// Returns the host part of `url`, or an empty string when the URL parses
/// but has no host (`mailto:`, `data:` and friends).
pub fn host_of(url: &str) -> Result<String, url::ParseError> {
    let parsed = Url::parse(url)?;
    Ok(parsed.host_str().unwrap_or_default().to_string())
}
