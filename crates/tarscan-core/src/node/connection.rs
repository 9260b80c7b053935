use reqwest::Url;

use crate::error::CoreError;

/// Validate the configured node address and normalize it to a base URL
/// whose path ends in `/`.
pub(super) fn parse_base_url(connection: &str) -> Result<Url, CoreError> {
    let mut parsed = Url::parse(connection.trim()).map_err(|e| {
        CoreError::Config(format!(
            "invalid node url `{connection}`: expected HTTP(S) URL ({e})"
        ))
    })?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(CoreError::Config(format!(
                "unsupported node url scheme `{other}`; expected http or https"
            )));
        }
    }
    if parsed.query().is_some() || parsed.fragment().is_some() {
        return Err(CoreError::Config(format!(
            "node url `{connection}` must not carry a query or fragment"
        )));
    }
    if !parsed.path().ends_with('/') {
        let path = format!("{}/", parsed.path());
        parsed.set_path(&path);
    }
    Ok(parsed)
}
