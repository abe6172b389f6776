use reqwest::Url;

use crate::errors::Error;
use crate::request::QueryValue;

/// Resolves an endpoint against the base URL.
///
/// Absolute endpoints (anything that parses with a scheme and host) are used
/// verbatim. Relative endpoints are appended as a path component of `base`,
/// regardless of whether `base` ends with a slash; a `?query` suffix on a
/// relative endpoint is kept as the query.
pub fn resolve_url(base: &Url, endpoint: &str) -> Result<Url, Error> {
    match Url::parse(endpoint) {
        Ok(url) if url.has_host() => return Ok(url),
        Err(err) if endpoint.contains("://") => {
            return Err(Error::InvalidUrl(format!("'{}': {}", endpoint, err)));
        }
        _ => {}
    }
    if base.cannot_be_a_base() {
        return Err(Error::InvalidUrl(format!(
            "base URL '{}' cannot carry a path",
            base
        )));
    }
    let (relative, query) = match endpoint.split_once('?') {
        Some((relative, query)) => (relative, Some(query)),
        None => (endpoint, None),
    };
    let mut url = base.clone();
    let path = format!(
        "{}/{}",
        base.path().trim_end_matches('/'),
        relative.trim_start_matches('/')
    );
    url.set_path(&path);
    url.set_query(query.filter(|q| !q.is_empty()));
    url.set_fragment(None);
    Ok(url)
}

/// Appends query items in caller order, percent-encoding keys and values.
pub fn append_query(url: &mut Url, query: &[(String, QueryValue)]) -> Result<(), Error> {
    if query.is_empty() {
        return Ok(());
    }
    let encoded = query
        .iter()
        .map(|(key, value)| {
            if key.is_empty() {
                return Err(Error::InvalidUrl("query parameter with empty key".into()));
            }
            Ok(format!(
                "{}={}",
                urlencoding::encode(key),
                urlencoding::encode(&value.to_string())
            ))
        })
        .collect::<Result<Vec<_>, Error>>()?
        .join("&");
    let combined = match url.query() {
        Some(existing) if !existing.is_empty() => format!("{}&{}", existing, encoded),
        _ => encoded,
    };
    url.set_query(Some(&combined));
    Ok(())
}
