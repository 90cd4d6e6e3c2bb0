/// Raw launcher text split into the target URL and an optional output filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchInput {
    pub url: String,
    pub filename: Option<String>,
}

impl SearchInput {
    /// Splits on the first space only; everything after it is the literal
    /// filename, further spaces included.
    pub fn parse(search: &str) -> Self {
        let search = search.trim_start();
        match search.split_once(' ') {
            Some((url, rest)) => Self {
                url: url.to_string(),
                filename: if rest.is_empty() {
                    None
                } else {
                    Some(rest.to_string())
                },
            },
            None => Self {
                url: search.to_string(),
                filename: None,
            },
        }
    }

    pub fn has_valid_url(&self) -> bool {
        parse_http_url(&self.url).is_some()
    }
}

/// Accepts absolute `http`/`https` URLs with a host.
pub fn parse_http_url(url_str: &str) -> Option<url::Url> {
    let parsed = url::Url::parse(url_str).ok()?;
    match parsed.scheme() {
        "http" | "https" => {}
        _ => return None,
    }
    parsed.host_str().filter(|h| !h.is_empty())?;
    Some(parsed)
}
