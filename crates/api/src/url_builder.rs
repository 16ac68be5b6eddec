use wxgate_common::{Error, Result};

/// Parts of an endpoint URL. Query parameters keep their insertion order and
/// `None` values are left out entirely.
#[derive(Debug, Clone, Default)]
pub struct UrlSpec {
    pub scheme: String,
    pub host: String,
    pub path: String,
    pub query: Vec<(String, Option<String>)>,
    pub fragment: Option<String>,
}

impl UrlSpec {
    pub fn new(
        scheme: impl Into<String>,
        host: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), Some(value.into())));
        self
    }

    pub fn query_opt(mut self, key: impl Into<String>, value: Option<impl Into<String>>) -> Self {
        self.query.push((key.into(), value.map(Into::into)));
        self
    }

    pub fn fragment(mut self, fragment: impl Into<String>) -> Self {
        self.fragment = Some(fragment.into());
        self
    }

    pub fn build(&self) -> Result<String> {
        build_url(self)
    }
}

/// Compose a URL string from its parts.
pub fn build_url(parts: &UrlSpec) -> Result<String> {
    let base = format!("{}://{}{}", parts.scheme, parts.host, parts.path);
    let mut url = url::Url::parse(&base).map_err(|e| Error::InvalidUrl(format!("{base}: {e}")))?;

    let present: Vec<(&str, &str)> = parts
        .query
        .iter()
        .filter_map(|(k, v)| v.as_deref().map(|v| (k.as_str(), v)))
        .collect();
    if !present.is_empty() {
        url.query_pairs_mut().extend_pairs(present);
    }
    url.set_fragment(parts.fragment.as_deref());

    Ok(url.into())
}
