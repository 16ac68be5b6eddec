use std::time::Duration;

use {
    serde_json::Value,
    tracing::{debug, warn},
};

use {
    wxgate_common::{Error, Result},
    wxgate_config::TransportConfig,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Method {
    Get,
    #[default]
    Post,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// How a POST body is encoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BodyFormat {
    #[default]
    Form,
    Json,
}

/// One outbound call. `data` goes on the query string for GET and in the body
/// for POST.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    pub url: String,
    pub data: Value,
    pub format: BodyFormat,
}

impl ProxyRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            data: Value::Null,
            format: BodyFormat::default(),
        }
    }

    pub fn post_form(url: impl Into<String>, data: Value) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            data,
            format: BodyFormat::Form,
        }
    }

    pub fn post_json(url: impl Into<String>, data: Value) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            data,
            format: BodyFormat::Json,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    fn has_data(&self) -> bool {
        match &self.data {
            Value::Null => false,
            Value::Object(map) => !map.is_empty(),
            _ => true,
        }
    }
}

/// Issues single HTTP calls and folds every transport or decoding failure
/// into [`Error::System`]. Holds no per-call state, so one instance can serve
/// any number of concurrent calls.
#[derive(Debug, Clone)]
pub struct RequestProxy {
    client: reqwest::Client,
}

impl RequestProxy {
    pub fn new(transport: &TransportConfig) -> Result<Self> {
        if transport.accept_invalid_certs {
            warn!("TLS certificate validation is disabled for outbound platform calls");
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(transport.timeout_secs))
            .danger_accept_invalid_certs(transport.accept_invalid_certs)
            .build()
            .map_err(|e| Error::system(format!("failed to build http client: {e}")))?;
        Ok(Self { client })
    }

    pub async fn send(&self, req: ProxyRequest) -> Result<Value> {
        debug!(method = req.method.as_str(), url = %redact(&req.url), "proxy request");

        let mut builder = match req.method {
            Method::Get => self.client.get(&req.url),
            Method::Post => self.client.post(&req.url),
        };
        if req.has_data() {
            builder = match (req.method, req.format) {
                (Method::Get, _) => builder.query(&req.data),
                (Method::Post, BodyFormat::Form) => builder.form(&req.data),
                (Method::Post, BodyFormat::Json) => builder.json(&req.data),
            };
        }

        let resp = builder.send().await.map_err(|e| {
            warn!(url = %redact(&req.url), error = %e, "transport failure");
            Error::system(format!("transport: {e}"))
        })?;

        let status = resp.status();
        if !status.is_success() {
            warn!(url = %redact(&req.url), %status, "non-success status");
            return Err(Error::system(format!("http status {status}")));
        }

        let body = resp.text().await.map_err(|e| {
            warn!(url = %redact(&req.url), error = %e, "failed to read response body");
            Error::system(format!("read body: {e}"))
        })?;

        serde_json::from_str(&body).map_err(|e| {
            warn!(url = %redact(&req.url), len = body.len(), error = %e, "response is not json");
            Error::system(format!("parse: {e}"))
        })
    }
}

/// Turn a platform reply carrying a non-zero `errcode` into an error.
pub fn check_errcode(value: Value) -> Result<Value> {
    let errcode = value.get("errcode").and_then(Value::as_i64).unwrap_or(0);
    if errcode == 0 {
        return Ok(value);
    }
    let errmsg = value
        .get("errmsg")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Err(Error::Platform { errcode, errmsg })
}

/// Strip the query string so secrets and tokens never reach the logs.
fn redact(url: &str) -> &str {
    url.split_once('?').map_or(url, |(base, _)| base)
}
