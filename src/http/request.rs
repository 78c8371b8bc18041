use crate::error::{Error, Result};
use hyper::{Body, Request as HyperRequest};
use serde::de::DeserializeOwned;
use std::collections::HashMap;

#[derive(Debug, Default, Clone)]
pub struct Request {
    pub method: String,
    pub uri: String,
    /// Header names are stored lower-cased
    pub headers: HashMap<String, String>,
    pub query: HashMap<String, String>,
    body_bytes: Vec<u8>,
}

impl Request {
    /// Build a request by hand, mostly for tests and internal dispatch
    pub fn new(method: &str, uri: &str) -> Self {
        let query = uri
            .split_once('?')
            .map(|(_, q)| Self::parse_query(q))
            .unwrap_or_default();

        Request {
            method: method.to_uppercase(),
            uri: uri.to_string(),
            headers: HashMap::new(),
            query,
            body_bytes: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_lowercase(), value.to_string());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body_bytes = body.into();
        self
    }

    /// URL-encoded form body with the matching content type
    pub fn with_form(self, fields: &[(&str, &str)]) -> Self {
        let body = fields
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        self.with_header("content-type", "application/x-www-form-urlencoded")
            .with_body(body)
    }

    pub async fn from_hyper(req: HyperRequest<Body>) -> Result<Self> {
        let method = req.method().to_string();
        let uri = req.uri().to_string();

        let mut headers = HashMap::new();
        for (name, value) in req.headers() {
            if let Ok(value_str) = value.to_str() {
                headers.insert(name.as_str().to_lowercase(), value_str.to_string());
            }
        }

        let query = Self::parse_query(req.uri().query().unwrap_or(""));
        let body_bytes = hyper::body::to_bytes(req.into_body()).await?.to_vec();

        Ok(Request {
            method,
            uri,
            headers,
            query,
            body_bytes,
        })
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(|s| s.as_str())
    }

    pub fn body_as_json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body_bytes).map_err(Error::Json)
    }

    pub fn body_as_form(&self) -> HashMap<String, String> {
        let body_str = String::from_utf8_lossy(&self.body_bytes);
        Self::parse_query(&body_str)
    }

    pub fn body_as_string(&self) -> String {
        String::from_utf8_lossy(&self.body_bytes).to_string()
    }

    /// Parse `a=1&b=two` pairs, decoding `+` and percent escapes
    ///
    /// Pairs that do not decode to valid UTF-8 are skipped.
    pub fn parse_query(query: &str) -> HashMap<String, String> {
        let mut result = HashMap::new();
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = key.replace('+', " ");
            let value = value.replace('+', " ");
            if let (Ok(k), Ok(v)) = (urlencoding::decode(&key), urlencoding::decode(&value)) {
                result.insert(k.into_owned(), v.into_owned());
            }
        }
        result
    }

    pub fn cookie(&self, name: &str) -> Option<String> {
        self.headers
            .get("cookie")
            .and_then(|header| Self::parse_cookies(header).remove(name))
    }

    fn parse_cookies(cookie_header: &str) -> HashMap<String, String> {
        cookie_header
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
            .collect()
    }

    /// Request path without the query string
    pub fn path(&self) -> &str {
        let without_scheme = match self.uri.find("://") {
            Some(start) => {
                let after = &self.uri[start + 3..];
                match after.find('/') {
                    Some(slash) => &after[slash..],
                    None => "/",
                }
            }
            None => self.uri.as_str(),
        };
        match without_scheme.find('?') {
            Some(query_start) => &without_scheme[..query_start],
            None => without_scheme,
        }
    }

    pub fn is_xhr(&self) -> bool {
        self.header("x-requested-with")
            .map(|v| v.eq_ignore_ascii_case("XMLHttpRequest"))
            .unwrap_or(false)
    }
}
