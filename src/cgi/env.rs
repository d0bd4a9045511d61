//! Environment Builder.
//!
//! Turns one request into the variable set a handler process starts with.
//! The required CGI/1.1 variables are fixed fields; every inbound header
//! becomes an `HTTP_*` entry in a separate extension map.
//!
//! Building never fails: values that are not valid UTF-8 become empty strings.

use std::collections::BTreeMap;

use axum::http::{header, HeaderMap};

use crate::cgi::request::CgiRequest;
use crate::routing::Handler;

pub const GATEWAY_INTERFACE: &str = "CGI/1.1";

/// Static server identity for one listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerMeta {
    pub name: String,
    pub port: u16,
    pub software: String,
    pub protocol: String,
}

/// Variables exported to a handler process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayEnvironment {
    pub request_method: String,
    pub query_string: String,
    /// Present iff the request carries a body of known length.
    pub content_length: Option<u64>,
    pub content_type: String,
    pub script_name: String,
    pub server_protocol: String,
    pub server_name: String,
    pub server_port: u16,
    pub server_software: String,
    pub script_filename: String,
    pub request_uri: String,
    pub document_root: String,
    pub remote_addr: String,
    /// `HTTP_<NAME>` entries, one per logical inbound header.
    pub http: BTreeMap<String, String>,
}

impl GatewayEnvironment {
    /// Derive the environment for `request` dispatched to `handler`.
    pub fn build(request: &CgiRequest, handler: &Handler, meta: &ServerMeta) -> Self {
        Self {
            request_method: request.method.as_str().to_string(),
            query_string: request.query.clone(),
            content_length: request.declared_length,
            content_type: header_str(&request.headers, header::CONTENT_TYPE.as_str()),
            script_name: handler.script_name.clone(),
            server_protocol: meta.protocol.clone(),
            server_name: meta.name.clone(),
            server_port: meta.port,
            server_software: meta.software.clone(),
            script_filename: handler.script_path.to_string_lossy().into_owned(),
            request_uri: request.request_uri(),
            document_root: handler.document_root.to_string_lossy().into_owned(),
            remote_addr: request
                .remote_addr
                .map(|addr| addr.ip().to_string())
                .unwrap_or_default(),
            http: http_variables(&request.headers),
        }
    }

    /// Flatten into `(name, value)` pairs suitable for `Command::envs`.
    pub fn vars(&self) -> Vec<(String, String)> {
        let mut vars = vec![
            ("GATEWAY_INTERFACE".to_string(), GATEWAY_INTERFACE.to_string()),
            ("REQUEST_METHOD".to_string(), self.request_method.clone()),
            ("QUERY_STRING".to_string(), self.query_string.clone()),
            ("CONTENT_TYPE".to_string(), self.content_type.clone()),
            ("SCRIPT_NAME".to_string(), self.script_name.clone()),
            ("SERVER_PROTOCOL".to_string(), self.server_protocol.clone()),
            ("SERVER_NAME".to_string(), self.server_name.clone()),
            ("SERVER_PORT".to_string(), self.server_port.to_string()),
            ("SERVER_SOFTWARE".to_string(), self.server_software.clone()),
            ("SCRIPT_FILENAME".to_string(), self.script_filename.clone()),
            ("REQUEST_URI".to_string(), self.request_uri.clone()),
            ("DOCUMENT_ROOT".to_string(), self.document_root.clone()),
            ("REMOTE_ADDR".to_string(), self.remote_addr.clone()),
            ("PATH_INFO".to_string(), String::new()),
            // php-cgi refuses to run without it
            ("REDIRECT_STATUS".to_string(), "200".to_string()),
        ];
        if let Some(len) = self.content_length {
            vars.push(("CONTENT_LENGTH".to_string(), len.to_string()));
        }
        vars.extend(self.http.iter().map(|(k, v)| (k.clone(), v.clone())));
        vars
    }

    /// Look up one variable by name.
    pub fn get(&self, name: &str) -> Option<String> {
        self.vars()
            .into_iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Map header names to `HTTP_*` variables. Header names are already
/// case-folded by `HeaderMap`; repeated headers, and distinct names that
/// fold to the same variable, are joined with `, `.
fn http_variables(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut vars: BTreeMap<String, String> = BTreeMap::new();

    for name in headers.keys() {
        let var = format!("HTTP_{}", name.as_str().to_ascii_uppercase().replace('-', "_"));
        for value in headers.get_all(name) {
            let value = value.to_str().unwrap_or_default();
            vars.entry(var.clone())
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(value);
                })
                .or_insert_with(|| value.to_string());
        }
    }

    vars
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderName, HeaderValue, Method};
    use std::path::PathBuf;

    fn handler() -> Handler {
        Handler {
            script_name: "/info.py".into(),
            script_path: PathBuf::from("/srv/www/info.py"),
            interpreter: Some(PathBuf::from("/usr/bin/python3")),
            document_root: PathBuf::from("/srv/www"),
        }
    }

    fn meta() -> ServerMeta {
        ServerMeta {
            name: "localhost".into(),
            port: 1024,
            software: "cgi-gateway/test".into(),
            protocol: "HTTP/1.1".into(),
        }
    }

    #[test]
    fn test_required_variables() {
        let mut req = CgiRequest::new(Method::GET, "/info.py");
        req.query = "name=x".into();
        let env = GatewayEnvironment::build(&req, &handler(), &meta());

        assert_eq!(env.get("REQUEST_METHOD").as_deref(), Some("GET"));
        assert_eq!(env.get("QUERY_STRING").as_deref(), Some("name=x"));
        assert_eq!(env.get("SCRIPT_NAME").as_deref(), Some("/info.py"));
        assert_eq!(env.get("SERVER_PORT").as_deref(), Some("1024"));
        assert_eq!(env.get("GATEWAY_INTERFACE").as_deref(), Some("CGI/1.1"));
        assert_eq!(env.get("CONTENT_TYPE").as_deref(), Some(""));
        assert_eq!(env.get("REQUEST_URI").as_deref(), Some("/info.py?name=x"));
        assert_eq!(env.get("CONTENT_LENGTH"), None);
    }

    #[test]
    fn test_content_length_only_for_known_body() {
        let mut req = CgiRequest::new(Method::POST, "/info.py");
        req.declared_length = Some(17);
        req.headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        let env = GatewayEnvironment::build(&req, &handler(), &meta());

        assert_eq!(env.get("CONTENT_LENGTH").as_deref(), Some("17"));
        assert_eq!(env.get("CONTENT_TYPE").as_deref(), Some("text/plain"));

        req.declared_length = Some(0);
        let env = GatewayEnvironment::build(&req, &handler(), &meta());
        assert_eq!(env.get("CONTENT_LENGTH").as_deref(), Some("0"));
    }

    #[test]
    fn test_headers_become_http_variables() {
        let mut req = CgiRequest::new(Method::GET, "/info.py");
        req.headers.insert("user-agent", HeaderValue::from_static("curl/8"));
        req.headers.append("x-forwarded-for", HeaderValue::from_static("10.0.0.1"));
        req.headers.append(
            HeaderName::from_bytes(b"X-Forwarded-For").unwrap(),
            HeaderValue::from_static("10.0.0.2"),
        );
        req.headers.insert("x-trace_id", HeaderValue::from_static("a"));
        req.headers.insert("x-trace-id", HeaderValue::from_static("b"));

        let env = GatewayEnvironment::build(&req, &handler(), &meta());

        assert_eq!(env.http.get("HTTP_USER_AGENT").map(String::as_str), Some("curl/8"));
        assert_eq!(
            env.http.get("HTTP_X_FORWARDED_FOR").map(String::as_str),
            Some("10.0.0.1, 10.0.0.2")
        );
        let merged = env.http.get("HTTP_X_TRACE_ID").unwrap();
        assert!(merged == "a, b" || merged == "b, a");
        assert_eq!(env.http.len(), 3);
    }

    #[test]
    fn test_non_utf8_header_becomes_empty() {
        let mut req = CgiRequest::new(Method::GET, "/info.py");
        req.headers.insert("x-raw", HeaderValue::from_bytes(&[0xff, 0xfe]).unwrap());
        let env = GatewayEnvironment::build(&req, &handler(), &meta());
        assert_eq!(env.http.get("HTTP_X_RAW").map(String::as_str), Some(""));
    }
}
