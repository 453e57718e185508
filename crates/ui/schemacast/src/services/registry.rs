//! Schema registry access (Confluent-compatible REST API).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, StatusCode, Url};
use serde::Deserialize;
use tracing::debug;

use crate::config::SchemaRegistryConfig;

const ACCEPT: &str = "application/vnd.schemaregistry.v1+json";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("invalid registry url `{url}`")]
    InvalidUrl { url: String },
    #[error("registry request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("registry returned {status}: {body}")]
    Status { status: StatusCode, body: String },
}

/// Latest version of a subject as returned by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectSchema {
    pub subject: String,
    pub version: i32,
    pub id: u32,
    /// Absent for Avro, `PROTOBUF`/`JSON` otherwise.
    #[serde(default)]
    pub schema_type: Option<String>,
    pub schema: String,
}

impl SubjectSchema {
    pub fn is_avro(&self) -> bool {
        self.schema_type
            .as_deref()
            .map_or(true, |t| t.eq_ignore_ascii_case("AVRO"))
    }

    /// Two-space indented schema text, or the raw text if it is not JSON.
    pub fn pretty(&self) -> String {
        serde_json::from_str::<serde_json::Value>(&self.schema)
            .ok()
            .and_then(|v| serde_json::to_string_pretty(&v).ok())
            .unwrap_or_else(|| self.schema.clone())
    }
}

#[async_trait]
pub trait SchemaRegistry: Send + Sync {
    async fn list_subjects(&self) -> Result<Vec<String>, RegistryError>;

    async fn latest_schema(&self, subject: &str) -> Result<SubjectSchema, RegistryError>;
}

pub struct HttpRegistry {
    client: reqwest::Client,
    base: Url,
    auth: Option<(String, String)>,
}

impl HttpRegistry {
    pub fn new(cfg: &SchemaRegistryConfig) -> Result<Self, RegistryError> {
        let trimmed = cfg.url.trim().trim_end_matches('/');
        let base = Url::parse(trimmed).map_err(|_| RegistryError::InvalidUrl {
            url: cfg.url.clone(),
        })?;
        if base.cannot_be_a_base() {
            return Err(RegistryError::InvalidUrl {
                url: cfg.url.clone(),
            });
        }
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base,
            auth: cfg
                .basic_auth()
                .map(|(k, s)| (k.to_string(), s.to_string())),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T, RegistryError> {
        debug!(%url, "registry request");
        let mut request = self.client.get(url).header(header::ACCEPT, ACCEPT);
        if let Some((key, secret)) = &self.auth {
            request = request.basic_auth(key, Some(secret));
        }
        let response = request.send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(RegistryError::Status {
                status,
                body: body.trim().to_string(),
            });
        }
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl SchemaRegistry for HttpRegistry {
    async fn list_subjects(&self) -> Result<Vec<String>, RegistryError> {
        self.get(self.endpoint(&["subjects"])).await
    }

    async fn latest_schema(&self, subject: &str) -> Result<SubjectSchema, RegistryError> {
        self.get(self.endpoint(&["subjects", subject, "versions", "latest"]))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response and hand back the raw request.
    async fn serve_once(
        status_line: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let n = socket.read(&mut buf).await.unwrap();
            let response = format!(
                "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&buf[..n]).into_owned()
        });
        (format!("http://{addr}"), handle)
    }

    fn registry(url: &str, key: &str, secret: &str) -> HttpRegistry {
        HttpRegistry::new(&SchemaRegistryConfig {
            url: url.to_string(),
            api_key: key.to_string(),
            api_secret: secret.to_string(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn lists_subjects_with_registry_accept_header() {
        let (url, server) = serve_once("200 OK", r#"["orders-value","users-value"]"#).await;
        let subjects = registry(&url, "", "").list_subjects().await.unwrap();
        assert_eq!(subjects, vec!["orders-value", "users-value"]);

        let request = server.await.unwrap().to_lowercase();
        assert!(request.starts_with("get /subjects "), "{request}");
        assert!(request.contains("accept: application/vnd.schemaregistry.v1+json"));
        assert!(!request.contains("authorization:"));
    }

    #[tokio::test]
    async fn latest_schema_uses_basic_auth_and_encodes_subject() {
        let body = r#"{"subject":"a b","version":3,"id":17,"schema":"\"string\""}"#;
        let (url, server) = serve_once("200 OK", body).await;
        let schema = registry(&format!("{url}/"), "key", "secret")
            .latest_schema("a b")
            .await
            .unwrap();
        assert_eq!(schema.id, 17);
        assert_eq!(schema.version, 3);
        assert!(schema.is_avro());

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /subjects/a%20b/versions/latest "), "{request}");
        // base64("key:secret")
        assert!(request.contains("a2V5OnNlY3JldA=="));
    }

    #[tokio::test]
    async fn non_success_status_carries_body() {
        let (url, _server) = serve_once(
            "404 Not Found",
            r#"{"error_code":40401,"message":"Subject not found."}"#,
        )
        .await;
        let err = registry(&url, "", "").latest_schema("nope").await.unwrap_err();
        match err {
            RegistryError::Status { status, body } => {
                assert_eq!(status, StatusCode::NOT_FOUND);
                assert!(body.contains("Subject not found"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_unusable_url() {
        let cfg = SchemaRegistryConfig {
            url: "not a url".into(),
            ..Default::default()
        };
        assert!(matches!(
            HttpRegistry::new(&cfg),
            Err(RegistryError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn pretty_prints_schema_text() {
        let schema = SubjectSchema {
            subject: "s".into(),
            version: 1,
            id: 1,
            schema_type: None,
            schema: r#"{"type":"string"}"#.into(),
        };
        assert_eq!(schema.pretty(), "{\n  \"type\": \"string\"\n}");
    }
}
