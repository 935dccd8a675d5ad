//! Typed client for the daemon's REST API.

use anyhow::{Context, Result};
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use deusvm_hypervisor::{ImageRecord, VmRecord};

pub const DEFAULT_ENDPOINT: &str = "http://localhost:8080";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Deserialize)]
struct DiskResponse {
    path: String,
}

pub struct ApiClient {
    base: Url,
    http: reqwest::Client,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(endpoint: &str, token: Option<String>) -> Result<Self> {
        let endpoint = if endpoint.trim().is_empty() {
            DEFAULT_ENDPOINT
        } else {
            endpoint.trim()
        };
        // Joining relative paths needs a trailing slash on the base.
        let base = Url::parse(&format!("{}/", endpoint.trim_end_matches('/')))
            .with_context(|| format!("invalid endpoint {:?}", endpoint))?;
        let http = reqwest::Client::builder()
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            base,
            http,
            token: token.filter(|t| !t.is_empty()),
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base
            .join(path.trim_start_matches('/'))
            .with_context(|| format!("invalid request path {:?}", path))
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        timeout: Duration,
    ) -> Result<reqwest::Response> {
        let url = self.url(path)?;
        let mut req = self.http.request(method.clone(), url.clone()).timeout(timeout);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }

        let resp = req
            .send()
            .await
            .with_context(|| format!("{} {} failed", method, url))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("{}: {}", status, text.trim());
        }
        Ok(resp)
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        timeout: Duration,
    ) -> Result<T> {
        let resp = self.send(method, path, body, timeout).await?;
        resp.json().await.context("failed to decode response")
    }

    // VM APIs

    pub async fn create_vm(&self, name: &str, image: &str, cpu: u32, memory: &str, disk: &str) -> Result<VmRecord> {
        let body = json!({
            "name": name, "image": image, "cpu": cpu, "memory": memory, "disk": disk,
        });
        self.fetch(Method::POST, "api/v1/vms", Some(body), DEFAULT_TIMEOUT).await
    }

    pub async fn list_vms(&self) -> Result<Vec<VmRecord>> {
        self.fetch(Method::GET, "api/v1/vms", None, DEFAULT_TIMEOUT).await
    }

    pub async fn get_vm(&self, id: &str) -> Result<VmRecord> {
        self.fetch(Method::GET, &format!("api/v1/vms/{}", id), None, DEFAULT_TIMEOUT).await
    }

    pub async fn start_vm(&self, id: &str) -> Result<()> {
        self.send(Method::PUT, &format!("api/v1/vms/{}/start", id), None, DEFAULT_TIMEOUT).await?;
        Ok(())
    }

    pub async fn stop_vm(&self, id: &str) -> Result<()> {
        self.send(Method::PUT, &format!("api/v1/vms/{}/stop", id), None, DEFAULT_TIMEOUT).await?;
        Ok(())
    }

    pub async fn delete_vm(&self, id: &str) -> Result<()> {
        self.send(Method::DELETE, &format!("api/v1/vms/{}", id), None, DEFAULT_TIMEOUT).await?;
        Ok(())
    }

    // Image APIs

    pub async fn create_image(&self, name: &str, source: &str) -> Result<ImageRecord> {
        let body = json!({ "name": name, "source": source });
        self.fetch(Method::POST, "api/v1/images", Some(body), DOWNLOAD_TIMEOUT).await
    }

    pub async fn list_images(&self) -> Result<Vec<ImageRecord>> {
        self.fetch(Method::GET, "api/v1/images", None, DEFAULT_TIMEOUT).await
    }

    pub async fn delete_image(&self, name: &str) -> Result<()> {
        self.send(Method::DELETE, &format!("api/v1/images/{}", name), None, DEFAULT_TIMEOUT).await?;
        Ok(())
    }

    // Disk APIs

    pub async fn create_disk(&self, base_image: &str, name: &str, size: &str) -> Result<String> {
        let body = json!({ "base_image": base_image, "name": name, "size": size });
        let disk: DiskResponse = self
            .fetch(Method::POST, "api/v1/disks", Some(body), DOWNLOAD_TIMEOUT)
            .await?;
        Ok(disk.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        http::{HeaderMap, StatusCode as AxumStatus},
        routing::{get, put},
        Json, Router,
    };

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn vm_json(id: &str) -> Value {
        json!({
            "id": id, "name": "web", "cpu": 2, "memory_bytes": 1073741824u64,
            "disk_bytes": 0, "image": "", "status": "running", "created_at": null
        })
    }

    #[test]
    fn test_endpoint_normalization() {
        let client = ApiClient::new("", None).unwrap();
        assert_eq!(client.url("api/v1/vms").unwrap().as_str(), "http://localhost:8080/api/v1/vms");

        let client = ApiClient::new("http://host:9000/prefix/", None).unwrap();
        assert_eq!(client.url("/api/v1/vms").unwrap().as_str(), "http://host:9000/prefix/api/v1/vms");

        assert!(ApiClient::new("not a url", None).is_err());
    }

    #[tokio::test]
    async fn test_sends_bearer_token_and_decodes() {
        let app = Router::new().route(
            "/api/v1/vms/:id",
            get(|headers: HeaderMap| async move {
                match headers.get("authorization").and_then(|v| v.to_str().ok()) {
                    Some("Bearer tok") => Ok(Json(vm_json("vm-1"))),
                    _ => Err(AxumStatus::UNAUTHORIZED),
                }
            }),
        );
        let endpoint = serve(app).await;

        let client = ApiClient::new(&endpoint, Some("tok".to_string())).unwrap();
        let vm = client.get_vm("vm-1").await.unwrap();
        assert_eq!(vm.id, "vm-1");
        assert_eq!(vm.cpu, 2);

        let anonymous = ApiClient::new(&endpoint, None).unwrap();
        let err = anonymous.get_vm("vm-1").await.unwrap_err();
        assert!(err.to_string().contains("401"), "{}", err);
    }

    #[tokio::test]
    async fn test_error_body_is_reported() {
        let app = Router::new().route(
            "/api/v1/vms/:id/start",
            put(|| async {
                (
                    AxumStatus::NOT_FOUND,
                    Json(json!({"error": "not_found", "message": "VM nope"})),
                )
            }),
        );
        let endpoint = serve(app).await;

        let client = ApiClient::new(&endpoint, None).unwrap();
        let err = client.start_vm("nope").await.unwrap_err().to_string();
        assert!(err.contains("404"), "{}", err);
        assert!(err.contains("not_found"), "{}", err);
    }
}
