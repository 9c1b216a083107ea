//! Typed HTTP client for the stash API.

use anyhow::{Context, Result};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde_json::json;
use stash_core::content::{
    ContentInfo, ContentListResponse, FastUploadResponse, FileInfo, FileListResponse,
    InitUploadResponse, LoginResponse, MergeResponse, UploadChunkResponse,
};

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let base_url = Url::parse(base_url).context("invalid server URL")?;
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            token,
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).context("failed to build API URL")
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> Result<T> {
        let response = self.authed(req).send().await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!("API error ({status}): {body}");
        }
        serde_json::from_str(&body).with_context(|| format!("unexpected response: {body}"))
    }

    pub async fn register(&self, username: &str, password: &str) -> Result<()> {
        let url = self.url("/api/v1/auth/register")?;
        let _: serde_json::Value = self
            .send_json(
                self.http
                    .post(url)
                    .json(&json!({ "username": username, "password": password })),
            )
            .await?;
        Ok(())
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<String> {
        let url = self.url("/api/v1/auth/login")?;
        let response: LoginResponse = self
            .send_json(
                self.http
                    .post(url)
                    .json(&json!({ "username": username, "password": password })),
            )
            .await?;
        Ok(response.token)
    }

    pub async fn init_upload(
        &self,
        file_name: &str,
        file_hash: &str,
        file_size: u64,
    ) -> Result<InitUploadResponse> {
        let url = self.url("/api/v1/upload/init")?;
        self.send_json(self.http.post(url).json(&json!({
            "file_name": file_name,
            "file_hash": file_hash,
            "file_size": file_size,
        })))
        .await
    }

    pub async fn upload_chunk(
        &self,
        content_id: i64,
        file_hash: &str,
        chunk_index: u32,
        total_chunks: u32,
        data: Vec<u8>,
    ) -> Result<UploadChunkResponse> {
        let url = self.url("/api/v1/upload/chunk")?;
        let form = reqwest::multipart::Form::new()
            .text("content_id", content_id.to_string())
            .text("file_hash", file_hash.to_string())
            .text("chunk_index", chunk_index.to_string())
            .text("total_chunks", total_chunks.to_string())
            .part(
                "chunk",
                reqwest::multipart::Part::bytes(data).file_name("chunk"),
            );
        self.send_json(self.http.post(url).multipart(form)).await
    }

    pub async fn merge(
        &self,
        content_id: i64,
        file_hash: &str,
        file_name: &str,
        total_chunks: u32,
        file_size: u64,
    ) -> Result<MergeResponse> {
        let url = self.url("/api/v1/upload/merge")?;
        self.send_json(self.http.post(url).json(&json!({
            "content_id": content_id,
            "file_hash": file_hash,
            "file_name": file_name,
            "total_chunks": total_chunks,
            "file_size": file_size,
        })))
        .await
    }

    pub async fn fast_upload(
        &self,
        content_id: i64,
        file_name: &str,
        file_hash: &str,
    ) -> Result<FastUploadResponse> {
        let url = self.url("/api/v1/upload/fast")?;
        self.send_json(self.http.post(url).json(&json!({
            "content_id": content_id,
            "file_name": file_name,
            "file_hash": file_hash,
        })))
        .await
    }

    pub async fn cancel_upload(&self, content_id: i64, file_hash: &str) -> Result<()> {
        let url = self.url("/api/v1/upload/cancel")?;
        let _: serde_json::Value = self
            .send_json(self.http.delete(url).json(&json!({
                "content_id": content_id,
                "file_hash": file_hash,
            })))
            .await?;
        Ok(())
    }

    pub async fn list_files(&self) -> Result<Vec<FileInfo>> {
        let url = self.url("/api/v1/files")?;
        let response: FileListResponse = self.send_json(self.http.get(url)).await?;
        Ok(response.files)
    }

    pub async fn list_contents(&self) -> Result<Vec<ContentInfo>> {
        let url = self.url("/api/v1/contents")?;
        let response: ContentListResponse = self.send_json(self.http.get(url)).await?;
        Ok(response.contents)
    }

    pub async fn delete_file(&self, file_hash: &str) -> Result<()> {
        let url = self.url(&format!("/api/v1/files/{file_hash}"))?;
        let _: serde_json::Value = self.send_json(self.http.delete(url)).await?;
        Ok(())
    }

    /// Download a blob, optionally with a byte range, returning the response
    /// for streaming.
    pub async fn download(
        &self,
        file_hash: &str,
        range: Option<&str>,
    ) -> Result<reqwest::Response> {
        let url = self.url(&format!("/api/v1/files/{file_hash}/download"))?;
        let mut req = self.http.get(url);
        if let Some(range) = range {
            req = req.header("Range", range);
        }
        let response = self.authed(req).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({status}): {body}");
        }
        Ok(response)
    }
}
