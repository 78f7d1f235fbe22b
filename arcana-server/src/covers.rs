use std::sync::Arc;

use anyhow::{anyhow, Context};
use axum::{
    async_trait,
    body::{Body, Bytes},
    extract::{FromRequest, Multipart},
    http::{header, Request, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use reqwest::multipart::{Form, Part};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{Map, Value};

use crate::Error;

const COVER_FOLDER: &str = "collectionCover";

/// Form fields that carry a list, given either as a JSON array or repeated
const LIST_FIELDS: [&str; 3] = ["tags", "collaborators", "elements"];

/// An image file received for a collection cover
#[derive(Clone, Debug)]
pub struct CoverUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

#[async_trait]
pub trait CoverUploader: Send + Sync {
    /// Stores the image on the image host and returns the URL it is served from
    async fn upload(&self, cover: CoverUpload) -> anyhow::Result<String>;
}

pub type CoverHandle = Arc<dyn CoverUploader>;

/// Uploads covers as a multipart POST to an unsigned image host endpoint
pub struct HttpUploader {
    http: reqwest::Client,
    url: Option<String>,
    preset: Option<String>,
}

impl HttpUploader {
    pub fn new(url: Option<String>, preset: Option<String>) -> HttpUploader {
        HttpUploader {
            http: reqwest::Client::new(),
            url,
            preset,
        }
    }
}

#[async_trait]
impl CoverUploader for HttpUploader {
    async fn upload(&self, cover: CoverUpload) -> anyhow::Result<String> {
        let url = self
            .url
            .as_deref()
            .ok_or_else(|| anyhow!("no cover upload url configured"))?;
        let mut file = Part::bytes(cover.bytes.to_vec()).file_name(cover.file_name);
        if let Some(mime) = &cover.content_type {
            file = file
                .mime_str(mime)
                .with_context(|| format!("using {mime:?} as the cover content type"))?;
        }
        let mut form = Form::new().part("file", file).text("folder", COVER_FOLDER);
        if let Some(preset) = &self.preset {
            form = form.text("upload_preset", preset.clone());
        }
        let resp = self
            .http
            .post(url)
            .multipart(form)
            .send()
            .await
            .with_context(|| format!("uploading cover to {url}"))?
            .error_for_status()
            .with_context(|| format!("uploading cover to {url}"))?
            .json::<UploadResponse>()
            .await
            .with_context(|| format!("parsing upload response of {url}"))?;
        hosted_url(resp)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UploadResponse {
    secure_url: Option<String>,
    url: Option<String>,
}

fn hosted_url(resp: UploadResponse) -> anyhow::Result<String> {
    resp.secure_url
        .filter(|u| !u.is_empty())
        .or(resp.url.filter(|u| !u.is_empty()))
        .ok_or_else(|| anyhow!("upload response carries no url"))
}

/// Uploads `cover` and returns its URL, ready to store on the collection
pub async fn store(covers: &CoverHandle, cover: CoverUpload) -> Result<String, Error> {
    let name = cover.file_name.clone();
    let url = covers
        .upload(cover)
        .await
        .with_context(|| format!("storing cover {name:?}"))?;
    tracing::info!(cover = %url, "uploaded collection cover");
    Ok(url)
}

/// Collection body given either as JSON or as a multipart form with an
/// optional `cover` file
pub struct CollectionForm<T> {
    pub data: T,
    pub cover: Option<CoverUpload>,
}

#[async_trait]
impl<T, S> FromRequest<S, Body> for CollectionForm<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request<Body>, state: &S) -> Result<CollectionForm<T>, Response> {
        let is_form = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map_or(false, |v| v.starts_with("multipart/form-data"));
        if !is_form {
            let Json(data) = Json::<T>::from_request(req, state)
                .await
                .map_err(IntoResponse::into_response)?;
            return Ok(CollectionForm { data, cover: None });
        }

        let mut form = Multipart::from_request(req, state)
            .await
            .map_err(IntoResponse::into_response)?;
        let mut fields = Map::new();
        let mut cover = None;
        while let Some(field) = form.next_field().await.map_err(IntoResponse::into_response)? {
            let name = field.name().unwrap_or_default();
            let name = String::from(name.strip_suffix("[]").unwrap_or(name));
            if name == "cover" {
                if let Some(file_name) = field.file_name().map(String::from) {
                    let content_type = field.content_type().map(String::from);
                    let bytes = field.bytes().await.map_err(IntoResponse::into_response)?;
                    if !bytes.is_empty() {
                        cover = Some(CoverUpload {
                            file_name,
                            content_type,
                            bytes,
                        });
                    }
                    continue;
                }
            }
            let text = field.text().await.map_err(IntoResponse::into_response)?;
            add_field(&mut fields, name, text);
        }
        let data = serde_json::from_value(Value::Object(fields)).map_err(|e| {
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                format!("Failed to deserialize the form body: {e}"),
            )
                .into_response()
        })?;
        Ok(CollectionForm { data, cover })
    }
}

fn add_field(fields: &mut Map<String, Value>, name: String, text: String) {
    if !LIST_FIELDS.contains(&name.as_str()) {
        fields.insert(name, Value::String(text));
        return;
    }
    let items = match serde_json::from_str::<Value>(&text) {
        Ok(Value::Array(items)) => items,
        _ => vec![Value::String(text)],
    };
    match fields
        .entry(name)
        .or_insert_with(|| Value::Array(Vec::new()))
    {
        Value::Array(list) => list.extend(items),
        other => *other = Value::Array(items),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn parse(v: Value) -> anyhow::Result<String> {
        hosted_url(serde_json::from_value(v).unwrap())
    }

    #[test]
    fn upload_response_prefers_the_secure_url() {
        let url = parse(json!({
            "asset_id": "3515c6000a548515f1134043f9785c2f",
            "public_id": "collectionCover/poster",
            "format": "png",
            "bytes": 9,
            "url": "http://res.example.com/image/upload/collectionCover/poster.png",
            "secure_url": "https://res.example.com/image/upload/collectionCover/poster.png",
        }))
        .unwrap();
        assert_eq!(
            url,
            "https://res.example.com/image/upload/collectionCover/poster.png"
        );
        let url = parse(json!({"url": "http://host/poster.png", "secure_url": ""})).unwrap();
        assert_eq!(url, "http://host/poster.png");
        assert!(parse(json!({"error": {"message": "Upload preset not found"}})).is_err());
    }

    #[test]
    fn list_fields_accept_arrays_and_repeats() {
        let mut fields = Map::new();
        add_field(&mut fields, String::from("title"), String::from("Films"));
        add_field(&mut fields, String::from("tags"), String::from(r#"["noir","heist"]"#));
        add_field(&mut fields, String::from("tags"), String::from("classic"));
        add_field(&mut fields, String::from("elements"), String::from("[]"));
        assert_eq!(
            Value::Object(fields),
            json!({
                "title": "Films",
                "tags": ["noir", "heist", "classic"],
                "elements": [],
            })
        );
    }

    #[tokio::test]
    async fn unconfigured_uploader_fails() {
        let res = HttpUploader::new(None, None)
            .upload(CoverUpload {
                file_name: String::from("poster.png"),
                content_type: Some(String::from("image/png")),
                bytes: Bytes::from_static(b"png"),
            })
            .await;
        assert!(res.is_err());
    }
}
