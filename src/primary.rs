use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;

use crate::domain::{AssetDescriptor, FileKey, SourceRef, parse_keywords};
use crate::error::ExportError;
use crate::http::{HttpClient, HttpSettings, join_url};

pub const DEFAULT_DOMAIN: &str = "https://api.figma.com";
pub const DEFAULT_CANVAS: &str = "Icons";
const TOKEN_HEADER: HeaderName = HeaderName::from_static("x-figma-token");

pub trait PrimaryClient: Send + Sync {
    fn fetch_document(&self, file_key: &FileKey) -> Result<Value, ExportError>;
    fn fetch_export_urls(&self, file_key: &FileKey, ids: &[String])
    -> Result<Value, ExportError>;
    fn download_markup(&self, url: &str) -> Result<String, ExportError>;
}

#[derive(Clone)]
pub struct PrimaryHttpClient {
    http: HttpClient,
    // Export URLs point at a storage host and must not carry the API token.
    assets: HttpClient,
    domain: String,
}

impl PrimaryHttpClient {
    pub fn new(token: &str, domain: &str, settings: HttpSettings) -> Result<Self, ExportError> {
        let mut headers = HeaderMap::new();
        let mut token = HeaderValue::from_str(token)
            .map_err(|_| ExportError::Config("TOKEN is not a valid header value".to_string()))?;
        token.set_sensitive(true);
        headers.insert(TOKEN_HEADER, token);
        Ok(Self {
            http: HttpClient::with_headers("resolve", settings, headers)?,
            assets: HttpClient::new("download", settings)?,
            domain: domain.to_string(),
        })
    }

    fn document_url(&self, file_key: &FileKey) -> String {
        join_url(&self.domain, &format!("v1/files/{file_key}"))
    }

    fn images_url(&self, file_key: &FileKey, ids: &[String]) -> String {
        join_url(
            &self.domain,
            &format!("v1/images/{file_key}?ids={}&format=svg", ids.join(",")),
        )
    }
}

impl PrimaryClient for PrimaryHttpClient {
    fn fetch_document(&self, file_key: &FileKey) -> Result<Value, ExportError> {
        self.http.get_json(&self.document_url(file_key))
    }

    fn fetch_export_urls(
        &self,
        file_key: &FileKey,
        ids: &[String],
    ) -> Result<Value, ExportError> {
        self.http.get_json(&self.images_url(file_key, ids))
    }

    fn download_markup(&self, url: &str) -> Result<String, ExportError> {
        self.assets.get_text(url)
    }
}

pub fn extract_components(
    document: &Value,
    canvas: &str,
) -> Result<Vec<AssetDescriptor>, ExportError> {
    let page = document
        .get("document")
        .and_then(|value| value.get("children"))
        .and_then(Value::as_array)
        .and_then(|pages| {
            pages
                .iter()
                .find(|page| page.get("name").and_then(Value::as_str) == Some(canvas))
        })
        .ok_or_else(|| ExportError::CanvasNotFound(canvas.to_string()))?;

    let components = document.get("components");
    let children = page
        .get("children")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut descriptors = Vec::new();
    for node in children {
        if node.get("type").and_then(Value::as_str) != Some("COMPONENT") {
            continue;
        }
        let Some(id) = node.get("id").and_then(Value::as_str) else {
            continue;
        };
        let name = node
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(id)
            .to_string();
        let description = components
            .and_then(|map| map.get(id))
            .and_then(|component| component.get("description"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        let bounds = node.get("absoluteBoundingBox");
        let dimension = |key: &str| {
            bounds
                .and_then(|value| value.get(key))
                .and_then(Value::as_f64)
                .unwrap_or(0.0)
        };

        descriptors.push(AssetDescriptor {
            name,
            external_id: id.to_string(),
            keywords: parse_keywords(description),
            width: dimension("width"),
            height: dimension("height"),
            content: None,
            source_ref: SourceRef::Unresolved,
        });
    }
    Ok(descriptors)
}

/// A non-null `err` field, or any requested id without a URL, fails the batch.
pub fn parse_export_urls(
    response: &Value,
    ids: &[String],
) -> Result<Vec<(String, String)>, ExportError> {
    match response.get("err") {
        None | Some(Value::Null) => {}
        Some(Value::String(message)) => return Err(ExportError::BatchExport(message.clone())),
        Some(other) => return Err(ExportError::BatchExport(other.to_string())),
    }
    let images = response
        .get("images")
        .and_then(Value::as_object)
        .ok_or_else(|| ExportError::BatchExport("response has no images map".to_string()))?;

    ids.iter()
        .map(|id| {
            images
                .get(id)
                .and_then(Value::as_str)
                .map(|url| (id.clone(), url.to_string()))
                .ok_or_else(|| ExportError::BatchExport(format!("no export URL for {id}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn document() -> Value {
        json!({
            "document": {
                "children": [
                    { "name": "Cover", "type": "CANVAS", "children": [] },
                    {
                        "name": "Icons",
                        "type": "CANVAS",
                        "children": [
                            {
                                "id": "1:1",
                                "name": "home",
                                "type": "COMPONENT",
                                "absoluteBoundingBox": { "x": 0, "y": 0, "width": 24, "height": 20 }
                            },
                            { "id": "1:2", "name": "frame", "type": "FRAME" },
                            { "id": "1:3", "name": "search", "type": "COMPONENT" }
                        ]
                    }
                ]
            },
            "components": {
                "1:1": { "name": "home", "description": "House icon\nKeywords: house, building" }
            }
        })
    }

    #[test]
    fn extracts_only_components_of_named_canvas() {
        let descriptors = extract_components(&document(), "Icons").unwrap();
        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].name, "home");
        assert_eq!(descriptors[0].keywords, vec!["house", "building"]);
        assert_eq!(descriptors[0].width, 24.0);
        assert_eq!(descriptors[0].height, 20.0);
        assert!(descriptors[1].keywords.is_empty());
    }

    #[test]
    fn missing_canvas_is_reported() {
        let result = extract_components(&document(), "Glyphs");
        assert_matches!(result, Err(ExportError::CanvasNotFound(name)) if name == "Glyphs");
    }

    #[test]
    fn export_error_field_fails_batch() {
        let response = json!({ "err": "Render timeout", "images": {} });
        let result = parse_export_urls(&response, &["1:1".to_string()]);
        assert_matches!(result, Err(ExportError::BatchExport(message)) if message == "Render timeout");
    }

    #[test]
    fn export_urls_follow_requested_order() {
        let response = json!({
            "err": null,
            "images": { "1:3": "https://s3/b.svg", "1:1": "https://s3/a.svg" }
        });
        let ids = vec!["1:1".to_string(), "1:3".to_string()];
        let urls = parse_export_urls(&response, &ids).unwrap();
        assert_eq!(urls[0], ("1:1".to_string(), "https://s3/a.svg".to_string()));
        assert_eq!(urls[1].0, "1:3");
    }

    #[test]
    fn missing_export_url_fails_batch() {
        let response = json!({ "images": { "1:1": null } });
        let result = parse_export_urls(&response, &["1:1".to_string()]);
        assert_matches!(result, Err(ExportError::BatchExport(_)));
    }
}
