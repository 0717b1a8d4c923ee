//! NER sidecar reached over HTTP.
//!
//! The sidecar hosts the actual models (spaCy or similar) and exposes:
//!
//! - `GET  {base}/models/{name}`: 200 when installed, 404 when not
//! - `POST {base}/models/{name}/download`: acquire a missing model
//! - `POST {base}/models/{name}/entities` with `{"text": ...}`: classify
//!
//! Entity offsets on the wire are character offsets; they are converted to
//! byte offsets here.

use crate::error::{DetectError, Result};
use crate::model::{ModelLoader, NerModel, RawEntity};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const INFERENCE_TIMEOUT: Duration = Duration::from_secs(30);

/// Loader for models hosted by an NER sidecar.
#[derive(Debug, Clone)]
pub struct HttpNerLoader {
    client: Client,
    base_url: Url,
}

impl HttpNerLoader {
    /// Create a loader for the sidecar at `base_url`.
    ///
    /// # Errors
    /// Returns `DetectError::InvalidEndpoint` if `base_url` is not an
    /// absolute URL that can carry a path, or `DetectError::Network` if the
    /// HTTP client cannot be created.
    pub fn new(base_url: &str) -> Result<Self> {
        let invalid = |reason: String| DetectError::InvalidEndpoint {
            endpoint: base_url.to_string(),
            reason,
        };
        let parsed = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
        if parsed.cannot_be_a_base() {
            return Err(invalid("cannot be a base URL".to_string()));
        }

        let client = Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: parsed,
        })
    }

    /// `{base}/models/{name}[/{action}]`, with `name` escaped as one segment.
    fn model_url(&self, name: &str, action: Option<&str>) -> Url {
        let mut url = self.base_url.clone();
        // Never fails: `new` rejects cannot-be-a-base URLs.
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("models").push(name);
            if let Some(action) = action {
                segments.push(action);
            }
        }
        url
    }
}

#[async_trait]
impl ModelLoader for HttpNerLoader {
    async fn load(&self, name: &str) -> Result<Option<Arc<dyn NerModel>>> {
        let response = self.client.get(self.model_url(name, None)).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(Arc::new(HttpNerModel {
                client: self.client.clone(),
                url: self.model_url(name, Some("entities")),
                name: name.to_string(),
            }))),
            status => Err(DetectError::ModelLoad {
                model: name.to_string(),
                message: format!("sidecar returned status {}", status.as_u16()),
            }),
        }
    }

    async fn download(&self, name: &str) -> Result<()> {
        tracing::info!(model = name, "Requesting NER model download");
        let response = self
            .client
            .post(self.model_url(name, Some("download")))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            tracing::info!(model = name, "Successfully downloaded NER model");
            Ok(())
        } else {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            Err(DetectError::ModelLoad {
                model: name.to_string(),
                message: format!("download failed with status {}: {message}", status.as_u16()),
            })
        }
    }
}

/// A model hosted by the sidecar.
#[derive(Debug, Clone)]
pub struct HttpNerModel {
    client: Client,
    url: Url,
    name: String,
}

#[async_trait]
impl NerModel for HttpNerModel {
    async fn entities(&self, text: &str) -> Result<Vec<RawEntity>> {
        let response = self
            .client
            .post(self.url.clone())
            .timeout(INFERENCE_TIMEOUT)
            .json(&EntitiesRequest { text })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DetectError::Inference {
                model: self.name.clone(),
                message: format!("sidecar returned status {}", status.as_u16()),
            });
        }

        let body = response.text().await?;
        let parsed: EntitiesResponse = serde_json::from_str(&body)?;
        Ok(to_byte_offsets(text, parsed.entities))
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Serialize)]
struct EntitiesRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EntitiesResponse {
    entities: Vec<ApiEntity>,
}

#[derive(Debug, Deserialize)]
struct ApiEntity {
    start: usize,
    end: usize,
    label: String,
    #[serde(default)]
    score: Option<f64>,
}

/// Convert character offsets to byte offsets, dropping empty or reversed
/// entities and those that point past the end of `text`.
fn to_byte_offsets(text: &str, entities: Vec<ApiEntity>) -> Vec<RawEntity> {
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();

    entities
        .into_iter()
        .filter(|e| e.start < e.end)
        .filter_map(|e| {
            Some(RawEntity {
                start: *boundaries.get(e.start)?,
                end: *boundaries.get(e.end)?,
                label: e.label,
                score: e.score,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(start: usize, end: usize, label: &str) -> ApiEntity {
        ApiEntity {
            start,
            end,
            label: label.to_string(),
            score: None,
        }
    }

    #[test]
    fn test_char_offsets_converted() {
        // "José" is 4 chars but 5 bytes
        let text = "José lives in Zürich";
        let converted = to_byte_offsets(text, vec![api(0, 4, "PER"), api(14, 20, "GPE")]);

        assert_eq!(&text[converted[0].start..converted[0].end], "José");
        assert_eq!(&text[converted[1].start..converted[1].end], "Zürich");
    }

    #[test]
    fn test_out_of_range_dropped() {
        let converted = to_byte_offsets(
            "short",
            vec![api(0, 5, "PER"), api(2, 9, "ORG"), api(3, 3, "GPE"), api(4, 1, "LOC")],
        );
        assert_eq!(converted.len(), 1);
        assert_eq!(converted[0].end, 5);
    }

    #[test]
    fn test_response_parsing() {
        let body = r#"{"entities":[{"start":0,"end":4,"label":"PER","score":0.87},{"start":5,"end":8,"label":"ORG"}]}"#;
        let parsed: EntitiesResponse = serde_json::from_str(body).expect("parse response");

        assert_eq!(parsed.entities.len(), 2);
        assert_eq!(parsed.entities[0].score, Some(0.87));
        assert_eq!(parsed.entities[1].score, None);
    }

    #[test]
    fn test_model_urls() {
        let loader = HttpNerLoader::new("http://localhost:8765/").expect("create loader");
        assert_eq!(
            loader.model_url("en_core_web_sm", None).as_str(),
            "http://localhost:8765/models/en_core_web_sm"
        );
        assert_eq!(
            loader.model_url("en_core_web_sm", Some("entities")).as_str(),
            "http://localhost:8765/models/en_core_web_sm/entities"
        );

        let nested = HttpNerLoader::new("http://ner.internal:9000/api").expect("create loader");
        assert_eq!(
            nested.model_url("xx_ent_wiki_sm", Some("download")).as_str(),
            "http://ner.internal:9000/api/models/xx_ent_wiki_sm/download"
        );
    }

    #[test]
    fn test_model_name_escaped_as_one_segment() {
        let loader = HttpNerLoader::new("http://localhost:8765").expect("create loader");
        let url = loader.model_url("en core/web?x#y", Some("entities"));

        assert_eq!(
            url.path(),
            "/models/en%20core%2Fweb%3Fx%23y/entities"
        );
        assert_eq!(url.query(), None);
        assert_eq!(url.fragment(), None);
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        assert!(matches!(
            HttpNerLoader::new("localhost:8765"),
            Err(DetectError::InvalidEndpoint { .. })
        ));
        assert!(matches!(
            HttpNerLoader::new("not a url"),
            Err(DetectError::InvalidEndpoint { .. })
        ));
    }

    #[tokio::test]
    async fn test_unreachable_sidecar_is_an_error() {
        // Port 9 (discard) is essentially never listening over HTTP.
        let loader = HttpNerLoader::new("http://127.0.0.1:9").expect("create loader");
        assert!(loader.load("en_core_web_sm").await.is_err());
    }
}
