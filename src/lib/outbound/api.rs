use crate::domain::labs::models::lab::Lab;
use crate::domain::labs::models::template::Template;
use log::{debug, warn};
use reqwest::{Client, Url};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Failed to fetch templates: {0}")]
    TemplateFetchFailed(#[source] reqwest::Error),
    #[error("Failed to fetch labs: {0}")]
    LabListFetchFailed(#[source] reqwest::Error),
    #[error("Invalid API base URL: {0}")]
    InvalidBaseUrl(String),
}

/// Client for the optional lab API. Both endpoints are all-or-nothing: any
/// transport error, non-2xx status or malformed body is a fetch failure.
#[derive(Clone)]
pub struct LabApi {
    client: Client,
    base: Url,
}

impl LabApi {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let mut base =
            Url::parse(base_url).map_err(|e| ApiError::InvalidBaseUrl(format!("{base_url}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(ApiError::InvalidBaseUrl(base_url.to_string()));
        }
        // joining relative paths keeps the last segment only with a trailing slash
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            client: Client::new(),
            base,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base
            .join(path)
            .map_err(|e| ApiError::InvalidBaseUrl(format!("{}: {e}", self.base)))
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T, reqwest::Error> {
        debug!("GET {url}");
        self.client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json::<T>()
            .await
    }

    /// `GET /api/lab`
    pub async fn fetch_labs(&self) -> Result<Vec<Lab>, ApiError> {
        let url = self.endpoint("api/lab")?;
        self.get(url).await.map_err(|e| {
            warn!("Error fetching labs: {e}");
            ApiError::LabListFetchFailed(e)
        })
    }

    /// `GET /api/lab/templates`
    pub async fn fetch_templates(&self) -> Result<Vec<Template>, ApiError> {
        let url = self.endpoint("api/lab/templates")?;
        self.get(url).await.map_err(|e| {
            warn!("Error fetching templates: {e}");
            ApiError::TemplateFetchFailed(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints_respect_base_path() {
        let api = LabApi::new("http://localhost:3033/dashboard").unwrap();
        assert_eq!(
            api.endpoint("api/lab").unwrap().as_str(),
            "http://localhost:3033/dashboard/api/lab"
        );
        let api = LabApi::new("http://localhost:3033").unwrap();
        assert_eq!(
            api.endpoint("api/lab/templates").unwrap().as_str(),
            "http://localhost:3033/api/lab/templates"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            LabApi::new("not a url"),
            Err(ApiError::InvalidBaseUrl(_))
        ));
        assert!(matches!(
            LabApi::new("mailto:someone@example.com"),
            Err(ApiError::InvalidBaseUrl(_))
        ));
    }
}
