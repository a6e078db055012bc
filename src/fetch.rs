use std::fmt;
use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::debug;

use crate::domain::{GeneId, OrganismCode, PathwayId};
use crate::error::KiraError;

/// A record of the remote knowledge base.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Resource {
    OrganismList,
    PathwayList(OrganismCode),
    Pathway(OrganismCode, PathwayId),
    Gene(GeneId),
}

impl Resource {
    /// Memoization namespace for the raw download.
    pub fn namespace(&self) -> &'static str {
        match self {
            Resource::OrganismList => "organism-list",
            Resource::PathwayList(_) => "pathway-list",
            Resource::Pathway(..) => "pathway-download",
            Resource::Gene(_) => "gene-download",
        }
    }

    pub fn identifier(&self) -> String {
        match self {
            Resource::OrganismList => "organisms".to_string(),
            Resource::PathwayList(organism) => organism.to_string(),
            Resource::Pathway(organism, pathway) => format!("{organism}{pathway}"),
            Resource::Gene(gene) => gene.to_string(),
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::OrganismList => write!(f, "organism list"),
            Resource::PathwayList(organism) => write!(f, "pathway list of {organism}"),
            Resource::Pathway(organism, pathway) => write!(f, "pathway {organism}{pathway}"),
            Resource::Gene(gene) => write!(f, "gene {gene}"),
        }
    }
}

pub trait KnowledgeFetcher: Send + Sync {
    fn fetch(&self, resource: &Resource) -> Result<Vec<u8>, KiraError>;
}

impl<T: KnowledgeFetcher + ?Sized> KnowledgeFetcher for &T {
    fn fetch(&self, resource: &Resource) -> Result<Vec<u8>, KiraError> {
        (**self).fetch(resource)
    }
}

/// Blocking client for the KEGG REST API.
#[derive(Clone)]
pub struct KeggHttpClient {
    client: Client,
    base_url: String,
}

impl KeggHttpClient {
    pub fn new() -> Result<Self, KiraError> {
        Self::with_base_url("https://rest.kegg.jp")
    }

    pub fn with_base_url(base_url: &str) -> Result<Self, KiraError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("kira-mn/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| KiraError::Filesystem(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| KiraError::Fetch {
                resource: "client".to_string(),
                message: err.to_string(),
            })?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn url_for(&self, resource: &Resource) -> String {
        match resource {
            Resource::OrganismList => format!("{}/list/organism", self.base_url),
            Resource::PathwayList(organism) => format!("{}/list/pathway/{organism}", self.base_url),
            Resource::Pathway(organism, pathway) => {
                format!("{}/get/{organism}{pathway}/kgml", self.base_url)
            }
            Resource::Gene(gene) => format!("{}/get/{gene}", self.base_url),
        }
    }

    fn send_with_retries(
        &self,
        resource: &Resource,
        url: &str,
    ) -> Result<reqwest::blocking::Response, KiraError> {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            match self.client.get(url).send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        debug!(%resource, status, delay, "retrying knowledge base request");
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        debug!(%resource, delay, "retrying knowledge base request");
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(KiraError::Fetch {
                        resource: resource.to_string(),
                        message: err.to_string(),
                    });
                }
            }
        }
    }
}

impl KnowledgeFetcher for KeggHttpClient {
    fn fetch(&self, resource: &Resource) -> Result<Vec<u8>, KiraError> {
        let url = self.url_for(resource);
        let response = self.send_with_retries(resource, &url)?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "KEGG request failed".to_string());
            return Err(KiraError::FetchStatus {
                resource: resource.to_string(),
                status,
                message,
            });
        }
        let bytes = response.bytes().map_err(|err| KiraError::Fetch {
            resource: resource.to_string(),
            message: err.to_string(),
        })?;
        Ok(bytes.to_vec())
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 403 | 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_follow_kegg_rest_layout() {
        let client = KeggHttpClient::with_base_url("https://kegg.test/").unwrap();
        let eco: OrganismCode = "eco".parse().unwrap();
        let pathway: PathwayId = "00260".parse().unwrap();
        let gene: GeneId = "eco:b0004".parse().unwrap();
        assert_eq!(
            client.url_for(&Resource::PathwayList(eco.clone())),
            "https://kegg.test/list/pathway/eco"
        );
        assert_eq!(
            client.url_for(&Resource::Pathway(eco, pathway)),
            "https://kegg.test/get/eco00260/kgml"
        );
        assert_eq!(
            client.url_for(&Resource::Gene(gene)),
            "https://kegg.test/get/eco:b0004"
        );
    }

    #[test]
    fn resources_map_to_download_namespaces() {
        let eco: OrganismCode = "eco".parse().unwrap();
        let resource = Resource::Pathway(eco, "00260".parse().unwrap());
        assert_eq!(resource.namespace(), "pathway-download");
        assert_eq!(resource.identifier(), "eco00260");
    }
}
