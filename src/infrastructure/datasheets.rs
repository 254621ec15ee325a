//! Datasheet link enrichment
//!
//! Optional post-match lookup against an external datasheet index, keyed by
//! normalized manufacturer part number. Callers treat any failure as "no
//! datasheet"; enrichment never changes match results.

use async_trait::async_trait;
use serde::Deserialize;

use crate::domain::services::DatasheetProvider;
use crate::infrastructure::http_client::HttpClient;

#[derive(Debug, Deserialize)]
struct DatasheetResponse {
    datasheet_url: Option<String>,
}

/// Queries a JSON endpoint with a `{part}` placeholder, e.g.
/// `https://datasheets.example/api/lookup?mpn={part}`.
pub struct HttpDatasheetProvider {
    http: HttpClient,
    endpoint_template: String,
}

impl HttpDatasheetProvider {
    pub fn new(http: HttpClient, endpoint_template: impl Into<String>) -> Self {
        Self {
            http,
            endpoint_template: endpoint_template.into(),
        }
    }

    fn lookup_url(&self, manufacturer_part_number: &str) -> String {
        let encoded: String =
            url::form_urlencoded::byte_serialize(manufacturer_part_number.as_bytes()).collect();
        self.endpoint_template.replace("{part}", &encoded)
    }
}

#[async_trait]
impl DatasheetProvider for HttpDatasheetProvider {
    async fn datasheet_url(
        &self,
        manufacturer_part_number: &str,
    ) -> anyhow::Result<Option<String>> {
        if manufacturer_part_number.is_empty() {
            return Ok(None);
        }
        let url = self.lookup_url(manufacturer_part_number);
        let body = self.http.get_text(&url).await?;
        let parsed: DatasheetResponse = serde_json::from_str(&body)?;
        Ok(parsed
            .datasheet_url
            .filter(|u| u.starts_with("http://") || u.starts_with("https://")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::http_client::HttpClientConfig;

    #[test]
    fn lookup_url_substitutes_and_encodes() {
        let provider = HttpDatasheetProvider::new(
            HttpClient::new(HttpClientConfig::default()).unwrap(),
            "https://datasheets.example/api/lookup?mpn={part}",
        );
        assert_eq!(
            provider.lookup_url("LM358/N"),
            "https://datasheets.example/api/lookup?mpn=LM358%2FN"
        );
    }
}
