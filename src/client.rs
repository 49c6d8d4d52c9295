//! HTTP side of the editor: loading the route page and saving stops.
use anyhow::Context;
use reqwest::{Client, Url};
use serde_json::json;
use std::time::Duration;
use tracing::{Instrument, info, info_span};

use crate::{
    editor::autosave::{SaveError, SaveRoute},
    model::{RouteId, Stop},
};

#[derive(Clone, Debug)]
pub struct RouteApiClient {
    client: Client,
    base_url: Url,
}

impl RouteApiClient {
    /// `base_url` only needs the scheme and host, any path on it is ignored.
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(RouteApiClient { client, base_url })
    }

    /// `/api/route/{id}` on the server, with the id percent-encoded as one segment.
    pub fn route_url(&self, route_id: &RouteId) -> Result<Url, SaveError> {
        let mut url = self.base_url.clone();
        url.set_query(None);
        url.set_fragment(None);
        url.path_segments_mut()
            .map_err(|_| SaveError::InvalidUrl(self.base_url.to_string()))?
            .clear()
            .extend(["api", "route", route_id.as_str()]);

        Ok(url)
    }

    #[tracing::instrument(err, skip(self))]
    pub async fn fetch_page(&self, url: &Url) -> Result<String, anyhow::Error> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .instrument(info_span!("Fetching route page"))
            .await
            .context("error fetching route page")?
            .error_for_status()
            .context("error status fetching route page")?;

        let html = response
            .text()
            .instrument(info_span!("Reading body of response"))
            .await
            .context("Error getting response text")?;

        info!("got {} bytes of route page", html.len());

        Ok(html)
    }
}

impl SaveRoute for RouteApiClient {
    #[tracing::instrument(err, skip(self, stops), fields(stops = stops.len()))]
    async fn save_route(&self, route_id: &RouteId, stops: &[Stop]) -> Result<(), SaveError> {
        let url = self.route_url(route_id)?;

        let response = self
            .client
            .put(url)
            .json(&json!({ "stops": stops }))
            .send()
            .instrument(info_span!("Saving route"))
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SaveError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::seed::resolve_route_id;

    #[test]
    fn save_urls_replace_the_page_path() -> Result<(), anyhow::Error> {
        let client = RouteApiClient::new(
            Url::parse("http://localhost:3000/route/line-33?x=1")?,
            Duration::from_secs(1),
        )?;

        let url = client.route_url(&RouteId::new("line 33/b").unwrap())?;

        assert_eq!(url.as_str(), "http://localhost:3000/api/route/line%2033%2Fb");

        Ok(())
    }

    #[test]
    fn ids_taken_from_the_page_url_are_encoded_once() -> Result<(), anyhow::Error> {
        let page_url = Url::parse("http://localhost:3000/route/line%2033")?;
        let client = RouteApiClient::new(page_url.clone(), Duration::from_secs(1))?;

        let route_id = resolve_route_id(None, None, &page_url).unwrap();
        let url = client.route_url(&route_id)?;

        assert_eq!(route_id.as_str(), "line 33");
        assert_eq!(url.as_str(), "http://localhost:3000/api/route/line%2033");

        Ok(())
    }
}
