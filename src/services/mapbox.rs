use std::time::Duration;

use log::*;
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;

use crate::{BookmeetError, GenericError};

const MAPBOX_API: &str = "https://api.mapbox.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared HTTP plumbing for the Mapbox geocoding, directions, matrix and
/// isochrone endpoints. Cheap to clone.
#[derive(Debug, Clone)]
pub struct MapboxClient {
    client: Client,
    endpoint: String,
    token: String,
}

impl MapboxClient {
    pub fn new(token: &str) -> Result<Self, GenericError> {
        Self::with_endpoint(MAPBOX_API, token)
    }

    /// Point the client somewhere other than `api.mapbox.com`, e.g. a proxy.
    pub fn with_endpoint(endpoint: &str, token: &str) -> Result<Self, GenericError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(MapboxClient {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    /// Builds an endpoint URL. Each segment is percent-encoded on its own, so
    /// free-form addresses can be passed as a single segment.
    pub(crate) fn url(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Url, GenericError> {
        let mut url =
            Url::parse(&self.endpoint).map_err(|_| BookmeetError::Config("mapbox endpoint".into()))?;
        url.path_segments_mut()
            .map_err(|_| BookmeetError::Config("mapbox endpoint".into()))?
            .pop_if_empty()
            .extend(segments);
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
            pairs.append_pair("access_token", &self.token);
        }
        Ok(url)
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, &str)],
    ) -> Result<T, GenericError> {
        let url = self.url(segments, query)?;
        trace!("GET {}", url.path());
        let response = self.client.get(url).send().await?;
        // Mapbox answers "no route" and "not found" with a 4xx and a JSON body.
        if let Err(err) = response.error_for_status_ref() {
            if is_transport_failure(response.status()) {
                return Err(err.into());
            }
        }
        Ok(response.json::<T>().await?)
    }
}

fn is_transport_failure(status: StatusCode) -> bool {
    status.is_server_error()
        || matches!(
            status,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS
        )
}
