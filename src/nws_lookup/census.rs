// nws_lookup - Current conditions from api.weather.gov for a street address
//
// Copyright 2022 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use crate::client::{endpoint, fetch_json, ClientError};
use crate::pipeline::Geocoder;
use crate::types::{AddressMatch, AddressQuery, Coordinates};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::Value;

/// Client for the forward geocoder of the Census Bureau.
#[derive(Debug, Clone)]
pub struct CensusClient {
    client: Client,
    base_url: Url,
    benchmark: String,
}

impl CensusClient {
    pub const DEFAULT_BENCHMARK: &'static str = "Public_AR_Census2020";
    const JSON_RESPONSE: &'static str = "application/json";

    pub fn new<S: Into<String>>(client: Client, base_url: Url, benchmark: S) -> Self {
        CensusClient {
            client,
            base_url,
            benchmark: benchmark.into(),
        }
    }

    /// Candidate matches for an address, best first as ranked by the geocoder.
    pub async fn geocode(&self, address: &AddressQuery) -> Result<Vec<AddressMatch>, ClientError> {
        let address_url = self.address_url(address)?;
        tracing::debug!(message = "making geocoding request", url = %address_url);

        let res: GeocodeResponse = fetch_json(&self.client, address_url, Self::JSON_RESPONSE).await?;
        Ok(res
            .result
            .and_then(|r| r.address_matches)
            .unwrap_or_default()
            .into_iter()
            .map(CensusMatch::into_match)
            .collect())
    }

    /// Geocoding URL for an address. The state, when given, always precedes the zip code.
    pub fn address_url(&self, address: &AddressQuery) -> Result<Url, ClientError> {
        let mut url = endpoint(&self.base_url, &["geocoder", "locations", "address"])?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("street", &address.street)
                .append_pair("city", &address.city);

            if let Some(state) = &address.state {
                query.append_pair("state", state);
            }

            if let Some(zip) = address.zip_code {
                query.append_pair("zip", &zip.to_string());
            }

            query
                .append_pair("benchmark", &self.benchmark)
                .append_pair("format", "json");
        }

        Ok(url)
    }
}

#[async_trait]
impl Geocoder for CensusClient {
    async fn address_matches(&self, address: &AddressQuery) -> Result<Vec<AddressMatch>, ClientError> {
        self.geocode(address).await
    }
}

#[derive(Deserialize, Debug)]
struct GeocodeResponse {
    #[serde(alias = "result")]
    result: Option<GeocodeResult>,
}

#[derive(Deserialize, Debug)]
struct GeocodeResult {
    #[serde(alias = "addressMatches")]
    address_matches: Option<Vec<CensusMatch>>,
}

#[derive(Deserialize, Debug)]
struct CensusMatch {
    #[serde(alias = "matchedAddress")]
    matched_address: Option<String>,
    // Kept loose so a malformed pair only disqualifies this match
    #[serde(alias = "coordinates")]
    coordinates: Option<Value>,
}

#[derive(Deserialize, Debug)]
struct CensusCoordinates {
    x: f64,
    y: f64,
}

impl CensusMatch {
    fn into_match(self) -> AddressMatch {
        let coordinates = self
            .coordinates
            .and_then(|v| serde_json::from_value::<CensusCoordinates>(v).ok())
            .map(|c| Coordinates {
                latitude: c.y,
                longitude: c.x,
            });

        AddressMatch {
            matched_address: self.matched_address,
            coordinates,
        }
    }
}
