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

use crate::pipeline::{GridResolver, ObservationFetcher, StationLocator};
use crate::types::{Coordinates, GridReference, ObservationReading, StationId};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

pub(crate) const CLIENT_USER_AGENT: &str = concat!("nws_lookup/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{0}")]
    Internal(#[from] reqwest::Error),
    #[error("unable to decode response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("nothing found at {0}")]
    NotFound(Url),
    #[error("unexpected status {0} for {1}")]
    Unexpected(StatusCode, Url),
    #[error("unable to build request path from base URL {0}")]
    InvalidBaseUrl(Url),
}

/// Append `segments` to the path of `base`, keeping any path the base already has.
pub(crate) fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, ClientError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| ClientError::InvalidBaseUrl(base.clone()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Make a GET request and decode a JSON body from any successful response.
pub(crate) async fn fetch_json<T: DeserializeOwned>(client: &Client, url: Url, accept: &str) -> Result<T, ClientError> {
    let res = client
        .get(url.clone())
        .header(USER_AGENT, CLIENT_USER_AGENT)
        .header(ACCEPT, accept)
        .send()
        .await?;

    let status = res.status();
    if status.is_success() {
        Ok(res.json::<T>().await?)
    } else if status == StatusCode::NOT_FOUND {
        Err(ClientError::NotFound(url))
    } else {
        Err(ClientError::Unexpected(status, url))
    }
}

/// Client for the points, gridpoints and stations endpoints of api.weather.gov.
#[derive(Debug, Clone)]
pub struct WeatherGovClient {
    client: Client,
    base_url: Url,
}

impl WeatherGovClient {
    const JSON_RESPONSE: &'static str = "application/geo+json";

    pub fn new(client: Client, base_url: Url) -> Self {
        WeatherGovClient { client, base_url }
    }

    /// Forecast office and grid cell for a point, `None` if the response had no grid properties.
    pub async fn point(&self, coords: Coordinates) -> Result<Option<GridReference>, ClientError> {
        let point_url = self.point_url(coords)?;
        tracing::debug!(message = "making point request", url = %point_url);

        let point: Point = fetch_json(&self.client, point_url, Self::JSON_RESPONSE).await?;
        Ok(point.properties.and_then(PointProperties::into_grid))
    }

    /// Observation station references for a grid cell, in the order the API returns them.
    pub async fn stations(&self, grid: &GridReference) -> Result<Vec<String>, ClientError> {
        let stations_url = self.stations_url(grid)?;
        tracing::debug!(message = "making gridpoint stations request", url = %stations_url);

        let stations: StationCollection = fetch_json(&self.client, stations_url, Self::JSON_RESPONSE).await?;
        Ok(stations.into_references())
    }

    /// Latest observation for a station, `None` if the observation had no properties.
    pub async fn observation(&self, station: &StationId) -> Result<Option<ObservationReading>, ClientError> {
        let observation_url = self.observation_url(station)?;
        tracing::debug!(message = "making latest observation request", url = %observation_url);

        let obs: Observation = fetch_json(&self.client, observation_url, Self::JSON_RESPONSE).await?;
        match obs.properties {
            Some(props) if !props.is_empty() => {
                let props: ObservationProperties = serde_json::from_value(Value::Object(props))?;
                Ok(Some(props.into_reading()))
            }
            _ => Ok(None),
        }
    }

    fn point_url(&self, coords: Coordinates) -> Result<Url, ClientError> {
        endpoint(&self.base_url, &["points", &coords.to_string()])
    }

    fn stations_url(&self, grid: &GridReference) -> Result<Url, ClientError> {
        let cell = format!("{},{}", grid.x, grid.y);
        endpoint(&self.base_url, &["gridpoints", &grid.office, &cell, "stations"])
    }

    fn observation_url(&self, station: &StationId) -> Result<Url, ClientError> {
        endpoint(&self.base_url, &["stations", station.as_str(), "observations", "latest"])
    }
}

#[async_trait]
impl GridResolver for WeatherGovClient {
    async fn grid_point(&self, coords: Coordinates) -> Result<Option<GridReference>, ClientError> {
        self.point(coords).await
    }
}

#[async_trait]
impl StationLocator for WeatherGovClient {
    async fn observation_stations(&self, grid: &GridReference) -> Result<Vec<String>, ClientError> {
        self.stations(grid).await
    }
}

#[async_trait]
impl ObservationFetcher for WeatherGovClient {
    async fn latest_observation(&self, station: &StationId) -> Result<Option<ObservationReading>, ClientError> {
        self.observation(station).await
    }
}

#[derive(Deserialize, Debug)]
struct Point {
    #[serde(alias = "properties")]
    properties: Option<PointProperties>,
}

#[derive(Deserialize, Debug)]
struct PointProperties {
    #[serde(alias = "gridId")]
    grid_id: Option<String>,
    #[serde(alias = "gridX")]
    grid_x: Option<i64>,
    #[serde(alias = "gridY")]
    grid_y: Option<i64>,
}

impl PointProperties {
    fn into_grid(self) -> Option<GridReference> {
        Some(GridReference {
            office: self.grid_id.filter(|id| !id.is_empty())?,
            x: self.grid_x?,
            y: self.grid_y?,
        })
    }
}

#[derive(Deserialize, Debug)]
struct StationCollection {
    #[serde(alias = "observationStations")]
    observation_stations: Option<Vec<String>>,
    #[serde(alias = "properties")]
    properties: Option<StationCollectionProperties>,
}

#[derive(Deserialize, Debug)]
struct StationCollectionProperties {
    #[serde(alias = "observationStations")]
    observation_stations: Option<Vec<String>>,
}

impl StationCollection {
    fn into_references(self) -> Vec<String> {
        self.observation_stations
            .filter(|s| !s.is_empty())
            .or_else(|| self.properties.and_then(|p| p.observation_stations))
            .unwrap_or_default()
    }
}

#[derive(Deserialize, Debug)]
struct Observation {
    #[serde(alias = "properties")]
    properties: Option<Map<String, Value>>,
}

#[derive(Deserialize, Debug)]
struct ObservationProperties {
    #[serde(alias = "temperature")]
    temperature: Option<Measurement>,
    #[serde(alias = "windSpeed")]
    wind_speed: Option<Measurement>,
    #[serde(alias = "relativeHumidity")]
    relative_humidity: Option<Measurement>,
}

impl ObservationProperties {
    fn into_reading(self) -> ObservationReading {
        ObservationReading {
            temperature: self.temperature.and_then(|m| m.value),
            wind_speed: self.wind_speed.and_then(|m| m.value),
            relative_humidity: self.relative_humidity.and_then(|m| m.value),
        }
    }
}

#[derive(Deserialize, Debug)]
struct Measurement {
    #[serde(alias = "value")]
    value: Option<f64>,
}
