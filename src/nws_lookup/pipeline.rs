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

use crate::census::CensusClient;
use crate::client::{ClientError, WeatherGovClient};
use crate::types::{AddressMatch, AddressQuery, Coordinates, GridReference, ObservationReading, StationId, UnitStyle};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::Instrument;

/// Resolves an address to candidate matches.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn address_matches(&self, address: &AddressQuery) -> Result<Vec<AddressMatch>, ClientError>;
}

/// Resolves a point to the forecast grid it falls in.
#[async_trait]
pub trait GridResolver: Send + Sync {
    async fn grid_point(&self, coords: Coordinates) -> Result<Option<GridReference>, ClientError>;
}

/// Lists observation station references for a forecast grid cell.
#[async_trait]
pub trait StationLocator: Send + Sync {
    async fn observation_stations(&self, grid: &GridReference) -> Result<Vec<String>, ClientError>;
}

/// Fetches the latest reading of a station, temperatures in Celsius.
#[async_trait]
pub trait ObservationFetcher: Send + Sync {
    async fn latest_observation(&self, station: &StationId) -> Result<Option<ObservationReading>, ClientError>;
}

/// Reasons a lookup can fail. The `Display` form is suitable for showing to users.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("Could not obtain coordinates")]
    NoCoordinates,
    #[error("Could not obtain forecast office ID and forecast grid coordinates")]
    NoGridReference,
    #[error("Could not obtain observation stations IDs")]
    NoStations,
    #[error("Could not obtain observation station ID")]
    NoStationId,
    #[error("Could not obtain the latest observation")]
    NoObservation,
    #[error("Upstream service unavailable")]
    UpstreamUnavailable(#[source] ClientError),
}

impl LookupError {
    /// Stable identifier for the kind of failure, used as a metric label.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NoCoordinates => "no_coordinates",
            Self::NoGridReference => "no_grid_reference",
            Self::NoStations => "no_stations",
            Self::NoStationId => "no_station_id",
            Self::NoObservation => "no_observation",
            Self::UpstreamUnavailable(_) => "upstream_unavailable",
        }
    }

    /// A 404 from a service means it had nothing for us: the stage's `missing`
    /// failure. Every other client error means the service is unavailable.
    fn from_client(err: ClientError, missing: LookupError) -> LookupError {
        match err {
            ClientError::NotFound(url) => {
                tracing::debug!(message = "nothing found upstream", url = %url, reason = missing.reason());
                missing
            }
            e => {
                tracing::warn!(message = "upstream request failed", error = %e);
                LookupError::UpstreamUnavailable(e)
            }
        }
    }
}

/// Coordinates of the first match for an address.
pub async fn locate(geocoder: &dyn Geocoder, address: &AddressQuery) -> Result<Coordinates, LookupError> {
    let matches = geocoder
        .address_matches(address)
        .await
        .map_err(|e| LookupError::from_client(e, LookupError::NoCoordinates))?;

    let first = matches.into_iter().next().ok_or_else(|| {
        tracing::info!(message = "no address matches", street = %address.street, city = %address.city);
        LookupError::NoCoordinates
    })?;

    tracing::debug!(message = "using first address match", matched = ?first.matched_address);
    first.coordinates.ok_or(LookupError::NoCoordinates)
}

pub async fn resolve_grid(resolver: &dyn GridResolver, coords: Coordinates) -> Result<GridReference, LookupError> {
    resolver
        .grid_point(coords)
        .await
        .map_err(|e| LookupError::from_client(e, LookupError::NoGridReference))?
        .ok_or_else(|| {
            tracing::info!(message = "no grid for point", point = %coords);
            LookupError::NoGridReference
        })
}

/// Identifier of the first station the API lists for a grid cell.
pub async fn locate_station(locator: &dyn StationLocator, grid: &GridReference) -> Result<StationId, LookupError> {
    let stations = locator
        .observation_stations(grid)
        .await
        .map_err(|e| LookupError::from_client(e, LookupError::NoStations))?;

    let first = stations.first().ok_or_else(|| {
        tracing::info!(message = "no stations for grid", grid = %grid);
        LookupError::NoStations
    })?;

    StationId::from_reference(first).ok_or_else(|| {
        tracing::info!(message = "unusable station reference", station = %first);
        LookupError::NoStationId
    })
}

/// Latest reading for a station with the temperature in the requested units.
pub async fn fetch_latest(
    fetcher: &dyn ObservationFetcher,
    station: &StationId,
    style: UnitStyle,
) -> Result<ObservationReading, LookupError> {
    fetcher
        .latest_observation(station)
        .await
        .map_err(|e| LookupError::from_client(e, LookupError::NoObservation))?
        .map(|reading| reading.in_units(style))
        .ok_or_else(|| {
            tracing::info!(message = "no latest observation", station = %station);
            LookupError::NoObservation
        })
}

/// Address to current conditions: geocode, find the grid, pick a station, read it.
///
/// Each stage runs only after the previous one succeeded and the first failure is
/// returned as-is. The pipeline holds no per-request state and can be shared between
/// any number of concurrent requests.
#[derive(Clone)]
pub struct LookupPipeline {
    geocoder: Arc<dyn Geocoder>,
    grid: Arc<dyn GridResolver>,
    stations: Arc<dyn StationLocator>,
    observations: Arc<dyn ObservationFetcher>,
}

impl LookupPipeline {
    pub fn new(
        geocoder: Arc<dyn Geocoder>,
        grid: Arc<dyn GridResolver>,
        stations: Arc<dyn StationLocator>,
        observations: Arc<dyn ObservationFetcher>,
    ) -> Self {
        LookupPipeline {
            geocoder,
            grid,
            stations,
            observations,
        }
    }

    /// Pipeline using the Census geocoder and api.weather.gov for everything else.
    pub fn from_clients(census: CensusClient, weather: WeatherGovClient) -> Self {
        let weather = Arc::new(weather);
        Self::new(Arc::new(census), weather.clone(), weather.clone(), weather)
    }

    pub async fn run(&self, address: &AddressQuery) -> Result<ObservationReading, LookupError> {
        self.stages(address)
            .instrument(tracing::span!(tracing::Level::DEBUG, "nws_lookup"))
            .await
    }

    async fn stages(&self, address: &AddressQuery) -> Result<ObservationReading, LookupError> {
        let coords = locate(self.geocoder.as_ref(), address).await?;
        let grid = resolve_grid(self.grid.as_ref(), coords).await?;
        let station = locate_station(self.stations.as_ref(), &grid).await?;
        let reading = fetch_latest(self.observations.as_ref(), &station, address.unit_style).await?;

        tracing::debug!(message = "fetched latest observation", station = %station, grid = %grid, point = %coords);
        Ok(reading)
    }
}
