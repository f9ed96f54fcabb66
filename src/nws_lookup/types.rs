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

use serde::Serialize;
use std::fmt;

/// Unit system requested for the temperature in a lookup result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnitStyle {
    #[default]
    Fahrenheit,
    Celsius,
}

impl UnitStyle {
    /// Map the `style` value of a request to a unit system.
    ///
    /// Only `"f"` selects Fahrenheit. Anything else, including an explicit null,
    /// leaves temperatures in Celsius as reported by the NWS.
    pub fn from_style(style: Option<&str>) -> Self {
        match style {
            Some("f") => UnitStyle::Fahrenheit,
            _ => UnitStyle::Celsius,
        }
    }
}

/// Address to look up current conditions for.
#[derive(Debug, Clone, PartialEq)]
pub struct AddressQuery {
    pub street: String,
    pub city: String,
    pub state: Option<String>,
    pub zip_code: Option<i64>,
    pub unit_style: UnitStyle,
}

impl AddressQuery {
    /// Build a query from request values. Zip codes that are zero or negative are
    /// treated as not given.
    pub fn new<S1, S2>(street: S1, city: S2, state: Option<String>, zip_code: i64, unit_style: UnitStyle) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        AddressQuery {
            street: street.into(),
            city: city.into(),
            state,
            zip_code: Some(zip_code).filter(|z| *z > 0),
            unit_style,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // api.weather.gov redirects for anything more precise than four decimals
        write!(f, "{:.4},{:.4}", self.latitude, self.longitude)
    }
}

/// Single candidate returned by the geocoder. Coordinates are `None` when the
/// match had no usable coordinate pair.
#[derive(Debug, Clone, PartialEq)]
pub struct AddressMatch {
    pub matched_address: Option<String>,
    pub coordinates: Option<Coordinates>,
}

/// Forecast office and grid cell for a point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridReference {
    pub office: String,
    pub x: i64,
    pub y: i64,
}

impl fmt::Display for GridReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{},{}", self.office, self.x, self.y)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationId(String);

impl StationId {
    /// Extract the station identifier from a station resource URL such as
    /// `https://api.weather.gov/stations/KNUQ`.
    ///
    /// Returns `None` if the reference has no `/` or nothing follows the last one.
    pub fn from_reference(reference: &str) -> Option<Self> {
        let (_, id) = reference.rsplit_once('/')?;
        if id.is_empty() {
            None
        } else {
            Some(StationId(id.to_owned()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Latest reading from an observation station. Any field may be missing when the
/// station didn't report it.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationReading {
    pub temperature: Option<f64>,
    pub wind_speed: Option<f64>,
    pub relative_humidity: Option<f64>,
}

impl ObservationReading {
    /// Convert the temperature (reported in Celsius) to the requested units.
    pub fn in_units(self, style: UnitStyle) -> Self {
        ObservationReading {
            temperature: convert_temperature(self.temperature, style),
            ..self
        }
    }
}

/// Convert a Celsius temperature to the requested units. Missing temperatures stay missing.
pub fn convert_temperature(celsius: Option<f64>, style: UnitStyle) -> Option<f64> {
    match (celsius, style) {
        (Some(c), UnitStyle::Fahrenheit) => Some(c * 9.0 / 5.0 + 32.0),
        (c, _) => c,
    }
}
