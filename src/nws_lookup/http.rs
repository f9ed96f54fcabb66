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

use crate::metrics::LookupMetrics;
use crate::pipeline::{LookupError, LookupPipeline};
use crate::types::{AddressQuery, UnitStyle};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use prometheus_client::encoding::text::encode;
use prometheus_client::registry::Registry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

const FAHRENHEIT_STYLE: &str = "f";
const OPENMETRICS_TEXT: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// Shared state for all request handlers.
pub struct RequestContext {
    pipeline: LookupPipeline,
    metrics: LookupMetrics,
    registry: Registry,
}

impl RequestContext {
    pub fn new(pipeline: LookupPipeline, metrics: LookupMetrics, registry: Registry) -> Self {
        RequestContext {
            pipeline,
            metrics,
            registry,
        }
    }
}

/// Body of a weather lookup request.
#[derive(Debug, Clone, Deserialize)]
pub struct WeatherRequest {
    pub street: String,
    pub city: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(alias = "zipCode")]
    pub zip_code: i64,
    // Absent means Fahrenheit, an explicit null means no conversion
    #[serde(default = "default_style", alias = "unitStyle")]
    pub style: Option<String>,
}

fn default_style() -> Option<String> {
    Some(FAHRENHEIT_STYLE.to_owned())
}

impl From<WeatherRequest> for AddressQuery {
    fn from(req: WeatherRequest) -> Self {
        let style = UnitStyle::from_style(req.style.as_deref());
        AddressQuery::new(req.street, req.city, req.state, req.zip_code, style)
    }
}

#[derive(Debug, Serialize)]
struct ErrorMessage {
    msg: String,
}

/// Status code to answer with for a failed lookup.
pub fn status_code(err: &LookupError) -> StatusCode {
    match err {
        LookupError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
        LookupError::NoCoordinates
        | LookupError::NoGridReference
        | LookupError::NoStations
        | LookupError::NoStationId
        | LookupError::NoObservation => StatusCode::NOT_FOUND,
    }
}

pub fn router(context: Arc<RequestContext>) -> Router {
    Router::new()
        .route("/weather", post(weather))
        .route("/weather/", post(weather))
        .route("/metrics", get(text_metrics))
        .layer(CorsLayer::very_permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(context)
}

async fn weather(
    State(context): State<Arc<RequestContext>>,
    payload: Result<Json<WeatherRequest>, JsonRejection>,
) -> Response {
    let query = match payload {
        Ok(Json(req)) => AddressQuery::from(req),
        Err(rejection) => {
            tracing::debug!(message = "rejected request body", error = %rejection);
            let body = ErrorMessage {
                msg: rejection.body_text(),
            };
            return (rejection.status(), Json(body)).into_response();
        }
    };

    let start = Instant::now();
    let result = context.pipeline.run(&query).await;
    context.metrics.observe(&result, start.elapsed());

    match result {
        Ok(reading) => {
            tracing::info!(
                message = "completed lookup",
                street = %query.street,
                city = %query.city,
                temperature = ?reading.temperature,
            );
            (StatusCode::OK, Json(reading)).into_response()
        }
        Err(e) => {
            tracing::info!(
                message = "lookup failed",
                street = %query.street,
                city = %query.city,
                reason = e.reason(),
            );
            let body = ErrorMessage { msg: e.to_string() };
            (status_code(&e), Json(body)).into_response()
        }
    }
}

async fn text_metrics(State(context): State<Arc<RequestContext>>) -> Response {
    let mut buf = String::new();

    match encode(&mut buf, &context.registry) {
        Ok(_) => {
            tracing::debug!(message = "encoded prometheus metrics to text format", num_bytes = buf.len());
            ([(CONTENT_TYPE, OPENMETRICS_TEXT)], buf).into_response()
        }
        Err(e) => {
            tracing::error!(message = "error encoding metrics", error = %e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
