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

//! End-to-end tests of the HTTP service with the geocoder and api.weather.gov mocked.

use nws_lookup::census::CensusClient;
use nws_lookup::client::WeatherGovClient;
use nws_lookup::http::{router, RequestContext};
use nws_lookup::metrics::LookupMetrics;
use nws_lookup::pipeline::LookupPipeline;
use prometheus_client::registry::Registry;
use reqwest::{Client, StatusCode, Url};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Start the service on an ephemeral port with every upstream pointed at `upstream`.
async fn start_service(upstream: &MockServer) -> SocketAddr {
    start_service_with_client(upstream, Client::new()).await
}

/// Start the service using `client` for every upstream request.
async fn start_service_with_client(upstream: &MockServer, client: Client) -> SocketAddr {
    let base = Url::parse(&upstream.uri()).unwrap();
    let pipeline = LookupPipeline::from_clients(
        CensusClient::new(client.clone(), base.clone(), CensusClient::DEFAULT_BENCHMARK),
        WeatherGovClient::new(client, base),
    );

    let mut registry = Registry::default();
    let metrics = LookupMetrics::new(&mut registry);
    let app = router(Arc::new(RequestContext::new(pipeline, metrics, registry)));

    let server = axum::Server::bind(&SocketAddr::from(([127, 0, 0, 1], 0))).serve(app.into_make_service());
    let addr = server.local_addr();
    tokio::spawn(server);
    addr
}

async fn mount_geocoder(upstream: &MockServer, matches: Value) {
    Mock::given(method("GET"))
        .and(path("/geocoder/locations/address"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": {"addressMatches": matches}
        })))
        .expect(1)
        .mount(upstream)
        .await;
}

async fn mount_point(upstream: &MockServer, expected: u64) {
    Mock::given(method("GET"))
        .and(path("/points/37.4220,-122.0841"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "properties": {"gridId": "MTR", "gridX": 93, "gridY": 87}
        })))
        .expect(expected)
        .mount(upstream)
        .await;
}

async fn mount_stations(upstream: &MockServer, expected: u64) {
    Mock::given(method("GET"))
        .and(path("/gridpoints/MTR/93,87/stations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "observationStations": ["https://api.weather.gov/stations/KNUQ"]
        })))
        .expect(expected)
        .mount(upstream)
        .await;
}

async fn mount_observation(upstream: &MockServer, temperature: Value, expected: u64) {
    Mock::given(method("GET"))
        .and(path("/stations/KNUQ/observations/latest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "properties": {
                "temperature": {"unitCode": "wmoUnit:degC", "value": temperature},
                "windSpeed": {"unitCode": "wmoUnit:km_h-1", "value": 5},
                "relativeHumidity": {"unitCode": "wmoUnit:percent", "value": 60}
            }
        })))
        .expect(expected)
        .mount(upstream)
        .await;
}

fn one_match() -> Value {
    json!([{
        "matchedAddress": "1600 AMPHITHEATRE PKWY, MOUNTAIN VIEW, CA, 94043",
        "coordinates": {"x": -122.0841, "y": 37.422}
    }])
}

fn request_body() -> Value {
    json!({
        "street": "1600 Amphitheatre Pkwy",
        "city": "Mountain View",
        "state": "CA",
        "zip_code": 94043,
        "style": "f"
    })
}

async fn post_weather(addr: SocketAddr, body: &Value) -> (StatusCode, Value) {
    let res = Client::new()
        .post(format!("http://{}/weather/", addr))
        .json(body)
        .send()
        .await
        .unwrap();

    let status = res.status();
    (status, res.json::<Value>().await.unwrap())
}

#[tokio::test]
async fn test_lookup_fahrenheit() {
    let upstream = MockServer::start().await;
    mount_geocoder(&upstream, one_match()).await;
    mount_point(&upstream, 1).await;
    mount_stations(&upstream, 1).await;
    mount_observation(&upstream, json!(20), 1).await;

    let addr = start_service(&upstream).await;
    let (status, body) = post_weather(addr, &request_body()).await;

    assert_eq!(StatusCode::OK, status);
    assert_eq!(
        json!({"temperature": 68.0, "windSpeed": 5.0, "relativeHumidity": 60.0}),
        body
    );
}

#[tokio::test]
async fn test_lookup_missing_temperature() {
    let upstream = MockServer::start().await;
    mount_geocoder(&upstream, one_match()).await;
    mount_point(&upstream, 1).await;
    mount_stations(&upstream, 1).await;
    mount_observation(&upstream, Value::Null, 1).await;

    let addr = start_service(&upstream).await;
    let (status, body) = post_weather(addr, &request_body()).await;

    assert_eq!(StatusCode::OK, status);
    assert_eq!(
        json!({"temperature": null, "windSpeed": 5.0, "relativeHumidity": 60.0}),
        body
    );
}

#[tokio::test]
async fn test_lookup_celsius_without_trailing_slash() {
    let upstream = MockServer::start().await;
    mount_geocoder(&upstream, one_match()).await;
    mount_point(&upstream, 1).await;
    mount_stations(&upstream, 1).await;
    mount_observation(&upstream, json!(20), 1).await;

    let addr = start_service(&upstream).await;
    let res = Client::new()
        .post(format!("http://{}/weather", addr))
        .json(&json!({
            "street": "1600 Amphitheatre Pkwy",
            "city": "Mountain View",
            "zipCode": 94043,
            "unitStyle": "c"
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(StatusCode::OK, res.status());
    let body = res.json::<Value>().await.unwrap();
    assert_eq!(json!(20.0), body["temperature"]);
}

#[tokio::test]
async fn test_lookup_no_coordinates_skips_weather_gov() {
    let upstream = MockServer::start().await;
    mount_geocoder(&upstream, json!([])).await;
    mount_point(&upstream, 0).await;
    mount_stations(&upstream, 0).await;
    mount_observation(&upstream, json!(20), 0).await;

    let addr = start_service(&upstream).await;
    let (status, body) = post_weather(addr, &request_body()).await;

    assert_eq!(StatusCode::NOT_FOUND, status);
    assert_eq!(json!({"msg": "Could not obtain coordinates"}), body);
}

#[tokio::test]
async fn test_lookup_upstream_unavailable() {
    let upstream = MockServer::start().await;
    mount_geocoder(&upstream, one_match()).await;
    Mock::given(method("GET"))
        .and(path("/points/37.4220,-122.0841"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&upstream)
        .await;
    mount_stations(&upstream, 0).await;
    mount_observation(&upstream, json!(20), 0).await;

    let addr = start_service(&upstream).await;
    let (status, body) = post_weather(addr, &request_body()).await;

    assert_eq!(StatusCode::BAD_GATEWAY, status);
    assert_eq!(json!({"msg": "Upstream service unavailable"}), body);
}

#[tokio::test]
async fn test_lookup_upstream_timeout() {
    let upstream = MockServer::start().await;
    mount_geocoder(&upstream, one_match()).await;
    Mock::given(method("GET"))
        .and(path("/points/37.4220,-122.0841"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"properties": {"gridId": "MTR", "gridX": 93, "gridY": 87}}))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&upstream)
        .await;
    mount_stations(&upstream, 0).await;
    mount_observation(&upstream, json!(20), 0).await;

    let client = Client::builder().timeout(Duration::from_millis(50)).build().unwrap();
    let addr = start_service_with_client(&upstream, client).await;
    let (status, body) = post_weather(addr, &request_body()).await;

    assert_eq!(StatusCode::BAD_GATEWAY, status);
    assert_eq!(json!({"msg": "Upstream service unavailable"}), body);
}

#[tokio::test]
async fn test_lookup_explicit_null_style_is_celsius() {
    let upstream = MockServer::start().await;
    mount_geocoder(&upstream, one_match()).await;
    mount_point(&upstream, 1).await;
    mount_stations(&upstream, 1).await;
    mount_observation(&upstream, json!(20), 1).await;

    let addr = start_service(&upstream).await;
    let mut body = request_body();
    body["style"] = Value::Null;
    let (status, body) = post_weather(addr, &body).await;

    assert_eq!(StatusCode::OK, status);
    assert_eq!(json!(20.0), body["temperature"]);
}

#[tokio::test]
async fn test_malformed_body_gets_message() {
    let upstream = MockServer::start().await;
    mount_point(&upstream, 0).await;

    let addr = start_service(&upstream).await;
    let (status, body) = post_weather(
        addr,
        &json!({"street": "1600 Amphitheatre Pkwy", "city": "Mountain View"}),
    )
    .await;

    assert_eq!(StatusCode::UNPROCESSABLE_ENTITY, status);
    let msg = body["msg"].as_str().unwrap();
    assert!(msg.contains("zip_code"), "{}", msg);
}

#[tokio::test]
async fn test_lookup_no_stations() {
    let upstream = MockServer::start().await;
    mount_geocoder(&upstream, one_match()).await;
    mount_point(&upstream, 1).await;
    Mock::given(method("GET"))
        .and(path("/gridpoints/MTR/93,87/stations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"observationStations": []})))
        .expect(1)
        .mount(&upstream)
        .await;
    mount_observation(&upstream, json!(20), 0).await;

    let addr = start_service(&upstream).await;
    let (status, body) = post_weather(addr, &request_body()).await;

    assert_eq!(StatusCode::NOT_FOUND, status);
    assert_eq!(json!({"msg": "Could not obtain observation stations IDs"}), body);
}

#[tokio::test]
async fn test_metrics_after_lookup() {
    let upstream = MockServer::start().await;
    mount_geocoder(&upstream, json!([])).await;

    let addr = start_service(&upstream).await;
    let (status, _) = post_weather(addr, &request_body()).await;
    assert_eq!(StatusCode::NOT_FOUND, status);

    let res = Client::new()
        .get(format!("http://{}/metrics", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(StatusCode::OK, res.status());

    let text = res.text().await.unwrap();
    assert!(
        text.contains(r#"nws_lookup_requests_total{outcome="no_coordinates"} 1"#),
        "{}",
        text
    );
}

#[tokio::test]
async fn test_cors_mirrors_origin() {
    let upstream = MockServer::start().await;
    mount_geocoder(&upstream, json!([])).await;

    let addr = start_service(&upstream).await;
    let res = Client::new()
        .post(format!("http://{}/weather/", addr))
        .header("origin", "http://localhost:3000")
        .json(&request_body())
        .send()
        .await
        .unwrap();

    assert_eq!(
        Some("http://localhost:3000"),
        res.headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok())
    );
}
