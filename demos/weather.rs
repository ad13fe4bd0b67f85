//! Weather-forecast demo host.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example weather
//!
//! Try:
//!   curl http://localhost:3000/WeatherForecast
//!   curl http://localhost:3000/WeatherForecast/slow
//!   curl -X POST http://localhost:3000/WeatherForecast \
//!        -H 'content-type: application/json' \
//!        -d '{"temperatureC":21,"summary":"Mild"}'
//!   curl -X POST http://localhost:3000/WeatherForecast -d 'not json'   # → 400
//!   curl http://localhost:3000/WeatherForecast/boom                    # → 500

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tollgate::middleware::{EventTable, RequestLog};
use tollgate::{Endpoint, Failure, InvalidArgument, Method, Request, Response, Router, Server, StatusCode};
use tracing_subscriber::EnvFilter;

const CONTROLLER: &str = "WeatherForecast";

const SUMMARIES: [&str; 10] = [
    "Freezing", "Bracing", "Chilly", "Cool", "Mild", "Warm", "Balmy", "Hot", "Sweltering", "Scorching",
];

#[derive(Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct WeatherForecast {
    day: u32,
    temperature_c: i32,
    summary: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), tollgate::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let events = EventTable::new()
        .with(CONTROLLER, "Get", 1)
        .with(CONTROLLER, "GetWithRandomTimeResponse", 2)
        .with(CONTROLLER, "Post", 2);

    let app = Router::new()
        .action(Method::GET,  "/WeatherForecast",      Endpoint::new(CONTROLLER, "Get"), get)
        .action(Method::GET,  "/WeatherForecast/slow", Endpoint::new(CONTROLLER, "GetWithRandomTimeResponse"), get_with_random_time)
        .action(Method::POST, "/WeatherForecast",      Endpoint::new(CONTROLLER, "Post"), post)
        .on(Method::GET, "/WeatherForecast/boom", boom)
        .request_log(RequestLog::new(events));

    Server::bind("0.0.0.0:3000").serve(app).await
}

// GET /WeatherForecast
async fn get(_req: Request) -> Result<Response, Failure> {
    let mut rng = rand::thread_rng();
    let forecasts: Vec<WeatherForecast> = (1..=5)
        .map(|day| WeatherForecast {
            day,
            temperature_c: rng.gen_range(-20..55),
            summary: Some(SUMMARIES[rng.gen_range(0..SUMMARIES.len())].to_owned()),
        })
        .collect();
    Ok(Response::json(serde_json::to_vec(&forecasts)?))
}

// GET /WeatherForecast/slow: same payload after a 0–999 ms pause.
async fn get_with_random_time(req: Request) -> Result<Response, Failure> {
    let pause = Duration::from_millis(rand::thread_rng().gen_range(0..1_000));
    tokio::time::sleep(pause).await;
    get(req).await
}

// POST /WeatherForecast
async fn post(mut req: Request) -> Result<Response, Failure> {
    let forecast: WeatherForecast = req.json().await?;
    if !(-100..=100).contains(&forecast.temperature_c) {
        return Err(InvalidArgument::new("temperature out of range").param("temperatureC").into());
    }
    Ok(Response::builder()
        .status(StatusCode::CREATED)
        .json(serde_json::to_vec(&forecast)?))
}

// GET /WeatherForecast/boom: always fails, to show the 500 body.
async fn boom(_req: Request) -> Result<Response, Failure> {
    Err(Failure::msg("forecast backend unreachable"))
}
