// src/main.rs
use load_planner::api::{ItemRequest, PackRequest};
use load_planner::config::AppConfig;
use load_planner::model::{RotationPermission, Vehicle};
use load_planner::service::PackingService;
use tracing::{error, info};

/// Sample load for the EU Euroliner trailer.
fn sample_request() -> PackRequest {
    PackRequest::new(
        &Vehicle::euroliner(),
        vec![
            ItemRequest::new("box1", (1000.0, 800.0, 600.0), 50.0),
            ItemRequest::new("box2", (1200.0, 900.0, 700.0), 60.0),
            ItemRequest::new("box3", (800.0, 600.0, 500.0), 40.0),
            ItemRequest::new("pallet1", (1200.0, 800.0, 150.0), 200.0)
                .with_rotation(RotationPermission::Fixed)
                .palletized(true),
        ],
    )
}

#[tokio::main]
async fn main() {
    if let Err(err) = dotenvy::dotenv() {
        if !matches!(err, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            eprintln!("⚠️ Could not load .env: {}", err);
        }
    }

    tracing_subscriber::fmt()
        .with_max_level(AppConfig::log_level_from_env())
        .with_target(false)
        .init();
    let app_config = AppConfig::from_env();

    info!("🚚 Load planner starting...");
    let service = match PackingService::from_config(&app_config) {
        Ok(service) => service,
        Err(err) => {
            error!("❌ Invalid configuration: {}", err);
            std::process::exit(1);
        }
    };

    let job = service.run(sample_request()).await;
    match serde_json::to_string_pretty(&job) {
        Ok(json) => println!("{}", json),
        Err(err) => {
            error!("❌ Could not serialize job {}: {}", job.id, err);
            std::process::exit(1);
        }
    }
}
