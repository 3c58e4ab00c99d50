use std::sync::mpsc;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use tokio::runtime::Handle;

use nimbus_core::{App, AppError, Config, TemperatureUnit};
use nimbus_weather::units::fahrenheit_to_celsius;
use nimbus_weather::{
    request_fetch, CurrentWeather, FetchRequest, FetchStatus, GadgetbridgePayload,
    InMemoryLocationStore, LocationStore, Provider, ProviderSettings, UnavailableLocator,
    WeatherDataManager, WeatherLocation, WeatherServiceMessage,
};

/// Fetch and cache weather forecasts
#[derive(Parser)]
#[command(name = "nimbus", version, about, allow_negative_numbers = true)]
struct Cli {
    /// Latitude in decimal degrees
    latitude: Option<f64>,

    /// Longitude in decimal degrees
    longitude: Option<f64>,

    /// Display name for the location
    #[arg(long, default_value = "Here")]
    name: String,

    /// Print the Gadgetbridge weather JSON instead of a summary.
    #[arg(long)]
    gadgetbridge: bool,

    /// Check that the configured provider answers, then exit.
    #[arg(long)]
    check: bool,

    /// Drop cached snapshots before fetching.
    #[arg(long)]
    clear_cache: bool,

    /// After fetching, delete cached snapshots of every other location.
    #[arg(long)]
    prune_cache: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load()?;
    nimbus_core::init(&config.logging.level)?;
    let app = App::with_config(config)?;
    for warning in &app.warnings().warnings {
        tracing::warn!("Config warning: {}", warning);
    }

    let settings = ProviderSettings::from_config(&app.config().weather);
    if cli.check {
        return check(&settings).await;
    }

    let (Some(latitude), Some(longitude)) = (cli.latitude, cli.longitude) else {
        bail!("latitude and longitude are required (or pass --check)");
    };

    let manager = Arc::new(WeatherDataManager::from_config(app.config()));
    if cli.clear_cache {
        manager.clear_cache();
    }

    let store = InMemoryLocationStore::default();
    store.add_selected(WeatherLocation::fixed(cli.name, latitude, longitude));
    let location = store.selected().context("no location selected")?;

    let (tx, rx) = mpsc::channel();
    request_fetch(
        &tx,
        &Handle::current(),
        Arc::clone(&manager),
        FetchRequest::new(location.clone(), settings),
        Arc::new(UnavailableLocator),
    );
    drop(tx);

    let outcome = tokio::task::spawn_blocking(move || {
        for message in rx {
            match message {
                WeatherServiceMessage::Updating => tracing::info!("Updating weather"),
                WeatherServiceMessage::Cached(update) => {
                    tracing::info!("Showing cached data from {}", update.weather.timestamp);
                }
                WeatherServiceMessage::FetchDone(result) => return Some(result),
            }
        }
        None
    })
    .await?
    .context("weather service stopped without a result")?;

    let update = match outcome {
        Ok(update) => update,
        Err(e) => {
            let err = AppError::from(e);
            bail!("{} ({})", err.user_message(), err);
        }
    };
    if cli.prune_cache {
        manager.sweep_disk_cache(&store.list());
    }

    if cli.gadgetbridge {
        let payload = GadgetbridgePayload::from_weather(&location, &update.weather, Utc::now());
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        let unit = app.config().weather.temperature_unit;
        print_summary(&location, &update.weather, update.status, unit);
    }

    Ok(())
}

async fn check(settings: &ProviderSettings) -> Result<()> {
    let provider = Provider::from_settings(settings)?;
    provider
        .test_connection()
        .await
        .with_context(|| format!("{} did not answer", settings.kind))?;
    println!("{}: OK", settings.kind);

    if let Provider::OpenWeatherMap(owm) = &provider {
        match owm.determine_api_version().await? {
            Some(version) => println!("One Call API available: {}", version.path_segment()),
            None => println!("No One Call API version accepted this key"),
        }
    }
    Ok(())
}

/// Format a Fahrenheit reading in the configured unit.
fn temperature(fahrenheit: f64, unit: TemperatureUnit) -> String {
    match unit {
        TemperatureUnit::Celsius => format!("{:.0}°C", fahrenheit_to_celsius(fahrenheit)),
        TemperatureUnit::Fahrenheit | TemperatureUnit::Auto => format!("{:.0}°F", fahrenheit),
    }
}

fn print_summary(
    location: &WeatherLocation,
    weather: &CurrentWeather,
    status: FetchStatus,
    unit: TemperatureUnit,
) {
    let tz = weather.tz();
    let current = &weather.current;

    println!(
        "{} ({}, {})",
        location.name, location.latitude, location.longitude
    );
    println!(
        "  Updated {} via {}{}",
        weather.timestamp.with_timezone(&tz).format("%Y-%m-%d %H:%M %Z"),
        weather.provider,
        if status == FetchStatus::NoNewData {
            " (unchanged)"
        } else {
            ""
        }
    );
    println!(
        "  {}  {}",
        temperature(current.temp, unit),
        current.long_description
    );
    if let Some(feels_like) = current.feels_like {
        println!("  Feels like {}", temperature(feels_like, unit));
    }
    println!(
        "  Humidity {}%  Wind {:.0} mph from {}°  Pressure {} hPa",
        current.humidity, current.wind_speed, current.wind_deg, current.pressure
    );

    for day in &weather.daily {
        let date = chrono::DateTime::from_timestamp(day.dt, 0)
            .map(|d| d.with_timezone(&tz).format("%a %b %d").to_string())
            .unwrap_or_default();
        println!(
            "  {:<10} {:>6} / {:>6}  {}",
            date,
            temperature(day.max_temp.unwrap_or(day.temp), unit),
            temperature(day.min_temp.unwrap_or(day.temp), unit),
            day.long_description
        );
    }

    for alert in weather.active_alerts(Utc::now()) {
        println!("  ! {}", alert.event);
    }
}
