use anyhow::Result;

use diary_core::metrics::weather_exercise_suggestion;
use diary_core::weather::{DEFAULT_CITY, TAIWAN_CITIES, WeatherProvider};

use super::fetch_weather;
use super::helpers::report_label;

pub(crate) async fn cmd_weather(
    provider: &dyn WeatherProvider,
    city: Option<String>,
    json: bool,
) -> Result<()> {
    let city = city
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_CITY.to_string());
    let report = fetch_weather(provider, &city, json).await;
    let suggestion = weather_exercise_suggestion(&report.description, report.temperature_c);

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "weather": report,
                "suggestion": suggestion,
            }))?
        );
    } else {
        println!("{}: {}", report.city, report_label(&report));
        println!("{suggestion}");
    }

    Ok(())
}

pub(crate) fn cmd_cities(json: bool) -> Result<()> {
    let names: Vec<&str> = TAIWAN_CITIES.iter().map(|(zh, _)| *zh).collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&names)?);
    } else {
        println!("{}", names.join("、"));
    }

    Ok(())
}
