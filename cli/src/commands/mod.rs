mod assistant;
mod foods;
mod helpers;
mod profile;
mod records;
mod summary;
mod transfer;
mod weather;

use tracing::warn;

use diary_core::weather::{WeatherProvider, WeatherReport};

pub(crate) use assistant::{cmd_diets, cmd_plan};
pub(crate) use helpers::parse_date;
pub(crate) use foods::{cmd_exercise_list, cmd_food_categories, cmd_food_list, cmd_food_recognize};
pub(crate) use profile::{cmd_profile_set, cmd_profile_show};
pub(crate) use records::{
    NewRecordArgs, cmd_record_add, cmd_record_delete, cmd_record_edit, cmd_record_list,
    cmd_record_show,
};
pub(crate) use summary::{cmd_analysis, cmd_metrics, cmd_summary};
pub(crate) use transfer::{cmd_export, cmd_import};
pub(crate) use weather::{cmd_cities, cmd_weather};

/// Current weather, or the unavailable sentinel after telling the user why.
pub(super) async fn fetch_weather(
    provider: &dyn WeatherProvider,
    city: &str,
    quiet: bool,
) -> WeatherReport {
    match provider.current(city).await {
        Ok(report) => report,
        Err(e) => {
            warn!(city, "weather lookup failed: {e}");
            if !quiet {
                eprintln!("Weather unavailable: {}", e.user_message());
            }
            WeatherReport::unavailable(city)
        }
    }
}
