mod commands;
mod config;
mod gemini;
mod openweather;
mod server;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

use crate::commands::{
    NewRecordArgs, cmd_analysis, cmd_cities, cmd_diets, cmd_exercise_list, cmd_export,
    cmd_food_categories, cmd_food_list, cmd_food_recognize, cmd_import, cmd_metrics, cmd_plan,
    cmd_profile_set, cmd_profile_show, cmd_record_add, cmd_record_delete, cmd_record_edit,
    cmd_record_list, cmd_record_show, cmd_summary, cmd_weather,
};
use crate::config::Config;
use crate::gemini::GeminiClient;
use crate::openweather::OpenWeatherClient;
use diary_core::models::{ActivityLevel, Gender, Profile, ProfileUpdate, RecordEdit};
use diary_core::service::Diary;
use diary_core::store::{LoadOutcome, RecordStore};

#[derive(Parser)]
#[command(
    name = "diary",
    version,
    about = "A personal health diary: meals, exercise, weather and trends"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Save, view and edit daily records
    Record {
        #[command(subcommand)]
        command: RecordCommands,
    },
    /// Export all records as CSV
    Export {
        /// Write to this file instead of stdout
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Import records from a CSV file (rows overwrite existing dates)
    Import {
        /// Path to the CSV file
        file: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Browse the food table
    Food {
        #[command(subcommand)]
        command: FoodCommands,
    },
    /// Browse the exercise table
    Exercise {
        #[command(subcommand)]
        command: ExerciseCommands,
    },
    /// Show BMR, TDEE, BMI and tips from the profile and latest record
    Metrics {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show current weather and an exercise suggestion
    Weather {
        /// City (Chinese county/city name, default: 花蓮縣)
        city: Option<String>,
        /// List the known Taiwan cities instead
        #[arg(long)]
        list: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate a meal and exercise plan with the AI assistant
    Plan {
        /// Goal: wellness (養生), health (健康), weight_loss (減肥)
        #[arg(short, long, default_value = "health")]
        goal: String,
        /// Duration: week (一週) or month (一個月)
        #[arg(short, long, default_value = "week")]
        duration: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the diet plan guide
    Diets {
        /// Diet plan name (default: list all)
        name: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// View or change the personal profile
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },
    /// Weekly trends, daily calories and exercise distribution
    Analysis {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Greeting, quote and the latest record at a glance
    Summary {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
        /// Disable API key authentication (for development/testing)
        #[arg(long)]
        no_auth: bool,
    },
}

#[derive(Subcommand)]
enum RecordCommands {
    /// Compose and save the record for a day (overwrites that day)
    Add {
        /// Weight in kg
        #[arg(short, long)]
        weight: f64,
        /// Height in cm
        #[arg(long)]
        height: f64,
        /// Gender: 男性/女性 or male/female (default: profile gender)
        #[arg(long)]
        gender: Option<String>,
        /// Foods eaten at breakfast (comma separated)
        #[arg(long, value_delimiter = ',')]
        breakfast: Vec<String>,
        /// Foods eaten at lunch (comma separated)
        #[arg(long, value_delimiter = ',')]
        lunch: Vec<String>,
        /// Foods eaten at dinner (comma separated)
        #[arg(long, value_delimiter = ',')]
        dinner: Vec<String>,
        /// Exercise as NAME:MINUTES, repeatable (e.g. -e 慢跑:30)
        #[arg(short, long = "exercise")]
        exercises: Vec<String>,
        /// City for the weather lookup (default: 花蓮縣)
        #[arg(long)]
        city: Option<String>,
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the record for a date (default: today)
    Show {
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List stored records, oldest first
    List {
        /// Only the last N records
        #[arg(short, long)]
        days: Option<u32>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit fields of a stored record; derived values are recomputed
    Edit {
        /// Date of the record to edit
        date: String,
        /// Move the record to this date
        #[arg(long)]
        new_date: Option<String>,
        #[arg(long)]
        weight: Option<f64>,
        #[arg(long)]
        target_weight: Option<f64>,
        #[arg(long)]
        height: Option<f64>,
        #[arg(long)]
        gender: Option<String>,
        /// Intake in kcal
        #[arg(long)]
        intake: Option<f64>,
        /// Exercise types (comma separated)
        #[arg(long, value_delimiter = ',')]
        exercise_types: Option<Vec<String>>,
        /// Total exercise minutes
        #[arg(long)]
        minutes: Option<f64>,
        #[arg(long)]
        city: Option<String>,
        #[arg(long)]
        weather: Option<String>,
        #[arg(long, allow_negative_numbers = true)]
        temperature: Option<f64>,
        #[arg(long)]
        suggestion: Option<String>,
        #[arg(long)]
        meals: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete the record for a date
    Delete {
        /// Date of the record to delete
        date: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum FoodCommands {
    /// List foods, optionally filtered
    List {
        /// Case-insensitive name filter
        #[arg(short, long)]
        search: Option<String>,
        /// Only this category
        #[arg(short, long)]
        category: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List food categories
    Categories {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Describe a food photo and estimate its calories
    Recognize {
        /// Path to the image (jpg, png, webp)
        image: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ExerciseCommands {
    /// List exercise types and their burn rates
    List {
        /// Case-insensitive name filter
        #[arg(short, long)]
        search: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// Show the profile
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change profile fields
    Set {
        #[arg(long)]
        age: Option<u32>,
        /// 男性/女性 or male/female
        #[arg(long)]
        gender: Option<String>,
        /// sedentary, light, moderate, active, very_active
        #[arg(long)]
        activity: Option<String>,
        /// Target weight in kg (0 clears it)
        #[arg(long)]
        target_weight: Option<f64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(matches!(cli.command, Commands::Serve { .. }));

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

/// Diagnostics go to stderr; `RUST_LOG` overrides the default level.
fn init_tracing(serving: bool) {
    let default_level = if serving { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn open_diary(config: &Config) -> Diary {
    let (store, outcome) = RecordStore::load(&config.records_path);
    match outcome {
        LoadOutcome::Corrupt { reason } => eprintln!(
            "Warning: could not read {} ({reason}). Starting with no records.",
            config.records_path.display()
        ),
        LoadOutcome::Loaded { skipped, .. } if skipped > 0 => {
            eprintln!("Warning: skipped {skipped} unreadable rows in the records file.");
        }
        _ => {}
    }
    let (profile, problem) = Profile::load_or_default(&config.profile_path);
    if let Some(reason) = problem {
        eprintln!("Warning: {reason}. Using the default profile; `diary profile set` rewrites it.");
    }
    Diary::new(store, profile)
}

fn parse_gender(value: Option<String>) -> Result<Option<Gender>> {
    value.map(|g| g.parse()).transpose()
}

#[allow(clippy::too_many_lines)]
async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let mut diary = open_diary(&config);
    let weather = OpenWeatherClient::new(config.openweather_key.clone())?;
    let ai = GeminiClient::new(config.gemini_key.clone(), config.gemini_model.clone())?;

    match cli.command {
        Commands::Record { command } => match command {
            RecordCommands::Add {
                weight,
                height,
                gender,
                breakfast,
                lunch,
                dinner,
                exercises,
                city,
                date,
                json,
            } => {
                let args = NewRecordArgs {
                    date,
                    weight_kg: weight,
                    height_cm: height,
                    gender: parse_gender(gender)?,
                    city,
                    breakfast,
                    lunch,
                    dinner,
                    exercises,
                };
                cmd_record_add(&mut diary, &weather, args, json).await
            }
            RecordCommands::Show { date, json } => cmd_record_show(&diary, date, json),
            RecordCommands::List { days, json } => cmd_record_list(&diary, days, json),
            RecordCommands::Edit {
                date,
                new_date,
                weight,
                target_weight,
                height,
                gender,
                intake,
                exercise_types,
                minutes,
                city,
                weather: weather_description,
                temperature,
                suggestion,
                meals,
                json,
            } => {
                let edit = RecordEdit {
                    date: new_date
                        .map(|d| commands::parse_date(Some(d)))
                        .transpose()?,
                    weight_kg: weight,
                    target_weight_kg: target_weight,
                    height_cm: height,
                    gender: parse_gender(gender)?,
                    intake_calories: intake,
                    exercise_types: exercise_types.map(|types| {
                        types
                            .into_iter()
                            .map(|t| t.trim().to_string())
                            .filter(|t| !t.is_empty())
                            .collect()
                    }),
                    exercise_minutes: minutes,
                    city,
                    weather_description,
                    temperature_c: temperature,
                    suggestion,
                    meal_contents: meals,
                };
                cmd_record_edit(&mut diary, &date, &edit, json)
            }
            RecordCommands::Delete { date, json } => cmd_record_delete(&mut diary, &date, json),
        },
        Commands::Export { output } => cmd_export(&diary, output.as_deref()),
        Commands::Import { file, json } => cmd_import(&mut diary, &file, json),
        Commands::Food { command } => match command {
            FoodCommands::List {
                search,
                category,
                json,
            } => cmd_food_list(&diary, search.as_deref(), category.as_deref(), json),
            FoodCommands::Categories { json } => cmd_food_categories(&diary, json),
            FoodCommands::Recognize { image, json } => cmd_food_recognize(&ai, &image, json).await,
        },
        Commands::Exercise { command } => match command {
            ExerciseCommands::List { search, json } => {
                cmd_exercise_list(&diary, search.as_deref(), json)
            }
        },
        Commands::Metrics { json } => cmd_metrics(&diary, json),
        Commands::Weather { city, list, json } => {
            if list {
                cmd_cities(json)
            } else {
                cmd_weather(&weather, city, json).await
            }
        }
        Commands::Plan {
            goal,
            duration,
            json,
        } => cmd_plan(&diary, &ai, goal.parse()?, duration.parse()?, json).await,
        Commands::Diets { name, json } => cmd_diets(name.as_deref(), json),
        Commands::Profile { command } => match command {
            ProfileCommands::Show { json } => cmd_profile_show(&diary, json),
            ProfileCommands::Set {
                age,
                gender,
                activity,
                target_weight,
                json,
            } => {
                let update = ProfileUpdate {
                    age,
                    gender: parse_gender(gender)?,
                    activity_level: activity
                        .map(|a| a.parse::<ActivityLevel>())
                        .transpose()?,
                    target_weight_kg: target_weight,
                };
                cmd_profile_set(&mut diary, &config.profile_path, &update, json)
            }
        },
        Commands::Analysis { json } => cmd_analysis(&diary, json),
        Commands::Summary { json } => cmd_summary(&diary, json),
        Commands::Serve {
            port,
            bind,
            no_auth,
        } => {
            let (api_key, new_api_key) = if no_auth {
                (None, false)
            } else {
                let (key, new) = config.load_or_create_api_key()?;
                (Some(key), new)
            };
            let services = server::Services {
                diary,
                weather: Box::new(weather),
                ai: Box::new(ai),
                profile_path: Some(config.profile_path.clone()),
            };
            server::start_server(services, port, &bind, api_key, new_api_key).await
        }
    }
}
