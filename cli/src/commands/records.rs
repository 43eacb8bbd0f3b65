use anyhow::{Result, bail};
use chrono::NaiveDate;

use diary_core::models::{Gender, MealType, RecordEdit, RecordInput};
use diary_core::reference::UpsertOutcome;
use diary_core::service::Diary;
use diary_core::weather::{DEFAULT_CITY, WeatherProvider};

use super::fetch_weather;
use super::helpers::{
    json_error, no_neg_zero, parse_date, parse_exercise, print_record_detail, print_record_table,
    report_label,
};

/// Arguments of `record add`, already split by meal.
pub(crate) struct NewRecordArgs {
    pub date: Option<String>,
    pub weight_kg: f64,
    pub height_cm: f64,
    pub gender: Option<Gender>,
    pub city: Option<String>,
    pub breakfast: Vec<String>,
    pub lunch: Vec<String>,
    pub dinner: Vec<String>,
    pub exercises: Vec<String>,
}

pub(crate) async fn cmd_record_add(
    diary: &mut Diary,
    weather: &dyn WeatherProvider,
    args: NewRecordArgs,
    json: bool,
) -> Result<()> {
    let date = parse_date(args.date)?;
    let exercises = args
        .exercises
        .iter()
        .map(|e| parse_exercise(e))
        .collect::<Result<Vec<_>>>()?;

    for entry in &exercises {
        if diary.exercises().get(&entry.name).is_none() {
            bail!(
                "Unknown exercise '{}'. See `diary exercise list`",
                entry.name
            );
        }
    }
    for (meal, foods) in [
        (MealType::Breakfast, &args.breakfast),
        (MealType::Lunch, &args.lunch),
        (MealType::Dinner, &args.dinner),
    ] {
        for food in foods {
            diary.select_food(meal, food)?;
        }
    }

    let city = args
        .city
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_CITY.to_string());
    let report = fetch_weather(weather, &city, json).await;

    let input = RecordInput {
        date,
        weight_kg: args.weight_kg,
        height_cm: args.height_cm,
        gender: args.gender.unwrap_or(diary.profile().gender),
        exercises,
        city,
    };
    let saved = diary.save_record(&input, &report)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&saved)?);
    } else {
        let verb = match saved.outcome {
            UpsertOutcome::Inserted => "Saved",
            UpsertOutcome::Updated => "Updated",
        };
        println!(
            "{verb} record for {} (weather: {})\n",
            date.format("%Y-%m-%d"),
            report_label(&report)
        );
        print_record_detail(&saved.record);
    }

    Ok(())
}

pub(crate) fn cmd_record_show(diary: &Diary, date: Option<String>, json: bool) -> Result<()> {
    let date = parse_date(date)?;

    if let Some(r) = diary.record(date) {
        if json {
            println!("{}", serde_json::to_string_pretty(r)?);
        } else {
            print_record_detail(r);
        }
    } else {
        let date_str = date.format("%Y-%m-%d");
        if json {
            println!("{}", json_error(&format!("No record for {date_str}")));
        } else {
            eprintln!("No record for {date_str}");
        }
    }

    Ok(())
}

pub(crate) fn cmd_record_list(diary: &Diary, days: Option<u32>, json: bool) -> Result<()> {
    let mut records = diary.records();
    if let Some(days) = days {
        let keep = usize::try_from(days).unwrap_or(usize::MAX);
        let skip = records.len().saturating_sub(keep);
        records.drain(..skip);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else if records.is_empty() {
        eprintln!("No records yet. Use `diary record add` to save your first day.");
    } else {
        print_record_table(&records);
    }

    Ok(())
}

pub(crate) fn cmd_record_edit(
    diary: &mut Diary,
    date: &str,
    edit: &RecordEdit,
    json: bool,
) -> Result<()> {
    let original = parse_date(Some(date.to_string()))?;
    let updated = diary.edit_record(original, edit)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&updated)?);
    } else {
        if updated.date == original {
            println!("Updated record for {}\n", original.format("%Y-%m-%d"));
        } else {
            println!(
                "Moved record {} -> {}\n",
                original.format("%Y-%m-%d"),
                updated.date.format("%Y-%m-%d")
            );
        }
        print_record_detail(&updated);
        println!(
            "\n  Burned recomputed at the average rate: {:.0} kcal, net {:.0} kcal",
            updated.exercise_calories,
            no_neg_zero(updated.net_calories)
        );
    }

    Ok(())
}

pub(crate) fn cmd_record_delete(diary: &mut Diary, date: &str, json: bool) -> Result<()> {
    let date: NaiveDate = parse_date(Some(date.to_string()))?;
    let deleted = diary.delete_record(date)?;
    let date_str = date.format("%Y-%m-%d");

    if json {
        println!(
            "{}",
            serde_json::json!({ "date": date_str.to_string(), "deleted": deleted })
        );
    } else if deleted {
        println!("Deleted record for {date_str}");
    } else {
        eprintln!("No record for {date_str}");
    }

    Ok(())
}
