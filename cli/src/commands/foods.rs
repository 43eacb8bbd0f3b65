use std::path::Path;

use anyhow::{Context, Result};
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use diary_core::assistant::{GenerativeProvider, InlineImage, recognize_food};
use diary_core::models::FoodItem;
use diary_core::service::Diary;

use super::helpers::{json_error, truncate};

pub(crate) fn cmd_food_list(
    diary: &Diary,
    search: Option<&str>,
    category: Option<&str>,
    json: bool,
) -> Result<()> {
    let foods: Vec<&FoodItem> = match search {
        Some(q) => diary
            .foods()
            .search(q)
            .into_iter()
            .filter(|f| category.is_none_or(|c| f.category == c))
            .collect(),
        None => diary.foods().list(category),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&foods)?);
    } else if foods.is_empty() {
        eprintln!("No foods found.");
    } else {
        #[derive(Tabled)]
        struct FoodRow {
            #[tabled(rename = "Name")]
            name: String,
            #[tabled(rename = "kcal")]
            calories: String,
            #[tabled(rename = "Category")]
            category: String,
        }

        let rows: Vec<FoodRow> = foods
            .iter()
            .map(|f| FoodRow {
                name: truncate(&f.name, 30),
                calories: format!("{:.0}", f.calories),
                category: f.category.clone(),
            })
            .collect();

        let table = Table::new(&rows)
            .with(Style::rounded())
            .with(Modify::new(Columns::new(1..2)).with(Alignment::right()))
            .to_string();
        println!("{table}");
    }

    Ok(())
}

pub(crate) fn cmd_food_categories(diary: &Diary, json: bool) -> Result<()> {
    let categories = diary.foods().categories();

    if json {
        println!("{}", serde_json::to_string_pretty(&categories)?);
    } else {
        for c in &categories {
            let count = diary.foods().list(Some(c)).len();
            println!("{c} ({count})");
        }
    }

    Ok(())
}

pub(crate) async fn cmd_food_recognize(
    ai: &dyn GenerativeProvider,
    path: &Path,
    json: bool,
) -> Result<()> {
    let data =
        std::fs::read(path).with_context(|| format!("Failed to read image: {}", path.display()))?;
    let image = InlineImage::from_bytes(data, path.extension().and_then(|e| e.to_str()));

    match recognize_food(ai, image).await {
        Ok(found) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&found)?);
            } else {
                println!("{}", found.description);
                if found.recognized {
                    println!(
                        "  {}: about {} kcal per serving",
                        found.food_name, found.estimated_calories
                    );
                }
            }
        }
        Err(e) => {
            tracing::warn!("food recognition failed: {e}");
            if json {
                println!("{}", json_error(&e.user_message()));
            } else {
                eprintln!("{}", e.user_message());
            }
        }
    }

    Ok(())
}

pub(crate) fn cmd_exercise_list(diary: &Diary, search: Option<&str>, json: bool) -> Result<()> {
    let needle = search.map(str::to_lowercase);
    let exercises: Vec<_> = diary
        .exercises()
        .list()
        .into_iter()
        .filter(|e| {
            needle
                .as_deref()
                .is_none_or(|n| e.name.to_lowercase().contains(n))
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&exercises)?);
    } else if exercises.is_empty() {
        eprintln!("No exercises found.");
    } else {
        #[derive(Tabled)]
        struct ExerciseRow {
            #[tabled(rename = "Exercise")]
            name: String,
            #[tabled(rename = "kcal/min")]
            rate: String,
        }

        let rows: Vec<ExerciseRow> = exercises
            .iter()
            .map(|e| ExerciseRow {
                name: e.name.clone(),
                rate: format!("{:.1}", e.calories_per_minute),
            })
            .collect();

        let table = Table::new(&rows)
            .with(Style::rounded())
            .with(Modify::new(Columns::new(1..2)).with(Alignment::right()))
            .to_string();
        println!("{table}");
    }

    Ok(())
}
