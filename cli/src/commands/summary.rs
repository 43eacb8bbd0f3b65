use anyhow::Result;
use chrono::Local;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use diary_core::service::Diary;

use super::helpers::no_neg_zero;

/// Greeting, quote and the latest snapshot.
pub(crate) fn cmd_summary(diary: &Diary, json: bool) -> Result<()> {
    let overview = diary.overview(Local::now().naive_local());

    if json {
        println!("{}", serde_json::to_string_pretty(&overview)?);
        return Ok(());
    }

    println!("{}", overview.greeting);
    println!("「{}」\n", overview.quote);

    let Some(latest) = &overview.latest else {
        println!("No records yet. Use `diary record add` to save your first day.");
        return Ok(());
    };

    println!("Latest record ({})", latest.date.format("%Y-%m-%d"));
    println!("  Weight:   {:.1} kg", latest.weight_kg);
    println!("  BMI:      {:.2}", latest.bmi);
    println!("  Body fat: {:.2} %", no_neg_zero(latest.body_fat_pct));
    println!("  Net:      {:.0} kcal", no_neg_zero(latest.net_calories));
    if let Some(bmr) = latest.bmr {
        println!("  BMR:      {bmr:.0} kcal");
    }

    if !overview.weight_trend.is_empty() {
        println!("\nWeight trend");
        for p in &overview.weight_trend {
            println!(
                "  {}  {:>6.1} kg  (target {:.1})",
                p.date.format("%Y-%m-%d"),
                p.weight_kg,
                p.target_weight_kg
            );
        }
    }

    Ok(())
}

/// BMR/TDEE, BMI band and tips for the profile.
pub(crate) fn cmd_metrics(diary: &Diary, json: bool) -> Result<()> {
    let health = diary.health_analysis();

    if json {
        println!("{}", serde_json::to_string_pretty(&health)?);
        return Ok(());
    }

    if health.using_defaults {
        eprintln!(
            "No records yet, using {:.0} kg / {:.0} cm.",
            health.weight_kg, health.height_cm
        );
    }
    println!("  BMR:  {:.0} kcal", health.bmr);
    println!("  TDEE: {:.0} kcal", health.tdee);
    println!("  BMI:  {:.2} ({})", health.bmi, health.bmi_band.label());
    println!("\n{}", health.bmi_advice);
    for tip in &health.tips {
        println!("- {tip}");
    }

    Ok(())
}

pub(crate) fn cmd_analysis(diary: &Diary, json: bool) -> Result<()> {
    let report = diary.analysis();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if diary.records().is_empty() {
        eprintln!("No records yet. Use `diary record add` to save your first day.");
        return Ok(());
    }

    if let Some(split) = &report.energy_split {
        println!(
            "Energy on {}: intake {:.0} kcal, burned {:.0} kcal\n",
            split.date.format("%Y-%m-%d"),
            split.intake,
            split.burned
        );
    }

    #[derive(Tabled)]
    struct WeekRow {
        #[tabled(rename = "Week ending")]
        week: String,
        #[tabled(rename = "Intake")]
        intake: String,
        #[tabled(rename = "Burned")]
        burned: String,
        #[tabled(rename = "Net")]
        net: String,
    }

    let rows: Vec<WeekRow> = report
        .weekly
        .iter()
        .map(|w| WeekRow {
            week: w.week_ending.format("%Y-%m-%d").to_string(),
            intake: format!("{:.0}", w.intake),
            burned: format!("{:.0}", w.burned),
            net: format!("{:.0}", no_neg_zero(w.net)),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..4)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    if !report.exercises.is_empty() {
        println!("\nExercise frequency");
        for e in &report.exercises {
            println!("  {:<16} {}", e.name, e.count);
        }
    }

    Ok(())
}
