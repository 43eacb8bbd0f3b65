use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use serde::Serialize;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use diary_core::models::{DailyRecord, ExerciseEntry};
use diary_core::weather::WeatherReport;

pub(crate) fn parse_date(date_str: Option<String>) -> Result<NaiveDate> {
    match date_str {
        None => Ok(Local::now().date_naive()),
        Some(s) => match s.as_str() {
            "today" => Ok(Local::now().date_naive()),
            "yesterday" => Ok(Local::now().date_naive() - chrono::Duration::days(1)),
            "tomorrow" => Ok(Local::now().date_naive() + chrono::Duration::days(1)),
            _ => NaiveDate::parse_from_str(&s, "%Y-%m-%d").with_context(|| {
                format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday/tomorrow")
            }),
        },
    }
}

/// Parse "慢跑:30" or "慢跑=30" into an exercise entry.
pub(crate) fn parse_exercise(s: &str) -> Result<ExerciseEntry> {
    let Some((name, minutes)) = s.rsplit_once([':', '=']) else {
        bail!("Invalid exercise '{s}'. Use NAME:MINUTES (e.g. '慢跑:30')");
    };
    let name = name.trim();
    if name.is_empty() {
        bail!("Exercise name must not be empty in '{s}'");
    }
    let minutes: f64 = minutes
        .trim()
        .parse()
        .with_context(|| format!("Invalid minutes in '{s}'"))?;
    if !minutes.is_finite() || minutes < 0.0 {
        bail!("Exercise minutes must not be negative in '{s}'");
    }
    Ok(ExerciseEntry {
        name: name.to_string(),
        minutes,
    })
}

pub(crate) fn print_record_table(records: &[&DailyRecord]) {
    #[derive(Tabled)]
    struct RecordRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Weight")]
        weight: String,
        #[tabled(rename = "BMI")]
        bmi: String,
        #[tabled(rename = "Body fat %")]
        body_fat: String,
        #[tabled(rename = "Intake")]
        intake: String,
        #[tabled(rename = "Burned")]
        burned: String,
        #[tabled(rename = "Net")]
        net: String,
        #[tabled(rename = "Exercise")]
        exercise: String,
        #[tabled(rename = "Weather")]
        weather: String,
    }

    let rows: Vec<RecordRow> = records
        .iter()
        .map(|r| RecordRow {
            date: r.date.format("%Y-%m-%d").to_string(),
            weight: format!("{:.1}", r.weight_kg),
            bmi: format!("{:.2}", r.bmi),
            body_fat: format!("{:.2}", no_neg_zero(r.body_fat_pct)),
            intake: format!("{:.0}", r.intake_calories),
            burned: format!("{:.0}", r.exercise_calories),
            net: format!("{:.0}", no_neg_zero(r.net_calories)),
            exercise: truncate(&r.exercise_label(), 24),
            weather: weather_label(&r.weather_description, r.temperature_c),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..7)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn print_record_detail(r: &DailyRecord) {
    println!("{}", r.date.format("%Y-%m-%d"));
    println!("  Weight:     {:.1} kg (target {:.1} kg)", r.weight_kg, r.target_weight_kg);
    println!("  Height:     {:.1} cm, {}", r.height_cm, r.gender.label());
    println!("  BMI:        {:.2}", r.bmi);
    println!("  Body fat:   {:.2} %", no_neg_zero(r.body_fat_pct));
    println!("  Intake:     {:.0} kcal", r.intake_calories);
    println!(
        "  Exercise:   {} ({:.0} min, {:.0} kcal)",
        r.exercise_label(),
        r.exercise_minutes,
        r.exercise_calories
    );
    println!("  Net:        {:.0} kcal", no_neg_zero(r.net_calories));
    println!(
        "  Weather:    {} {}",
        r.city,
        weather_label(&r.weather_description, r.temperature_c)
    );
    println!("  Meals:      {}", r.meal_contents);
    if !r.suggestion.is_empty() {
        println!("  Suggestion: {}", r.suggestion);
    }
}

pub(crate) fn report_label(report: &WeatherReport) -> String {
    match report.temperature_c {
        Some(t) => format!("{} {t:.1}°C", report.description),
        None => report.description.clone(),
    }
}

fn weather_label(description: &str, temperature_c: f64) -> String {
    format!("{description} {temperature_c:.1}°C")
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn no_neg_zero(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_date_relative_words() {
        let today = Local::now().date_naive();
        assert_eq!(parse_date(None).unwrap(), today);
        assert_eq!(parse_date(Some("today".into())).unwrap(), today);
        assert_eq!(
            parse_date(Some("tomorrow".into())).unwrap(),
            today + chrono::Duration::days(1)
        );
    }

    #[test]
    fn parse_date_rejects_slashes() {
        assert_eq!(
            parse_date(Some("2023-12-31".into())).unwrap(),
            NaiveDate::from_ymd_opt(2023, 12, 31).unwrap()
        );
        assert!(parse_date(Some("2023/12/31".into())).is_err());
    }

    #[test]
    fn test_parse_exercise() {
        let e = parse_exercise("慢跑:30").unwrap();
        assert_eq!(e.name, "慢跑");
        assert!((e.minutes - 30.0).abs() < f64::EPSILON);

        let e = parse_exercise("游泳(自由式) = 45.5").unwrap();
        assert_eq!(e.name, "游泳(自由式)");
        assert!((e.minutes - 45.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_exercise_invalid() {
        assert!(parse_exercise("慢跑").is_err());
        assert!(parse_exercise(":30").is_err());
        assert!(parse_exercise("慢跑:abc").is_err());
        assert!(parse_exercise("慢跑:-5").is_err());
    }

    #[test]
    fn test_report_label() {
        let unavailable = WeatherReport::unavailable("花蓮縣");
        assert_eq!(report_label(&unavailable), "N/A");
        let sunny = WeatherReport {
            city: "臺北市".into(),
            description: "晴".into(),
            temperature_c: Some(28.04),
        };
        assert_eq!(report_label(&sunny), "晴 28.0°C");
    }

    #[test]
    fn truncate_counts_characters() {
        assert_eq!(truncate("白飯(一碗)", 10), "白飯(一碗)");
        assert_eq!(truncate("地中海飲食搭配橄欖油", 6), "地中海...");
    }

    #[test]
    fn negative_zero_prints_as_zero() {
        assert_eq!(format!("{:.0}", no_neg_zero(-0.0)), "0");
        assert_eq!(no_neg_zero(-120.0), -120.0);
    }
}
