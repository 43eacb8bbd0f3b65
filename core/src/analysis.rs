//! Summary and chart series derived from the stored records.

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate};
use rand::Rng;
use rand::seq::IndexedRandom;
use serde::Serialize;

use crate::metrics::bmr_tdee;
use crate::models::{ActivityLevel, DailyRecord, NONE_LABEL, Profile};

pub const HEALTH_QUOTES: [&str; 10] = [
    "每一次的選擇，都在塑造更好的你。",
    "保持健康，就是對自己最好的投資！",
    "運動讓身體發光，健康讓生活精彩！",
    "均衡飲食是健康之路的基石。",
    "聆聽身體的聲音，它會告訴你答案。",
    "每天一點點進步，累積成健康大成功！",
    "微笑是最好的良藥，保持好心情喔！",
    "多喝水，多運動，保持好心情！💖",
    "健康是財富，而記錄是累積財富的過程。",
    "讓健康成為一種習慣，而不是一時的努力。",
];

#[must_use]
pub fn greeting(hour: u32) -> &'static str {
    match hour {
        5..=10 => "早安！新的一天，能量滿滿！☀️",
        11..=13 => "午安！享用美味午餐了嗎？🥗",
        _ => "晚安！辛苦一天了，是時候回顧今日的健康成果！🌙",
    }
}

#[must_use]
pub fn health_quote<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    HEALTH_QUOTES
        .choose(rng)
        .copied()
        .unwrap_or(HEALTH_QUOTES[0])
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatestSnapshot {
    pub date: NaiveDate,
    pub weight_kg: f64,
    pub bmi: f64,
    pub body_fat_pct: f64,
    pub net_calories: f64,
    /// Sedentary BMR; absent when weight or height is missing.
    pub bmr: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightPoint {
    pub date: NaiveDate,
    pub weight_kg: f64,
    pub target_weight_kg: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overview {
    pub greeting: String,
    pub quote: String,
    pub latest: Option<LatestSnapshot>,
    /// Empty until there are at least two records.
    pub weight_trend: Vec<WeightPoint>,
}

/// `records` must be sorted by date, oldest first.
#[must_use]
pub fn overview(records: &[&DailyRecord], profile: &Profile, hour: u32) -> Overview {
    let latest = records.last().map(|r| {
        let bmr = (r.weight_kg > 0.0 && r.height_cm > 0.0).then(|| {
            bmr_tdee(
                profile.gender,
                r.weight_kg,
                r.height_cm,
                profile.age,
                ActivityLevel::Sedentary,
            )
            .0
        });
        LatestSnapshot {
            date: r.date,
            weight_kg: r.weight_kg,
            bmi: r.bmi,
            body_fat_pct: r.body_fat_pct,
            net_calories: r.net_calories,
            bmr,
        }
    });

    Overview {
        greeting: greeting(hour).to_string(),
        quote: health_quote(&mut rand::rng()).to_string(),
        latest,
        weight_trend: weight_trend(records),
    }
}

#[must_use]
pub fn weight_trend(records: &[&DailyRecord]) -> Vec<WeightPoint> {
    if records.len() < 2 {
        return Vec::new();
    }
    records
        .iter()
        .map(|r| WeightPoint {
            date: r.date,
            weight_kg: r.weight_kg,
            target_weight_kg: r.target_weight_kg,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnergySplit {
    pub date: NaiveDate,
    pub intake: f64,
    pub burned: f64,
}

/// Intake vs burned for the latest record; `None` when both are zero.
#[must_use]
pub fn energy_split(latest: Option<&DailyRecord>) -> Option<EnergySplit> {
    let r = latest?;
    if r.intake_calories == 0.0 && r.exercise_calories == 0.0 {
        return None;
    }
    Some(EnergySplit {
        date: r.date,
        intake: r.intake_calories,
        burned: r.exercise_calories,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyTotals {
    /// The Sunday closing the week.
    pub week_ending: NaiveDate,
    pub intake: f64,
    pub burned: f64,
    pub net: f64,
}

fn week_ending(date: NaiveDate) -> NaiveDate {
    let days_to_sunday = 6 - i64::from(date.weekday().num_days_from_monday());
    date + Duration::days(days_to_sunday)
}

/// Weekly sums, one entry per week from the first to the last record.
#[must_use]
pub fn weekly_trend(records: &[&DailyRecord]) -> Vec<WeeklyTotals> {
    let mut buckets: BTreeMap<NaiveDate, (f64, f64, f64)> = BTreeMap::new();
    for r in records {
        let entry = buckets.entry(week_ending(r.date)).or_default();
        entry.0 += r.intake_calories;
        entry.1 += r.exercise_calories;
        entry.2 += r.net_calories;
    }

    let (Some(first), Some(last)) = (
        buckets.keys().next().copied(),
        buckets.keys().next_back().copied(),
    ) else {
        return Vec::new();
    };

    let mut out = Vec::new();
    let mut week = first;
    while week <= last {
        let (intake, burned, net) = buckets.get(&week).copied().unwrap_or_default();
        out.push(WeeklyTotals {
            week_ending: week,
            intake,
            burned,
            net,
        });
        week += Duration::days(7);
    }
    out
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyCalories {
    pub date: NaiveDate,
    pub intake: f64,
    pub burned: f64,
}

/// Per-day intake and burned calories with missing days filled as zero.
#[must_use]
pub fn daily_calories(records: &[&DailyRecord]) -> Vec<DailyCalories> {
    let by_date: BTreeMap<NaiveDate, &DailyRecord> = records.iter().map(|r| (r.date, *r)).collect();
    let (Some(first), Some(last)) = (
        by_date.keys().next().copied(),
        by_date.keys().next_back().copied(),
    ) else {
        return Vec::new();
    };

    first
        .iter_days()
        .take_while(|d| *d <= last)
        .map(|date| {
            let (intake, burned) = by_date
                .get(&date)
                .map_or((0.0, 0.0), |r| (r.intake_calories, r.exercise_calories));
            DailyCalories {
                date,
                intake,
                burned,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExerciseCount {
    pub name: String,
    pub count: usize,
}

/// How often each exercise appears, most frequent first.
#[must_use]
pub fn exercise_distribution(records: &[&DailyRecord]) -> Vec<ExerciseCount> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for r in records {
        for kind in &r.exercise_types {
            let name = kind.split('(').next().unwrap_or("").trim();
            if !name.is_empty() && name != NONE_LABEL {
                *counts.entry(name.to_string()).or_default() += 1;
            }
        }
    }
    let mut out: Vec<ExerciseCount> = counts
        .into_iter()
        .map(|(name, count)| ExerciseCount { name, count })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    out
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub energy_split: Option<EnergySplit>,
    pub weekly: Vec<WeeklyTotals>,
    pub daily: Vec<DailyCalories>,
    pub exercises: Vec<ExerciseCount>,
}

/// `records` must be sorted by date, oldest first.
#[must_use]
pub fn analyze(records: &[&DailyRecord]) -> AnalysisReport {
    AnalysisReport {
        energy_split: energy_split(records.last().copied()),
        weekly: weekly_trend(records),
        daily: daily_calories(records),
        exercises: exercise_distribution(records),
    }
}
