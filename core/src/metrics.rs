//! Derived health metrics: BMI, BMR/TDEE, body fat, calorie sums and advice bands.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::{ActivityLevel, ExerciseEntry, Gender};
use crate::reference::{ExerciseTable, FoodTable};

/// Net calories above this are a surplus, below its negation a deficit.
pub const NET_BALANCE_THRESHOLD: f64 = 500.0;

/// Body mass index; zero when height is not positive.
#[must_use]
pub fn bmi(weight_kg: f64, height_cm: f64) -> f64 {
    if height_cm <= 0.0 {
        return 0.0;
    }
    let height_m = height_cm / 100.0;
    weight_kg / (height_m * height_m)
}

/// Mifflin-St Jeor BMR and the activity-scaled TDEE.
#[must_use]
pub fn bmr_tdee(
    gender: Gender,
    weight_kg: f64,
    height_cm: f64,
    age: u32,
    activity: ActivityLevel,
) -> (f64, f64) {
    let base = 10.0 * weight_kg + 6.25 * height_cm - 5.0 * f64::from(age);
    let bmr = match gender {
        Gender::Male => base + 5.0,
        Gender::Female => base - 161.0,
    };
    (bmr, bmr * activity.multiplier())
}

/// BMI-based body-fat estimate in percent, never negative.
#[must_use]
pub fn body_fat_rate(bmi: f64, age: u32, gender: Gender) -> f64 {
    let offset = match gender {
        Gender::Male => 16.2,
        Gender::Female => 5.4,
    };
    (1.20 * bmi + 0.23 * f64::from(age) - offset).max(0.0)
}

#[must_use]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MealTotal {
    pub total: f64,
    pub detail: BTreeMap<String, f64>,
}

/// Sum the calories of the named foods; unknown names are skipped.
#[must_use]
pub fn meal_total(names: &[String], foods: &FoodTable) -> MealTotal {
    let mut out = MealTotal::default();
    for name in names {
        if let Some(item) = foods.get(name) {
            out.total += item.calories;
            out.detail.insert(item.name.clone(), item.calories);
        }
    }
    out
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExerciseTotal {
    pub types: Vec<String>,
    pub minutes: f64,
    pub calories: f64,
}

/// Burned calories for the entries with positive minutes found in the table.
#[must_use]
pub fn exercise_total(entries: &[ExerciseEntry], exercises: &ExerciseTable) -> ExerciseTotal {
    let mut out = ExerciseTotal::default();
    for entry in entries.iter().filter(|e| e.minutes > 0.0) {
        let Some(kind) = exercises.get(&entry.name) else {
            continue;
        };
        out.types.push(kind.name.clone());
        out.minutes += entry.minutes;
        out.calories += entry.minutes * kind.calories_per_minute;
    }
    out
}

#[must_use]
pub fn net_calories(intake: f64, burned: f64) -> f64 {
    intake - burned
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NetBalance {
    Surplus,
    Deficit,
    Balanced,
}

impl NetBalance {
    #[must_use]
    pub fn classify(net: f64) -> Self {
        if net > NET_BALANCE_THRESHOLD {
            Self::Surplus
        } else if net < -NET_BALANCE_THRESHOLD {
            Self::Deficit
        } else {
            Self::Balanced
        }
    }

    #[must_use]
    pub fn advice(self) -> &'static str {
        match self {
            Self::Surplus => "今日熱量攝取可能偏多，建議明天多加運動或調整飲食，保持平衡喔！",
            Self::Deficit => "今日熱量消耗較多，記得補充適量營養，讓身體有足夠能量！",
            Self::Balanced => {
                "恭喜您！今日熱量攝取與消耗達到良好平衡，繼續保持這個好習慣！✨"
            }
        }
    }
}

const SUGGESTION_PREFIX: &str = "根據天氣，建議您";

/// Exercise suggestion for the current weather. First matching rule wins;
/// temperature rules are skipped when the temperature is unknown.
#[must_use]
pub fn weather_exercise_suggestion(description: &str, temperature_c: Option<f64>) -> String {
    let desc = description.to_lowercase();
    let has = |keys: &[&str]| keys.iter().any(|k| desc.contains(k));

    let advice = if has(&["雨", "下雨", "雷"]) {
        "在室內運動，例如：瑜伽、跑步機、重訓、室內游泳。"
    } else if temperature_c.is_some_and(|t| t < 10.0) {
        "注意保暖，進行溫和的室內運動，如瑜伽或輕量重訓，避免感冒。"
    } else if temperature_c.is_some_and(|t| t > 30.0) && has(&["晴", "熱"]) {
        "避免高強度戶外運動，或選擇清晨/傍晚時段，並多補充水分，預防中暑。"
    } else if has(&["晴", "多雲", "陰"]) {
        "適合戶外活動！可以考慮慢跑、騎自行車、健走、球類運動，享受好天氣。"
    } else {
        "選擇您喜歡的運動，保持活力！"
    };
    format!("{SUGGESTION_PREFIX}{advice}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BmiBand {
    Underweight,
    Normal,
    Overweight,
    MildObesity,
    ModerateObesity,
    SevereObesity,
}

impl BmiBand {
    #[must_use]
    pub fn classify(bmi: f64) -> Self {
        match bmi {
            b if b < 18.5 => Self::Underweight,
            b if b < 24.0 => Self::Normal,
            b if b < 27.0 => Self::Overweight,
            b if b < 30.0 => Self::MildObesity,
            b if b < 35.0 => Self::ModerateObesity,
            _ => Self::SevereObesity,
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Underweight => "體重過輕",
            Self::Normal => "正常範圍",
            Self::Overweight => "過重",
            Self::MildObesity => "輕度肥胖",
            Self::ModerateObesity => "中度肥胖",
            Self::SevereObesity => "重度肥胖",
        }
    }

    #[must_use]
    pub fn advice(self) -> &'static str {
        match self {
            Self::Underweight => "體重過輕，要多吃一點營養健康的食物，讓身體更強壯喔！",
            Self::Normal => "恭喜！您的體重非常標準，繼續保持健康的生活習慣！🥳",
            Self::Overweight => {
                "體重略微過重，透過飲食調整和適度運動，很快就能恢復理想狀態！💪"
            }
            Self::MildObesity => "輕度肥胖，是時候開始為健康努力了，尋求專業建議會很有幫助喔！",
            Self::ModerateObesity => {
                "中度肥胖，為了您的健康，建議積極減重並尋求醫療協助。健康日記會支持您！"
            }
            Self::SevereObesity => "重度肥胖，請務必立即尋求專業醫療協助，健康是第一位的！",
        }
    }
}
