use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Column headers of the persisted record file, in file order.
pub const RECORD_COLUMNS: [&str; 17] = [
    "日期",
    "體重(kg)",
    "目標體重(kg)",
    "身高(公分)",
    "性別",
    "BMI",
    "體脂肪率",
    "總攝取熱量",
    "運動類型",
    "運動時間(分鐘)",
    "運動消耗熱量",
    "天氣城市",
    "天氣說明",
    "氣溫",
    "健康建議",
    "總淨熱量",
    "餐點內容",
];

/// Placeholder written when a list-valued column has no entries.
pub const NONE_LABEL: &str = "無";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    #[default]
    #[serde(alias = "男性")]
    Male,
    #[serde(alias = "女性")]
    Female,
}

impl Gender {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Male => "男性",
            Self::Female => "女性",
        }
    }

    /// Lenient parse used for stored rows: anything unrecognised is `Male`.
    #[must_use]
    pub fn from_label_lossy(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }
}

impl FromStr for Gender {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "男性" | "男" | "male" | "m" => Ok(Self::Male),
            "女性" | "女" | "female" | "f" => Ok(Self::Female),
            other => bail!("Invalid gender '{other}'. Use 男性/女性 or male/female"),
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
    #[default]
    #[serde(alias = "久坐 (很少運動)")]
    Sedentary,
    #[serde(alias = "輕度運動 (每週1-3天)")]
    Light,
    #[serde(alias = "中度運動 (每週3-5天)")]
    Moderate,
    #[serde(alias = "高度運動 (每週6-7天)")]
    Active,
    #[serde(alias = "非常高度運動 (每天訓練)")]
    VeryActive,
}

impl ActivityLevel {
    pub const ALL: [Self; 5] = [
        Self::Sedentary,
        Self::Light,
        Self::Moderate,
        Self::Active,
        Self::VeryActive,
    ];

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Sedentary => "久坐 (很少運動)",
            Self::Light => "輕度運動 (每週1-3天)",
            Self::Moderate => "中度運動 (每週3-5天)",
            Self::Active => "高度運動 (每週6-7天)",
            Self::VeryActive => "非常高度運動 (每天訓練)",
        }
    }

    /// TDEE multiplier applied to BMR.
    #[must_use]
    pub fn multiplier(self) -> f64 {
        match self {
            Self::Sedentary => 1.2,
            Self::Light => 1.375,
            Self::Moderate => 1.55,
            Self::Active => 1.725,
            Self::VeryActive => 1.9,
        }
    }

    /// Resolve a display label; unknown labels fall back to sedentary.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        label.parse().unwrap_or_default()
    }
}

impl FromStr for ActivityLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some(level) = Self::ALL.into_iter().find(|l| l.label() == s) {
            return Ok(level);
        }
        match s.to_lowercase().as_str() {
            "sedentary" | "久坐" => Ok(Self::Sedentary),
            "light" | "輕度運動" => Ok(Self::Light),
            "moderate" | "中度運動" => Ok(Self::Moderate),
            "active" | "高度運動" => Ok(Self::Active),
            "very_active" | "very-active" | "非常高度運動" => Ok(Self::VeryActive),
            other => bail!(
                "Invalid activity level '{other}'. Use sedentary, light, moderate, active, very_active"
            ),
        }
    }
}

impl fmt::Display for ActivityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MealType {
    #[serde(alias = "早餐")]
    Breakfast,
    #[serde(alias = "午餐")]
    Lunch,
    #[serde(alias = "晚餐")]
    Dinner,
}

impl MealType {
    pub const ALL: [Self; 3] = [Self::Breakfast, Self::Lunch, Self::Dinner];

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Breakfast => "早餐",
            Self::Lunch => "午餐",
            Self::Dinner => "晚餐",
        }
    }
}

impl FromStr for MealType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "breakfast" | "早餐" => Ok(Self::Breakfast),
            "lunch" | "午餐" => Ok(Self::Lunch),
            "dinner" | "晚餐" => Ok(Self::Dinner),
            other => bail!("Invalid meal '{other}'. Must be one of: breakfast, lunch, dinner"),
        }
    }
}

impl fmt::Display for MealType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One row of the diary, keyed by calendar date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRecord {
    pub date: NaiveDate,
    pub weight_kg: f64,
    pub target_weight_kg: f64,
    pub height_cm: f64,
    pub gender: Gender,
    pub bmi: f64,
    pub body_fat_pct: f64,
    pub intake_calories: f64,
    #[serde(default)]
    pub exercise_types: Vec<String>,
    pub exercise_minutes: f64,
    pub exercise_calories: f64,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub weather_description: String,
    pub temperature_c: f64,
    #[serde(default)]
    pub suggestion: String,
    pub net_calories: f64,
    #[serde(default)]
    pub meal_contents: String,
}

impl DailyRecord {
    /// An all-defaults record for `date`; missing columns in a stored file end up here.
    #[must_use]
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            weight_kg: 0.0,
            target_weight_kg: 0.0,
            height_cm: 0.0,
            gender: Gender::Male,
            bmi: 0.0,
            body_fat_pct: 0.0,
            intake_calories: 0.0,
            exercise_types: Vec::new(),
            exercise_minutes: 0.0,
            exercise_calories: 0.0,
            city: String::new(),
            weather_description: String::new(),
            temperature_c: 0.0,
            suggestion: String::new(),
            net_calories: 0.0,
            meal_contents: String::new(),
        }
    }

    /// Exercise types as stored in the file: `", "`-joined, or `無`.
    #[must_use]
    pub fn exercise_label(&self) -> String {
        if self.exercise_types.is_empty() {
            NONE_LABEL.to_string()
        } else {
            self.exercise_types.join(", ")
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodItem {
    pub name: String,
    pub calories: f64,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseType {
    pub name: String,
    pub calories_per_minute: f64,
}

/// One exercise performed for a day's record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseEntry {
    pub name: String,
    pub minutes: f64,
}

/// Foods picked for each meal before a record is saved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MealSelection {
    pub breakfast: Vec<String>,
    pub lunch: Vec<String>,
    pub dinner: Vec<String>,
}

impl MealSelection {
    #[must_use]
    pub fn items(&self, meal: MealType) -> &[String] {
        match meal {
            MealType::Breakfast => &self.breakfast,
            MealType::Lunch => &self.lunch,
            MealType::Dinner => &self.dinner,
        }
    }

    fn items_mut(&mut self, meal: MealType) -> &mut Vec<String> {
        match meal {
            MealType::Breakfast => &mut self.breakfast,
            MealType::Lunch => &mut self.lunch,
            MealType::Dinner => &mut self.dinner,
        }
    }

    /// Returns false if the name is already in that meal.
    pub fn add(&mut self, meal: MealType, name: &str) -> bool {
        let items = self.items_mut(meal);
        if items.iter().any(|n| n == name) {
            return false;
        }
        items.push(name.to_string());
        true
    }

    pub fn remove(&mut self, meal: MealType, name: &str) -> bool {
        let items = self.items_mut(meal);
        let before = items.len();
        items.retain(|n| n != name);
        items.len() != before
    }

    pub fn clear_meal(&mut self, meal: MealType) {
        self.items_mut(meal).clear();
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        MealType::ALL.iter().all(|m| self.items(*m).is_empty())
    }

    /// `早餐: (a, b), 午餐: (無), 晚餐: (c)`
    #[must_use]
    pub fn contents_label(&self) -> String {
        MealType::ALL
            .iter()
            .map(|meal| {
                let items = self.items(*meal);
                let joined = if items.is_empty() {
                    NONE_LABEL.to_string()
                } else {
                    items.join(", ")
                };
                format!("{}: ({joined})", meal.label())
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Personal settings that feed BMR, body fat and plan prompts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub age: u32,
    pub gender: Gender,
    pub activity_level: ActivityLevel,
    pub target_weight_kg: f64,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            age: 25,
            gender: Gender::Male,
            activity_level: ActivityLevel::Sedentary,
            target_weight_kg: 0.0,
        }
    }
}

impl Profile {
    /// Read a profile from JSON; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read profile: {}", path.display()))?;
        let profile: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse profile: {}", path.display()))?;
        validate_profile(&profile)?;
        Ok(profile)
    }

    /// Like `load`, but an unreadable or invalid file falls back to the
    /// defaults. The reason is returned so the caller can tell the user.
    #[must_use]
    pub fn load_or_default(path: &Path) -> (Self, Option<String>) {
        match Self::load(path) {
            Ok(profile) => (profile, None),
            Err(e) => {
                warn!(path = %path.display(), "using default profile: {e:#}");
                (Self::default(), Some(format!("{e:#}")))
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write profile: {}", path.display()))
    }
}

/// Partial profile update; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub age: Option<u32>,
    pub gender: Option<Gender>,
    pub activity_level: Option<ActivityLevel>,
    pub target_weight_kg: Option<f64>,
}

/// User input for composing a new daily record.
#[derive(Debug, Clone, Deserialize)]
pub struct RecordInput {
    pub date: NaiveDate,
    pub weight_kg: f64,
    pub height_cm: f64,
    pub gender: Gender,
    #[serde(default)]
    pub exercises: Vec<ExerciseEntry>,
    #[serde(default)]
    pub city: String,
}

/// Field-level edit of a stored record; `None` keeps the stored value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordEdit {
    pub date: Option<NaiveDate>,
    pub weight_kg: Option<f64>,
    pub target_weight_kg: Option<f64>,
    pub height_cm: Option<f64>,
    pub gender: Option<Gender>,
    pub intake_calories: Option<f64>,
    pub exercise_types: Option<Vec<String>>,
    pub exercise_minutes: Option<f64>,
    pub city: Option<String>,
    pub weather_description: Option<String>,
    pub temperature_c: Option<f64>,
    pub suggestion: Option<String>,
    pub meal_contents: Option<String>,
}

pub fn validate_profile(profile: &Profile) -> Result<()> {
    if profile.age == 0 || profile.age > 120 {
        bail!("Age must be between 1 and 120");
    }
    if !profile.target_weight_kg.is_finite() || profile.target_weight_kg < 0.0 {
        bail!("Target weight must not be negative");
    }
    Ok(())
}

pub fn validate_body(weight_kg: f64, height_cm: f64) -> Result<()> {
    if !weight_kg.is_finite() || weight_kg <= 0.0 {
        bail!("Weight must be greater than 0");
    }
    if !height_cm.is_finite() || height_cm <= 0.0 {
        bail!("Height must be greater than 0");
    }
    Ok(())
}

/// Exercise names are stored comma-joined in one CSV cell, so they may not
/// contain a comma or be the `無` placeholder.
pub fn validate_exercise_name(name: &str) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        bail!("Exercise name must not be empty");
    }
    if name.contains(',') {
        bail!("Exercise name '{name}' must not contain ','");
    }
    if name == NONE_LABEL {
        bail!("'{NONE_LABEL}' is not an exercise name");
    }
    Ok(())
}

pub fn validate_exercises(entries: &[ExerciseEntry]) -> Result<()> {
    for entry in entries {
        validate_exercise_name(&entry.name)?;
        if !entry.minutes.is_finite() || entry.minutes < 0.0 {
            bail!("Exercise minutes for '{}' must not be negative", entry.name);
        }
    }
    Ok(())
}

pub fn validate_record_edit(edit: &RecordEdit) -> Result<()> {
    let non_negative = [
        ("weight_kg", edit.weight_kg),
        ("target_weight_kg", edit.target_weight_kg),
        ("height_cm", edit.height_cm),
        ("intake_calories", edit.intake_calories),
        ("exercise_minutes", edit.exercise_minutes),
    ];
    for (field, value) in non_negative {
        if let Some(v) = value {
            if !v.is_finite() || v < 0.0 {
                bail!("{field} must be a non-negative number");
            }
        }
    }
    if let Some(t) = edit.temperature_c {
        if !t.is_finite() {
            bail!("temperature_c must be a finite number");
        }
    }
    for name in edit.exercise_types.iter().flatten() {
        validate_exercise_name(name)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gender_parses_labels_and_english() {
        assert_eq!("男性".parse::<Gender>().unwrap(), Gender::Male);
        assert_eq!("female".parse::<Gender>().unwrap(), Gender::Female);
        assert!("other".parse::<Gender>().is_err());
        assert_eq!(Gender::from_label_lossy("???"), Gender::Male);
    }

    #[test]
    fn activity_level_from_label() {
        assert_eq!(
            ActivityLevel::from_label("中度運動 (每週3-5天)"),
            ActivityLevel::Moderate
        );
        assert_eq!(ActivityLevel::from_label("unknown"), ActivityLevel::Sedentary);
        assert!((ActivityLevel::VeryActive.multiplier() - 1.9).abs() < f64::EPSILON);
    }

    #[test]
    fn meal_type_accepts_both_languages() {
        assert_eq!("午餐".parse::<MealType>().unwrap(), MealType::Lunch);
        assert_eq!("Dinner".parse::<MealType>().unwrap(), MealType::Dinner);
        assert!("snack".parse::<MealType>().is_err());
    }

    #[test]
    fn selection_rejects_duplicates_per_meal() {
        let mut sel = MealSelection::default();
        assert!(sel.add(MealType::Breakfast, "白飯(一碗)"));
        assert!(!sel.add(MealType::Breakfast, "白飯(一碗)"));
        assert!(sel.add(MealType::Lunch, "白飯(一碗)"));
        assert_eq!(sel.items(MealType::Breakfast).len(), 1);
    }

    #[test]
    fn selection_contents_label() {
        let mut sel = MealSelection::default();
        sel.add(MealType::Breakfast, "蛋餅");
        sel.add(MealType::Breakfast, "豆漿");
        sel.add(MealType::Dinner, "水餃");
        assert_eq!(
            sel.contents_label(),
            "早餐: (蛋餅, 豆漿), 午餐: (無), 晚餐: (水餃)"
        );
        sel.clear();
        assert!(sel.is_empty());
    }

    #[test]
    fn profile_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let profile = Profile::load(&dir.path().join("profile.json")).unwrap();
        assert_eq!(profile, Profile::default());
        assert_eq!(profile.age, 25);
    }

    #[test]
    fn profile_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.json");
        let profile = Profile {
            age: 40,
            gender: Gender::Female,
            activity_level: ActivityLevel::Light,
            target_weight_kg: 55.0,
        };
        profile.save(&path).unwrap();
        assert_eq!(Profile::load(&path).unwrap(), profile);
    }

    #[test]
    fn corrupt_profile_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(Profile::load(&path).is_err());

        let (profile, reason) = Profile::load_or_default(&path);
        assert_eq!(profile, Profile::default());
        assert!(reason.unwrap().contains("Failed to parse profile"));

        std::fs::write(&path, r#"{"age":300,"gender":"male","activity_level":"sedentary","target_weight_kg":0}"#).unwrap();
        let (profile, reason) = Profile::load_or_default(&path);
        assert_eq!(profile.age, 25);
        assert!(reason.is_some());

        let (_, reason) = Profile::load_or_default(&dir.path().join("missing.json"));
        assert!(reason.is_none());
    }

    #[test]
    fn validate_profile_bounds() {
        let mut profile = Profile::default();
        assert!(validate_profile(&profile).is_ok());
        profile.age = 0;
        assert!(validate_profile(&profile).is_err());
        profile.age = 30;
        profile.target_weight_kg = -1.0;
        assert!(validate_profile(&profile).is_err());
    }

    #[test]
    fn validate_body_rejects_non_positive() {
        assert!(validate_body(70.0, 175.0).is_ok());
        assert!(validate_body(0.0, 175.0).is_err());
        assert!(validate_body(70.0, -1.0).is_err());
        assert!(validate_body(f64::NAN, 175.0).is_err());
    }

    #[test]
    fn validate_exercises_rejects_negative_minutes() {
        let ok = vec![ExerciseEntry {
            name: "慢跑".into(),
            minutes: 30.0,
        }];
        assert!(validate_exercises(&ok).is_ok());
        let bad = vec![ExerciseEntry {
            name: "慢跑".into(),
            minutes: -5.0,
        }];
        assert!(validate_exercises(&bad).is_err());
    }

    #[test]
    fn exercise_label_uses_placeholder() {
        let mut record = DailyRecord::empty(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        assert_eq!(record.exercise_label(), "無");
        record.exercise_types = vec!["慢跑".into(), "游泳".into()];
        assert_eq!(record.exercise_label(), "慢跑, 游泳");
    }
}
