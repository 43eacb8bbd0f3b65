use std::io::Read;

use anyhow::{Context, Result, bail};
use chrono::{NaiveDate, Timelike};
use serde::Serialize;
use tracing::{info, warn};

use crate::analysis::{self, AnalysisReport, Overview};
use crate::assistant::{Goal, PlanDuration, PlanRequest};
use crate::metrics::{
    BmiBand, MealTotal, NetBalance, bmi, bmr_tdee, body_fat_rate, exercise_total, meal_total,
    net_calories, round2,
};
use crate::models::{
    ActivityLevel, DailyRecord, MealSelection, MealType, Profile, ProfileUpdate, RecordEdit,
    RecordInput, validate_body, validate_exercises, validate_profile, validate_record_edit,
};
use crate::reference::{ExerciseTable, FoodTable, UpsertOutcome};
use crate::store::{ImportSummary, RecordStore};
use crate::weather::WeatherReport;

/// Average burn rate used when exercise minutes are edited in the history view.
pub const EDIT_CALORIES_PER_MINUTE: f64 = 7.0;

/// Body size assumed for BMR when there are no records yet.
const DEFAULT_WEIGHT_KG: f64 = 65.0;
const DEFAULT_HEIGHT_CM: f64 = 170.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntakeSummary {
    pub breakfast: MealTotal,
    pub lunch: MealTotal,
    pub dinner: MealTotal,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SavedRecord {
    pub record: DailyRecord,
    pub outcome: UpsertOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthAnalysis {
    pub weight_kg: f64,
    pub height_cm: f64,
    pub bmr: f64,
    pub tdee: f64,
    pub bmi: f64,
    pub bmi_band: BmiBand,
    pub bmi_advice: String,
    pub tips: Vec<String>,
    /// True when no record exists and default body size was used.
    pub using_defaults: bool,
}

/// The whole session: stored records, reference tables, the meal being
/// assembled, and the personal profile.
#[derive(Debug, Clone)]
pub struct Diary {
    store: RecordStore,
    foods: FoodTable,
    exercises: ExerciseTable,
    selection: MealSelection,
    profile: Profile,
}

impl Diary {
    #[must_use]
    pub fn new(store: RecordStore, profile: Profile) -> Self {
        Self {
            store,
            foods: FoodTable::seeded(),
            exercises: ExerciseTable::seeded(),
            selection: MealSelection::default(),
            profile,
        }
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(RecordStore::in_memory(), Profile::default())
    }

    #[must_use]
    pub fn foods(&self) -> &FoodTable {
        &self.foods
    }

    pub fn foods_mut(&mut self) -> &mut FoodTable {
        &mut self.foods
    }

    #[must_use]
    pub fn exercises(&self) -> &ExerciseTable {
        &self.exercises
    }

    pub fn exercises_mut(&mut self) -> &mut ExerciseTable {
        &mut self.exercises
    }

    #[must_use]
    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Apply a partial update; the profile is unchanged if validation fails.
    pub fn update_profile(&mut self, update: &ProfileUpdate) -> Result<&Profile> {
        let mut next = self.profile.clone();
        if let Some(age) = update.age {
            next.age = age;
        }
        if let Some(gender) = update.gender {
            next.gender = gender;
        }
        if let Some(level) = update.activity_level {
            next.activity_level = level;
        }
        if let Some(target) = update.target_weight_kg {
            next.target_weight_kg = target;
        }
        validate_profile(&next)?;
        self.profile = next;
        Ok(&self.profile)
    }

    // --- Meal selection ---

    #[must_use]
    pub fn selection(&self) -> &MealSelection {
        &self.selection
    }

    /// Add a food to a meal. Returns false when it is already in that meal.
    pub fn select_food(&mut self, meal: MealType, name: &str) -> Result<bool> {
        let name = name.trim();
        if name.is_empty() {
            bail!("Food name must not be empty");
        }
        if self.foods.get(name).is_none() {
            bail!("Unknown food '{name}'");
        }
        let added = self.selection.add(meal, name);
        if !added {
            warn!(meal = meal.label(), name, "food already selected for this meal");
        }
        Ok(added)
    }

    pub fn remove_food(&mut self, meal: MealType, name: &str) -> bool {
        self.selection.remove(meal, name)
    }

    pub fn clear_meal(&mut self, meal: MealType) {
        self.selection.clear_meal(meal);
    }

    #[must_use]
    pub fn intake(&self) -> IntakeSummary {
        let breakfast = meal_total(self.selection.items(MealType::Breakfast), &self.foods);
        let lunch = meal_total(self.selection.items(MealType::Lunch), &self.foods);
        let dinner = meal_total(self.selection.items(MealType::Dinner), &self.foods);
        let total = breakfast.total + lunch.total + dinner.total;
        IntakeSummary {
            breakfast,
            lunch,
            dinner,
            total,
        }
    }

    // --- Records ---

    /// Build the record for `input` from the current selection and weather.
    pub fn compose_record(
        &self,
        input: &RecordInput,
        weather: &WeatherReport,
    ) -> Result<DailyRecord> {
        validate_body(input.weight_kg, input.height_cm)?;
        validate_exercises(&input.exercises)?;

        let bmi_value = bmi(input.weight_kg, input.height_cm);
        let body_fat = body_fat_rate(bmi_value, self.profile.age, input.gender);
        let intake = self.intake().total;
        let exercise = exercise_total(&input.exercises, &self.exercises);
        let net = net_calories(intake, exercise.calories);
        let band = NetBalance::classify(net);

        Ok(DailyRecord {
            date: input.date,
            weight_kg: input.weight_kg,
            target_weight_kg: self.profile.target_weight_kg,
            height_cm: input.height_cm,
            gender: input.gender,
            bmi: round2(bmi_value),
            body_fat_pct: round2(body_fat),
            intake_calories: intake,
            exercise_types: exercise.types,
            exercise_minutes: exercise.minutes,
            exercise_calories: exercise.calories,
            city: if input.city.trim().is_empty() {
                weather.city.clone()
            } else {
                input.city.trim().to_string()
            },
            weather_description: weather.description.clone(),
            temperature_c: weather.temperature_or_zero(),
            suggestion: band.advice().to_string(),
            net_calories: net,
            meal_contents: self.selection.contents_label(),
        })
    }

    /// Compose, upsert by date, then clear the meal selection.
    pub fn save_record(
        &mut self,
        input: &RecordInput,
        weather: &WeatherReport,
    ) -> Result<SavedRecord> {
        let record = self.compose_record(input, weather)?;
        let outcome = self
            .store
            .upsert(record.clone())
            .context("Failed to save record")?;
        self.selection.clear();
        info!(date = %record.date, ?outcome, "record saved");
        Ok(SavedRecord { record, outcome })
    }

    /// Edit a stored record and recompute its derived fields. Changing the
    /// date moves the record, overwriting any record already on the new date.
    pub fn edit_record(&mut self, original: NaiveDate, edit: &RecordEdit) -> Result<DailyRecord> {
        validate_record_edit(edit)?;
        let Some(current) = self.store.get(original) else {
            bail!("No record for {original}");
        };

        let mut r = current.clone();
        if let Some(date) = edit.date {
            r.date = date;
        }
        if let Some(v) = edit.weight_kg {
            r.weight_kg = v;
        }
        if let Some(v) = edit.target_weight_kg {
            r.target_weight_kg = v;
        }
        if let Some(v) = edit.height_cm {
            r.height_cm = v;
        }
        if let Some(g) = edit.gender {
            r.gender = g;
        }
        if let Some(v) = edit.intake_calories {
            r.intake_calories = v;
        }
        if let Some(types) = &edit.exercise_types {
            r.exercise_types = types.iter().map(|t| t.trim().to_string()).collect();
        }
        if let Some(v) = edit.exercise_minutes {
            r.exercise_minutes = v;
        }
        if let Some(v) = &edit.city {
            r.city.clone_from(v);
        }
        if let Some(v) = &edit.weather_description {
            r.weather_description.clone_from(v);
        }
        if let Some(v) = edit.temperature_c {
            r.temperature_c = v;
        }
        if let Some(v) = &edit.suggestion {
            r.suggestion.clone_from(v);
        }
        if let Some(v) = &edit.meal_contents {
            r.meal_contents.clone_from(v);
        }

        let bmi_value = bmi(r.weight_kg, r.height_cm);
        r.bmi = round2(bmi_value);
        r.body_fat_pct = round2(body_fat_rate(bmi_value, self.profile.age, r.gender));
        r.exercise_calories = r.exercise_minutes * EDIT_CALORIES_PER_MINUTE;
        r.net_calories = net_calories(r.intake_calories, r.exercise_calories);

        if r.date != original {
            self.store.delete(original)?;
        }
        self.store.upsert(r.clone())?;
        Ok(r)
    }

    pub fn delete_record(&mut self, date: NaiveDate) -> Result<bool> {
        self.store.delete(date)
    }

    #[must_use]
    pub fn record(&self, date: NaiveDate) -> Option<&DailyRecord> {
        self.store.get(date)
    }

    #[must_use]
    pub fn records(&self) -> Vec<&DailyRecord> {
        self.store.list()
    }

    pub fn export_csv(&self) -> Result<Vec<u8>> {
        self.store.export()
    }

    pub fn import_csv<R: Read>(&mut self, reader: R) -> Result<ImportSummary> {
        self.store.import(reader)
    }

    // --- Analysis ---

    fn body_size(&self) -> (f64, f64, bool) {
        match self.store.latest() {
            Some(r) => {
                let weight = if r.weight_kg > 0.0 { r.weight_kg } else { DEFAULT_WEIGHT_KG };
                let height = if r.height_cm > 0.0 { r.height_cm } else { DEFAULT_HEIGHT_CM };
                (weight, height, false)
            }
            None => (DEFAULT_WEIGHT_KG, DEFAULT_HEIGHT_CM, true),
        }
    }

    /// BMR/TDEE and tips for the profile and latest body size.
    #[must_use]
    pub fn health_analysis(&self) -> HealthAnalysis {
        let (weight, height, using_defaults) = self.body_size();
        let p = &self.profile;
        let (bmr, tdee) = bmr_tdee(p.gender, weight, height, p.age, p.activity_level);
        let bmi_value = bmi(weight, height);
        let band = BmiBand::classify(bmi_value);

        let mut tips = Vec::new();
        if p.target_weight_kg > 0.0 {
            if weight > p.target_weight_kg {
                tips.push(format!(
                    "您的目標是減重到 {:.1} kg。建議每日攝取 {:.0} - {:.0} 大卡，製造適度熱量赤字。",
                    p.target_weight_kg,
                    (tdee - 500.0).max(0.0),
                    tdee - 250.0
                ));
            } else if weight < p.target_weight_kg {
                tips.push(format!(
                    "您的目標是增重到 {:.1} kg。建議每日攝取 {:.0} - {:.0} 大卡，並搭配肌力訓練。",
                    p.target_weight_kg,
                    tdee + 250.0,
                    tdee + 500.0
                ));
            } else {
                tips.push(format!(
                    "您已達到目標體重！建議每日攝取約 {tdee:.0} 大卡以維持現狀。"
                ));
            }
        }
        match p.activity_level {
            ActivityLevel::Sedentary => tips.push(
                "您的活動量偏低，建議每天增加散步或伸展等輕度活動，逐步養成運動習慣。".to_string(),
            ),
            ActivityLevel::VeryActive => tips.push(
                "您的運動量很大，請注意補充足夠的蛋白質與水分，並安排充足的休息與恢復。".to_string(),
            ),
            _ => {}
        }

        HealthAnalysis {
            weight_kg: weight,
            height_cm: height,
            bmr,
            tdee,
            bmi: round2(bmi_value),
            bmi_band: band,
            bmi_advice: band.advice().to_string(),
            tips,
            using_defaults,
        }
    }

    #[must_use]
    pub fn plan_request(&self, goal: Goal, duration: PlanDuration) -> PlanRequest {
        let (weight, height, _) = self.body_size();
        let p = &self.profile;
        let (bmr, tdee) = bmr_tdee(p.gender, weight, height, p.age, p.activity_level);
        PlanRequest {
            goal,
            duration,
            age: p.age,
            gender: p.gender,
            activity_level: p.activity_level,
            height_cm: height,
            weight_kg: weight,
            bmr,
            tdee,
        }
    }

    #[must_use]
    pub fn overview(&self, now: chrono::NaiveDateTime) -> Overview {
        analysis::overview(&self.store.list(), &self.profile, now.hour())
    }

    #[must_use]
    pub fn analysis(&self) -> AnalysisReport {
        analysis::analyze(&self.store.list())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExerciseEntry, Gender};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    fn input(date: NaiveDate) -> RecordInput {
        RecordInput {
            date,
            weight_kg: 70.0,
            height_cm: 175.0,
            gender: Gender::Male,
            exercises: vec![ExerciseEntry {
                name: "慢跑".into(),
                minutes: 30.0,
            }],
            city: "花蓮縣".into(),
        }
    }

    fn sunny() -> WeatherReport {
        WeatherReport {
            city: "花蓮縣".into(),
            description: "晴".into(),
            temperature_c: Some(25.0),
        }
    }

    #[test]
    fn select_food_rejects_duplicates_and_unknown() {
        let mut diary = Diary::in_memory();
        assert!(diary.select_food(MealType::Lunch, "白飯(一碗)").unwrap());
        assert!(!diary.select_food(MealType::Lunch, "白飯(一碗)").unwrap());
        assert!(diary.select_food(MealType::Lunch, "不存在").is_err());
        assert!(diary.select_food(MealType::Lunch, "  ").is_err());
        assert_eq!(diary.selection().items(MealType::Lunch).len(), 1);
    }

    #[test]
    fn intake_sums_meals() {
        let mut diary = Diary::in_memory();
        diary.select_food(MealType::Breakfast, "白飯(一碗)").unwrap();
        diary.select_food(MealType::Dinner, "白飯(一碗)").unwrap();
        let intake = diary.intake();
        assert_eq!(intake.breakfast.total, 280.0);
        assert_eq!(intake.lunch.total, 0.0);
        assert_eq!(intake.total, 560.0);
    }

    #[test]
    fn save_record_computes_fields_and_clears_selection() {
        let mut diary = Diary::in_memory();
        diary.select_food(MealType::Breakfast, "白飯(一碗)").unwrap();
        let saved = diary.save_record(&input(day(1)), &sunny()).unwrap();
        let r = &saved.record;

        assert_eq!(saved.outcome, UpsertOutcome::Inserted);
        assert_eq!(r.bmi, 22.86);
        let expected_fat = 1.2 * (70.0 / 1.75_f64.powi(2)) + 0.23 * 25.0 - 16.2;
        assert_eq!(r.body_fat_pct, round2(expected_fat));
        assert_eq!(r.intake_calories, 280.0);
        assert_eq!(r.exercise_types, vec!["慢跑".to_string()]);
        assert_eq!(r.exercise_minutes, 30.0);
        assert_eq!(r.exercise_calories, 300.0);
        assert_eq!(r.net_calories, -20.0);
        assert_eq!(r.temperature_c, 25.0);
        assert!(r.suggestion.starts_with("恭喜您"));
        assert_eq!(r.meal_contents, "早餐: (白飯(一碗)), 午餐: (無), 晚餐: (無)");
        assert!(diary.selection().is_empty());
        assert_eq!(diary.records().len(), 1);
    }

    #[test]
    fn save_same_date_overwrites() {
        let mut diary = Diary::in_memory();
        diary.save_record(&input(day(1)), &sunny()).unwrap();
        let mut second = input(day(1));
        second.weight_kg = 68.0;
        let saved = diary.save_record(&second, &sunny()).unwrap();
        assert_eq!(saved.outcome, UpsertOutcome::Updated);
        assert_eq!(diary.records().len(), 1);
        assert_eq!(diary.record(day(1)).unwrap().weight_kg, 68.0);
    }

    #[test]
    fn invalid_input_saves_nothing() {
        let mut diary = Diary::in_memory();
        diary.select_food(MealType::Breakfast, "白飯(一碗)").unwrap();
        let mut bad = input(day(1));
        bad.weight_kg = 0.0;
        assert!(diary.save_record(&bad, &sunny()).is_err());
        assert!(diary.records().is_empty());
        assert!(!diary.selection().is_empty());
    }

    #[test]
    fn unavailable_weather_is_recorded_as_na() {
        let mut diary = Diary::in_memory();
        let saved = diary
            .save_record(&input(day(1)), &WeatherReport::unavailable("花蓮縣"))
            .unwrap();
        assert_eq!(saved.record.weather_description, "N/A");
        assert_eq!(saved.record.temperature_c, 0.0);
    }

    #[test]
    fn edit_recomputes_and_moves_date() {
        let mut diary = Diary::in_memory();
        diary.save_record(&input(day(1)), &sunny()).unwrap();
        let edit = RecordEdit {
            date: Some(day(2)),
            weight_kg: Some(72.0),
            exercise_minutes: Some(40.0),
            intake_calories: Some(2000.0),
            ..RecordEdit::default()
        };
        let edited = diary.edit_record(day(1), &edit).unwrap();
        assert_eq!(edited.date, day(2));
        assert_eq!(edited.exercise_calories, 280.0);
        assert_eq!(edited.net_calories, 1720.0);
        assert_eq!(edited.bmi, round2(72.0 / 1.75_f64.powi(2)));
        assert!(diary.record(day(1)).is_none());
        assert_eq!(diary.records().len(), 1);
    }

    #[test]
    fn edit_missing_record_fails() {
        let mut diary = Diary::in_memory();
        assert!(diary.edit_record(day(9), &RecordEdit::default()).is_err());
    }

    #[test]
    fn edit_rejects_exercise_types_that_would_split() {
        let mut diary = Diary::in_memory();
        diary.save_record(&input(day(1)), &sunny()).unwrap();
        let comma = RecordEdit {
            exercise_types: Some(vec!["跑步,快".into()]),
            ..RecordEdit::default()
        };
        assert!(diary.edit_record(day(1), &comma).is_err());
        assert_eq!(diary.record(day(1)).unwrap().exercise_types, vec!["慢跑".to_string()]);

        let padded = RecordEdit {
            exercise_types: Some(vec![" 瑜珈 ".into()]),
            ..RecordEdit::default()
        };
        let edited = diary.edit_record(day(1), &padded).unwrap();
        assert_eq!(edited.exercise_types, vec!["瑜珈".to_string()]);
    }

    #[test]
    fn health_analysis_defaults_and_tips() {
        let mut diary = Diary::in_memory();
        let analysis = diary.health_analysis();
        assert!(analysis.using_defaults);
        assert_eq!(analysis.weight_kg, 65.0);
        assert_eq!(analysis.height_cm, 170.0);

        diary
            .update_profile(&ProfileUpdate {
                target_weight_kg: Some(60.0),
                ..ProfileUpdate::default()
            })
            .unwrap();
        diary.save_record(&input(day(1)), &sunny()).unwrap();
        let analysis = diary.health_analysis();
        assert!(!analysis.using_defaults);
        assert!(analysis.tips[0].contains("減重"));
        assert!(analysis.tips.iter().any(|t| t.contains("活動量偏低")));
    }

    #[test]
    fn profile_update_is_validated() {
        let mut diary = Diary::in_memory();
        let bad = ProfileUpdate {
            age: Some(0),
            ..ProfileUpdate::default()
        };
        assert!(diary.update_profile(&bad).is_err());
        assert_eq!(diary.profile().age, 25);
    }

    #[test]
    fn plan_request_uses_latest_record() {
        let mut diary = Diary::in_memory();
        diary.save_record(&input(day(1)), &sunny()).unwrap();
        let req = diary.plan_request(Goal::Health, PlanDuration::Week);
        assert_eq!(req.weight_kg, 70.0);
        assert_eq!(req.height_cm, 175.0);
        assert!((req.tdee - req.bmr * 1.2).abs() < 1e-9);
    }

    #[test]
    fn export_import_round_trip() {
        let mut diary = Diary::in_memory();
        diary.save_record(&input(day(1)), &sunny()).unwrap();
        diary.save_record(&input(day(2)), &sunny()).unwrap();
        let bytes = diary.export_csv().unwrap();

        let mut other = Diary::in_memory();
        let summary = other.import_csv(bytes.as_slice()).unwrap();
        assert_eq!(summary.inserted, 2);
        assert_eq!(other.records(), diary.records());
    }
}
