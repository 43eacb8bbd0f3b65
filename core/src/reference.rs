//! Food and exercise reference tables, seeded from bundled CSV.

use std::collections::BTreeMap;
use std::io::Read;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::{debug, warn};

use crate::models::{ExerciseType, FoodItem, validate_exercise_name};

const FOODS_CSV: &str = include_str!("../data/foods.csv");
const EXERCISES_CSV: &str = include_str!("../data/exercises.csv");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

fn validate_entry(name: &str, calories: f64) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        bail!("Name must not be empty");
    }
    if !calories.is_finite() || calories < 0.0 {
        bail!("Calorie value must be a non-negative number");
    }
    Ok(name.to_string())
}

/// Read `(name, value, extra)` rows, skipping blanks and bad numbers.
fn parse_rows<R: Read>(
    reader: R,
    value_col: &str,
    extra_col: Option<&str>,
) -> Result<Vec<(String, f64, String)>> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers().context("Failed to read CSV headers")?.clone();
    let col = |name: &str| headers.iter().position(|h| h == name);

    let idx_name = col("name").context("Missing 'name' column")?;
    let idx_value = col(value_col).with_context(|| format!("Missing '{value_col}' column"))?;
    let idx_extra = extra_col.and_then(col);

    let mut rows = Vec::new();
    for (line, result) in rdr.records().enumerate() {
        let record = result.with_context(|| format!("Failed to parse CSV row {}", line + 2))?;
        let name = record.get(idx_name).unwrap_or("").to_string();
        let Some(value) = record
            .get(idx_value)
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v >= 0.0)
        else {
            debug!(row = line + 2, "skipping reference row with invalid value");
            continue;
        };
        if name.is_empty() {
            continue;
        }
        let extra = idx_extra
            .and_then(|i| record.get(i))
            .unwrap_or("")
            .to_string();
        rows.push((name, value, extra));
    }
    Ok(rows)
}

/// Foods keyed by name. Duplicate names in the seed keep the last definition.
#[derive(Debug, Clone, Default)]
pub struct FoodTable {
    items: BTreeMap<String, FoodItem>,
}

impl FoodTable {
    /// The bundled food list.
    #[must_use]
    pub fn seeded() -> Self {
        match Self::from_csv(FOODS_CSV.as_bytes()) {
            Ok(table) => table,
            Err(e) => {
                warn!("bundled food table failed to parse: {e:#}");
                Self::default()
            }
        }
    }

    pub fn from_csv<R: Read>(reader: R) -> Result<Self> {
        let mut items = BTreeMap::new();
        for (name, calories, category) in parse_rows(reader, "calories", Some("category"))? {
            let item = FoodItem {
                name: name.clone(),
                calories,
                category,
            };
            if let Some(prev) = items.insert(name, item) {
                debug!(name = %prev.name, category = %prev.category, "duplicate food overridden");
            }
        }
        Ok(Self { items })
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FoodItem> {
        self.items.get(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// All foods sorted by name, optionally restricted to one category.
    #[must_use]
    pub fn list(&self, category: Option<&str>) -> Vec<&FoodItem> {
        self.items
            .values()
            .filter(|f| category.is_none_or(|c| f.category == c))
            .collect()
    }

    #[must_use]
    pub fn categories(&self) -> Vec<String> {
        let mut cats: Vec<String> = self.items.values().map(|f| f.category.clone()).collect();
        cats.sort();
        cats.dedup();
        cats
    }

    /// Case-insensitive substring match on names.
    #[must_use]
    pub fn search(&self, query: &str) -> Vec<&FoodItem> {
        let q = query.trim().to_lowercase();
        self.items
            .values()
            .filter(|f| f.name.to_lowercase().contains(&q))
            .collect()
    }

    pub fn upsert(&mut self, name: &str, calories: f64, category: &str) -> Result<UpsertOutcome> {
        let name = validate_entry(name, calories)?;
        let category = category.trim();
        let category = if category.is_empty() { "其他" } else { category };
        let item = FoodItem {
            name: name.clone(),
            calories,
            category: category.to_string(),
        };
        Ok(match self.items.insert(name, item) {
            Some(_) => UpsertOutcome::Updated,
            None => UpsertOutcome::Inserted,
        })
    }

    /// Returns false (and logs) when the food was not in the table.
    pub fn delete(&mut self, name: &str) -> bool {
        let removed = self.items.remove(name).is_some();
        if !removed {
            warn!(name, "delete requested for unknown food");
        }
        removed
    }
}

/// Exercise types keyed by name, valued in calories per minute.
#[derive(Debug, Clone, Default)]
pub struct ExerciseTable {
    items: BTreeMap<String, ExerciseType>,
}

impl ExerciseTable {
    #[must_use]
    pub fn seeded() -> Self {
        match Self::from_csv(EXERCISES_CSV.as_bytes()) {
            Ok(table) => table,
            Err(e) => {
                warn!("bundled exercise table failed to parse: {e:#}");
                Self::default()
            }
        }
    }

    pub fn from_csv<R: Read>(reader: R) -> Result<Self> {
        let mut items = BTreeMap::new();
        for (name, per_minute, _) in parse_rows(reader, "calories_per_minute", None)? {
            if let Err(e) = validate_exercise_name(&name) {
                debug!("skipping exercise row: {e}");
                continue;
            }
            let kind = ExerciseType {
                name: name.clone(),
                calories_per_minute: per_minute,
            };
            if items.insert(name, kind).is_some() {
                debug!("duplicate exercise overridden");
            }
        }
        Ok(Self { items })
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ExerciseType> {
        self.items.get(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn list(&self) -> Vec<&ExerciseType> {
        self.items.values().collect()
    }

    pub fn upsert(&mut self, name: &str, calories_per_minute: f64) -> Result<UpsertOutcome> {
        let name = validate_entry(name, calories_per_minute)?;
        validate_exercise_name(&name)?;
        let kind = ExerciseType {
            name: name.clone(),
            calories_per_minute,
        };
        Ok(match self.items.insert(name, kind) {
            Some(_) => UpsertOutcome::Updated,
            None => UpsertOutcome::Inserted,
        })
    }

    pub fn delete(&mut self, name: &str) -> bool {
        let removed = self.items.remove(name).is_some();
        if !removed {
            warn!(name, "delete requested for unknown exercise");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_foods_dedup_duplicates() {
        let foods = FoodTable::seeded();
        assert_eq!(foods.len(), 367);
        // last definition wins for names listed under two categories
        assert_eq!(foods.get("雞胸肉(100g)").unwrap().category, "肉類與海鮮");
        assert_eq!(foods.get("白飯(一碗)").unwrap().calories, 280.0);
    }

    #[test]
    fn seeded_exercises() {
        let exercises = ExerciseTable::seeded();
        assert_eq!(exercises.len(), 165);
        assert_eq!(exercises.get("慢跑").unwrap().calories_per_minute, 10.0);
    }

    #[test]
    fn categories_sorted_unique() {
        let foods = FoodTable::seeded();
        let cats = foods.categories();
        assert_eq!(cats.len(), 10);
        assert!(cats.contains(&"水果".to_string()));
        let mut sorted = cats.clone();
        sorted.sort();
        assert_eq!(cats, sorted);
    }

    #[test]
    fn list_by_category() {
        let foods = FoodTable::seeded();
        let fruit = foods.list(Some("水果"));
        assert!(!fruit.is_empty());
        assert!(fruit.iter().all(|f| f.category == "水果"));
        assert_eq!(foods.list(None).len(), foods.len());
    }

    #[test]
    fn upsert_inserts_then_updates() {
        let mut foods = FoodTable::default();
        assert_eq!(
            foods.upsert("燕麥粥", 150.0, "穀物與澱粉").unwrap(),
            UpsertOutcome::Inserted
        );
        assert_eq!(
            foods.upsert("燕麥粥", 180.0, "穀物與澱粉").unwrap(),
            UpsertOutcome::Updated
        );
        assert_eq!(foods.len(), 1);
        assert_eq!(foods.get("燕麥粥").unwrap().calories, 180.0);
    }

    #[test]
    fn upsert_validation_leaves_table_untouched() {
        let mut foods = FoodTable::default();
        assert!(foods.upsert("  ", 100.0, "中式").is_err());
        assert!(foods.upsert("湯", -1.0, "中式").is_err());
        assert!(foods.is_empty());

        let mut exercises = ExerciseTable::default();
        assert!(exercises.upsert("", 5.0).is_err());
        assert!(exercises.upsert("跳繩", f64::NAN).is_err());
        assert!(exercises.upsert("跑步,快", 9.0).is_err());
        assert!(exercises.upsert("無", 1.0).is_err());
        assert!(exercises.is_empty());
    }

    #[test]
    fn delete_missing_is_noop() {
        let mut foods = FoodTable::seeded();
        let before = foods.len();
        assert!(!foods.delete("不存在"));
        assert_eq!(foods.len(), before);
        assert!(foods.delete("白飯(一碗)"));
        assert!(foods.get("白飯(一碗)").is_none());
    }

    #[test]
    fn search_is_substring() {
        let foods = FoodTable::seeded();
        let hits = foods.search("雞胸");
        assert!(hits.iter().any(|f| f.name == "雞胸肉(100g)"));
    }

    #[test]
    fn from_csv_skips_bad_values() {
        let data = "name,calories,category\n蘋果,52,水果\n壞掉,abc,水果\n,10,水果\n";
        let foods = FoodTable::from_csv(data.as_bytes()).unwrap();
        assert_eq!(foods.len(), 1);
        assert!(foods.get("蘋果").is_some());
    }
}
