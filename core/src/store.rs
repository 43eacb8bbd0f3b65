use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::models::{DailyRecord, Gender, NONE_LABEL, RECORD_COLUMNS};
use crate::reference::UpsertOutcome;

/// What `RecordStore::load` found on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LoadOutcome {
    Missing,
    Empty,
    Loaded { rows: usize, skipped: usize },
    Corrupt { reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub rows_parsed: usize,
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
}

/// Daily records keyed by date, mirrored to a CSV file on every change.
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    path: Option<PathBuf>,
    records: BTreeMap<NaiveDate, DailyRecord>,
}

impl RecordStore {
    /// Load the record file. Never fails: unreadable files give an empty store
    /// and a `Corrupt` outcome so the caller can warn.
    #[must_use]
    pub fn load(path: &Path) -> (Self, LoadOutcome) {
        let mut store = Self {
            path: Some(path.to_path_buf()),
            records: BTreeMap::new(),
        };

        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no record file yet");
                return (store, LoadOutcome::Missing);
            }
            Err(e) => {
                warn!(path = %path.display(), "failed to read record file: {e}");
                return (
                    store,
                    LoadOutcome::Corrupt {
                        reason: e.to_string(),
                    },
                );
            }
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return (store, LoadOutcome::Empty);
        }

        match parse_records(bytes.as_slice()) {
            Ok((records, skipped)) => {
                for record in records {
                    store.records.insert(record.date, record);
                }
                let rows = store.records.len();
                if skipped > 0 {
                    warn!(skipped, "skipped unreadable rows in record file");
                }
                (store, LoadOutcome::Loaded { rows, skipped })
            }
            Err(e) => {
                warn!(path = %path.display(), "record file is corrupt: {e:#}");
                (
                    store,
                    LoadOutcome::Corrupt {
                        reason: format!("{e:#}"),
                    },
                )
            }
        }
    }

    /// A store with no backing file.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    #[must_use]
    pub fn get(&self, date: NaiveDate) -> Option<&DailyRecord> {
        self.records.get(&date)
    }

    /// All records, oldest first.
    #[must_use]
    pub fn list(&self) -> Vec<&DailyRecord> {
        self.records.values().collect()
    }

    #[must_use]
    pub fn latest(&self) -> Option<&DailyRecord> {
        self.records.values().next_back()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Insert or overwrite the record for its date, then persist.
    pub fn upsert(&mut self, record: DailyRecord) -> Result<UpsertOutcome> {
        let outcome = match self.records.insert(record.date, record) {
            Some(_) => UpsertOutcome::Updated,
            None => UpsertOutcome::Inserted,
        };
        self.save()?;
        Ok(outcome)
    }

    /// Remove the record for `date`; returns whether one existed.
    pub fn delete(&mut self, date: NaiveDate) -> Result<bool> {
        if self.records.remove(&date).is_none() {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    /// Upsert every parsed row and persist once.
    pub fn import<R: Read>(&mut self, reader: R) -> Result<ImportSummary> {
        let (records, skipped) = parse_records(reader)?;
        let mut summary = ImportSummary {
            rows_parsed: records.len(),
            skipped,
            ..ImportSummary::default()
        };
        for record in records {
            match self.records.insert(record.date, record) {
                Some(_) => summary.updated += 1,
                None => summary.inserted += 1,
            }
        }
        self.save()?;
        Ok(summary)
    }

    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let bytes = self.export()?;
        std::fs::write(path, bytes)
            .with_context(|| format!("Failed to write record file: {}", path.display()))?;
        debug!(path = %path.display(), rows = self.records.len(), "record file saved");
        Ok(())
    }

    /// The full table as UTF-8 CSV.
    pub fn export(&self) -> Result<Vec<u8>> {
        let mut wtr = csv::Writer::from_writer(Vec::new());
        wtr.write_record(RECORD_COLUMNS)?;
        for r in self.records.values() {
            wtr.write_record([
                r.date.format("%Y-%m-%d").to_string(),
                r.weight_kg.to_string(),
                r.target_weight_kg.to_string(),
                r.height_cm.to_string(),
                r.gender.label().to_string(),
                r.bmi.to_string(),
                r.body_fat_pct.to_string(),
                r.intake_calories.to_string(),
                r.exercise_label(),
                r.exercise_minutes.to_string(),
                r.exercise_calories.to_string(),
                r.city.clone(),
                r.weather_description.clone(),
                r.temperature_c.to_string(),
                r.suggestion.clone(),
                r.net_calories.to_string(),
                r.meal_contents.clone(),
            ])?;
        }
        wtr.into_inner().context("Failed to flush CSV writer")
    }
}

/// Accepts `YYYY-MM-DD`, `YYYY/MM/DD`, and either followed by a time.
#[must_use]
pub fn parse_record_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    for fmt in ["%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    for fmt in [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y/%m/%d %H:%M:%S",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    None
}

fn split_exercise_types(s: &str) -> Vec<String> {
    let s = s.trim();
    if s.is_empty() || s == NONE_LABEL {
        return Vec::new();
    }
    s.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

/// Parse record rows by header name. Returns the rows and how many were skipped.
///
/// Missing columns default; unparseable numbers become 0; rows with no usable
/// date are skipped. Free-text cells are kept verbatim.
pub fn parse_records<R: Read>(reader: R) -> Result<(Vec<DailyRecord>, usize)> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);

    let headers = rdr.headers().context("Failed to read CSV headers")?.clone();
    let col = |name: &str| headers.iter().position(|h| h.trim_start_matches('\u{feff}') == name);

    let idx_date = col(RECORD_COLUMNS[0]).context("Missing '日期' column")?;
    let idx: Vec<Option<usize>> = RECORD_COLUMNS.iter().map(|c| col(c)).collect();

    let mut records = Vec::new();
    let mut skipped = 0;

    for (line, result) in rdr.records().enumerate() {
        let Ok(row) = result else {
            debug!(row = line + 2, "skipping malformed CSV row");
            skipped += 1;
            continue;
        };

        let Some(date) = row.get(idx_date).and_then(parse_record_date) else {
            debug!(row = line + 2, "skipping row without a valid date");
            skipped += 1;
            continue;
        };

        let text = |i: usize| -> String {
            idx[i]
                .and_then(|c| row.get(c))
                .unwrap_or("")
                .to_string()
        };
        let num = |i: usize| -> f64 {
            idx[i]
                .and_then(|c| row.get(c))
                .and_then(|v| v.trim().parse::<f64>().ok())
                .filter(|v| v.is_finite())
                .unwrap_or(0.0)
        };

        records.push(DailyRecord {
            date,
            weight_kg: num(1),
            target_weight_kg: num(2),
            height_cm: num(3),
            gender: Gender::from_label_lossy(&text(4)),
            bmi: num(5),
            body_fat_pct: num(6),
            intake_calories: num(7),
            exercise_types: split_exercise_types(&text(8)),
            exercise_minutes: num(9),
            exercise_calories: num(10),
            city: text(11),
            weather_description: text(12),
            temperature_c: num(13),
            suggestion: text(14),
            net_calories: num(15),
            meal_contents: text(16),
        });
    }

    Ok((records, skipped))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(date: &str) -> DailyRecord {
        DailyRecord {
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            weight_kg: 70.5,
            target_weight_kg: 65.0,
            height_cm: 175.0,
            gender: Gender::Female,
            bmi: 23.02,
            body_fat_pct: 28.17,
            intake_calories: 1850.0,
            exercise_types: vec!["慢跑".into(), "游泳".into()],
            exercise_minutes: 45.0,
            exercise_calories: 420.0,
            city: "花蓮縣".into(),
            weather_description: "多雲, 偶陣雨".into(),
            temperature_c: 27.3,
            suggestion: "根據天氣，建議您在室內運動".into(),
            net_calories: 1430.0,
            meal_contents: "早餐: (蛋餅), 午餐: (無), 晚餐: (水餃)".into(),
        }
    }

    #[test]
    fn missing_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let (store, outcome) = RecordStore::load(&dir.path().join("health_data.csv"));
        assert!(store.is_empty());
        assert_eq!(outcome, LoadOutcome::Missing);
    }

    #[test]
    fn empty_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("health_data.csv");
        std::fs::write(&path, "").unwrap();
        let (store, outcome) = RecordStore::load(&path);
        assert!(store.is_empty());
        assert_eq!(outcome, LoadOutcome::Empty);
    }

    #[test]
    fn corrupt_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("health_data.csv");
        std::fs::write(&path, "foo,bar\n1,2\n").unwrap();
        let (store, outcome) = RecordStore::load(&path);
        assert!(store.is_empty());
        assert!(matches!(outcome, LoadOutcome::Corrupt { .. }));
    }

    #[test]
    fn save_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("health_data.csv");
        let (mut store, _) = RecordStore::load(&path);
        store.upsert(sample("2024-03-01")).unwrap();
        let mut second = sample("2024-03-02");
        second.exercise_types.clear();
        second.gender = Gender::Male;
        store.upsert(second).unwrap();

        let (reloaded, outcome) = RecordStore::load(&path);
        assert_eq!(outcome, LoadOutcome::Loaded { rows: 2, skipped: 0 });
        assert_eq!(reloaded.list(), store.list());

        // a second save/load is a fixed point
        reloaded.save().unwrap();
        let (again, _) = RecordStore::load(&path);
        assert_eq!(again.list(), store.list());
    }

    #[test]
    fn free_text_survives_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("health_data.csv");
        let (mut store, _) = RecordStore::load(&path);
        let mut padded = sample("2024-03-01");
        padded.meal_contents = " 早餐: (蛋餅) ".into();
        padded.suggestion = "多喝水\n".into();
        padded.city = " 花蓮縣".into();
        padded.weather_description = "晴, 27°C ".into();
        store.upsert(padded.clone()).unwrap();

        let (reloaded, _) = RecordStore::load(&path);
        assert_eq!(reloaded.list(), vec![&padded]);
    }

    #[test]
    fn padded_numbers_still_parse() {
        let data = "日期 , 體重(kg) ,性別\n 2024-01-01 , 70.5 , 女性 \n";
        let (records, skipped) = parse_records(data.as_bytes()).unwrap();
        assert_eq!(skipped, 0);
        assert_eq!(records[0].weight_kg, 70.5);
        assert_eq!(records[0].gender, Gender::Female);
    }

    #[test]
    fn upsert_is_idempotent() {
        let mut store = RecordStore::in_memory();
        assert_eq!(store.upsert(sample("2024-03-01")).unwrap(), UpsertOutcome::Inserted);
        assert_eq!(store.upsert(sample("2024-03-01")).unwrap(), UpsertOutcome::Updated);
        assert_eq!(store.len(), 1);
        assert_eq!(store.list()[0], &sample("2024-03-01"));
    }

    #[test]
    fn upsert_overwrites_same_date() {
        let mut store = RecordStore::in_memory();
        store.upsert(sample("2024-03-01")).unwrap();
        let mut changed = sample("2024-03-01");
        changed.weight_kg = 69.0;
        store.upsert(changed).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(store.get(date).unwrap().weight_kg, 69.0);
    }

    #[test]
    fn delete_by_date() {
        let mut store = RecordStore::in_memory();
        store.upsert(sample("2024-03-01")).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert!(store.delete(date).unwrap());
        assert!(!store.delete(date).unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn list_is_sorted_and_latest() {
        let mut store = RecordStore::in_memory();
        store.upsert(sample("2024-03-05")).unwrap();
        store.upsert(sample("2024-03-01")).unwrap();
        let dates: Vec<NaiveDate> = store.list().iter().map(|r| r.date).collect();
        assert!(dates.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(
            store.latest().unwrap().date,
            NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
        );
    }

    #[test]
    fn export_then_import_preserves_fields() {
        let mut source = RecordStore::in_memory();
        source.upsert(sample("2024-03-01")).unwrap();
        source.upsert(sample("2024-03-02")).unwrap();
        let bytes = source.export().unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.starts_with("日期,體重(kg),目標體重(kg)"));

        let mut target = RecordStore::in_memory();
        let summary = target.import(bytes.as_slice()).unwrap();
        assert_eq!(summary.rows_parsed, 2);
        assert_eq!(summary.inserted, 2);
        assert_eq!(target.list(), source.list());
    }

    #[test]
    fn parse_tolerates_missing_columns_and_bad_numbers() {
        let data = "日期,體重(kg),BMI\n2024-01-01 08:30:00,abc,22.5\nnot-a-date,70,20\n2024/01/02,inf,\n";
        let (records, skipped) = parse_records(data.as_bytes()).unwrap();
        assert_eq!(skipped, 1);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(records[0].weight_kg, 0.0);
        assert_eq!(records[0].bmi, 22.5);
        assert_eq!(records[1].weight_kg, 0.0);
        assert!(records[1].exercise_types.is_empty());
        assert_eq!(records[1].gender, Gender::Male);
    }

    #[test]
    fn duplicate_dates_keep_last_row() {
        let data = "日期,體重(kg)\n2024-01-01,70\n2024-01-01,71\n";
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("health_data.csv");
        std::fs::write(&path, data).unwrap();
        let (store, outcome) = RecordStore::load(&path);
        assert_eq!(store.len(), 1);
        assert_eq!(outcome, LoadOutcome::Loaded { rows: 1, skipped: 0 });
        assert_eq!(store.list()[0].weight_kg, 71.0);
    }

    #[test]
    fn parse_record_date_formats() {
        let d = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(parse_record_date("2024-02-29"), Some(d));
        assert_eq!(parse_record_date("2024/02/29"), Some(d));
        assert_eq!(parse_record_date("2024-02-29T10:00:00"), Some(d));
        assert_eq!(parse_record_date("29-02-2024"), None);
    }
}
