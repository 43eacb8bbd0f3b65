use std::path::Path;

use anyhow::Result;

use diary_core::models::{Profile, ProfileUpdate};
use diary_core::service::Diary;

pub(crate) fn cmd_profile_show(diary: &Diary, json: bool) -> Result<()> {
    let profile = diary.profile();

    if json {
        println!("{}", serde_json::to_string_pretty(profile)?);
    } else {
        print_profile(profile);
    }

    Ok(())
}

pub(crate) fn cmd_profile_set(
    diary: &mut Diary,
    path: &Path,
    update: &ProfileUpdate,
    json: bool,
) -> Result<()> {
    let profile = diary.update_profile(update)?;
    profile.save(path)?;

    if json {
        println!("{}", serde_json::to_string_pretty(profile)?);
    } else {
        println!("Profile updated.\n");
        print_profile(profile);
    }

    Ok(())
}

fn print_profile(p: &Profile) {
    println!("  Age:            {}", p.age);
    println!("  Gender:         {}", p.gender.label());
    println!("  Activity level: {}", p.activity_level.label());
    if p.target_weight_kg > 0.0 {
        println!("  Target weight:  {:.1} kg", p.target_weight_kg);
    } else {
        println!("  Target weight:  not set");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diary_core::models::ActivityLevel;

    #[test]
    fn profile_set_persists_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.json");
        let mut diary = Diary::in_memory();

        let update = ProfileUpdate {
            age: Some(34),
            activity_level: Some(ActivityLevel::Active),
            target_weight_kg: Some(62.5),
            ..ProfileUpdate::default()
        };
        cmd_profile_set(&mut diary, &path, &update, true).unwrap();

        let saved = Profile::load(&path).unwrap();
        assert_eq!(saved.age, 34);
        assert_eq!(saved.activity_level, ActivityLevel::Active);
        assert_eq!(&saved, diary.profile());
    }

    #[test]
    fn invalid_profile_is_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.json");
        let mut diary = Diary::in_memory();

        let update = ProfileUpdate {
            age: Some(200),
            ..ProfileUpdate::default()
        };
        assert!(cmd_profile_set(&mut diary, &path, &update, true).is_err());
        assert!(!path.exists());
        assert_eq!(diary.profile().age, 25);
    }
}
