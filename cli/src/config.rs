use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::PathBuf;

use diary_core::gemini::DEFAULT_MODEL;

const RECORDS_FILE: &str = "health_data.csv";
const PROFILE_FILE: &str = "profile.json";

pub struct Config {
    pub records_path: PathBuf,
    pub profile_path: PathBuf,
    pub data_dir: PathBuf,
    pub openweather_key: Option<String>,
    pub gemini_key: Option<String>,
    pub gemini_model: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        let proj_dirs = ProjectDirs::from("", "", "health-diary")
            .context("Could not determine home directory")?;

        let data_dir = proj_dirs.data_dir().to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let records_path = env_value("DIARY_DATA_FILE")
            .map_or_else(|| data_dir.join(RECORDS_FILE), PathBuf::from);
        let profile_path = data_dir.join(PROFILE_FILE);

        Ok(Config {
            records_path,
            profile_path,
            data_dir,
            openweather_key: env_value("OPENWEATHER_API_KEY"),
            gemini_key: env_value("GEMINI_API_KEY"),
            gemini_model: env_value("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        })
    }

    /// Bearer key for `diary serve`, generated on first use and kept in the
    /// data directory. The flag is true when the key was just created.
    pub fn load_or_create_api_key(&self) -> Result<(String, bool)> {
        use rand::Rng;
        use std::fmt::Write;

        let path = self.data_dir.join("api_key");

        if path.exists() {
            let key = std::fs::read_to_string(&path).context("Failed to read API key file")?;
            let key = key.trim().to_string();
            if !key.is_empty() {
                return Ok((key, false));
            }
        }

        let bytes: [u8; 32] = rand::rng().random();
        let key = bytes
            .iter()
            .fold(String::with_capacity(64), |mut acc: String, b| {
                let _ = write!(acc, "{b:02x}");
                acc
            });
        std::fs::write(&path, &key).context("Failed to write API key file")?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                .context("Failed to set API key file permissions")?;
        }
        eprintln!("Created server API key at {}", path.display());
        eprintln!("Send it as: Authorization: Bearer {key}");
        Ok((key, true))
    }
}

/// A set, non-blank environment variable.
fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
