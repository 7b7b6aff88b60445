use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use basket_core::models::UserId;
use basket_core::session::ApiKeySessions;

const API_KEYS_FILE: &str = "api_keys";

pub struct Config {
    pub db_path: PathBuf,
    pub data_dir: PathBuf,
}

impl Config {
    /// Resolve the data directory, creating it when missing. `db_override`
    /// replaces the default database location.
    pub fn load(db_override: Option<PathBuf>) -> Result<Self> {
        let proj_dirs =
            ProjectDirs::from("", "", "basket").context("Could not determine home directory")?;
        Self::with_data_dir(proj_dirs.data_dir().to_path_buf(), db_override)
    }

    fn with_data_dir(data_dir: PathBuf, db_override: Option<PathBuf>) -> Result<Self> {
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let db_path = db_override.unwrap_or_else(|| data_dir.join("basket.db"));
        tracing::debug!(db = %db_path.display(), "resolved configuration");

        Ok(Config { db_path, data_dir })
    }

    pub fn api_keys_path(&self) -> PathBuf {
        self.data_dir.join(API_KEYS_FILE)
    }

    /// Load the API key table. A missing file means no keys.
    pub fn load_sessions(&self) -> Result<ApiKeySessions> {
        let path = self.api_keys_path();
        if !path.exists() {
            return Ok(ApiKeySessions::new());
        }
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        ApiKeySessions::parse(&text).with_context(|| format!("Invalid {}", path.display()))
    }

    /// Generate a key for `user` and append it to the key table.
    pub fn create_api_key(&self, user: &UserId) -> Result<String> {
        if user.as_str().is_empty() || user.as_str().contains(char::is_whitespace) {
            bail!("User id must be non-empty and contain no whitespace");
        }

        let key = generate_key();
        let path = self.api_keys_path();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        writeln!(file, "{key} {user}").context("Failed to write API key file")?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                .context("Failed to set API key file permissions")?;
        }
        tracing::info!(%user, "created API key");
        Ok(key)
    }
}

fn generate_key() -> String {
    use rand::Rng;
    use std::fmt::Write;

    let bytes: [u8; 32] = rand::rng().random();
    bytes
        .iter()
        .fold(String::with_capacity(64), |mut acc: String, b| {
            let _ = write!(acc, "{b:02x}");
            acc
        })
}
