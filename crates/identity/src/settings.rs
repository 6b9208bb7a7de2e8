use std::{
    env,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use tokio::{fs, sync::Mutex};

use crate::IdentityResult;

/// Key the logged-in profile is stored under.
pub const USER_STORAGE_KEY: &str = "user-storage";

/// Small JSON key-value file for state that survives restarts. A missing
/// file reads as empty.
#[derive(Debug)]
pub struct Settings {
    path: PathBuf,
    // serializes read-modify-write cycles within the process
    lock: Mutex<()>,
}

impl Settings {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// `SETTINGS_FILE`, defaulting to `settings.json`.
    pub fn from_env() -> Self {
        Self::new(env::var("SETTINGS_FILE").unwrap_or_else(|_| "settings.json".to_owned()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> IdentityResult<Map<String, Value>> {
        match fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(Map::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(why) if why.kind() == ErrorKind::NotFound => Ok(Map::new()),
            Err(why) => Err(why.into()),
        }
    }

    /// Writes a sibling temp file and renames it over the settings file, so
    /// readers never see a partial document.
    async fn write(&self, values: &Map<String, Value>) -> IdentityResult<()> {
        let mut temp = self.path.clone().into_os_string();
        temp.push(".tmp");
        let temp = PathBuf::from(temp);

        fs::write(&temp, serde_json::to_vec_pretty(values)?).await?;
        fs::rename(&temp, &self.path).await?;
        Ok(())
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> IdentityResult<Option<T>> {
        let _guard = self.lock.lock().await;
        match self.read().await?.remove(key) {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> IdentityResult<()> {
        let _guard = self.lock.lock().await;
        let mut values = self.read().await?;
        values.insert(key.to_owned(), serde_json::to_value(value)?);
        self.write(&values).await
    }

    pub async fn remove(&self, key: &str) -> IdentityResult<()> {
        let _guard = self.lock.lock().await;
        let mut values = self.read().await?;
        if values.remove(key).is_some() {
            self.write(&values).await?;
        }
        Ok(())
    }
}
