//! YAML configuration files under `~/.config/ds`.
//!
//! A missing file is not an error: the default value is written in its place
//! (so operators get a template to edit) and returned.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{log_info, log_warn, Result, RpcError};

/// Directory, relative to the home directory, holding service config files.
pub const CONFIG_DIR: &str = ".config/ds";

/// Full path of `file_name` inside the user's config directory.
pub fn config_path(file_name: &str) -> Result<PathBuf> {
    // ---
    let home = dirs::home_dir()
        .ok_or_else(|| RpcError::Config("cannot determine home directory".into()))?;
    Ok(home.join(CONFIG_DIR).join(file_name))
}

/// Read `~/.config/ds/<file_name>`, creating it from `T::default()` if absent.
pub fn read_config<T>(file_name: &str) -> Result<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    read_config_from(config_path(file_name)?)
}

/// Read the YAML file at `path`, creating it from `T::default()` if absent.
///
/// # Errors
///
/// [`RpcError::Io`] when the file cannot be read or the default cannot be
/// written, [`RpcError::Yaml`] when the content does not describe a `T`.
pub fn read_config_from<T>(path: impl AsRef<Path>) -> Result<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    // ---
    let path = path.as_ref();

    match fs::read_to_string(path) {
        Ok(text) => {
            log_info!("config loaded from {}", path.display());
            Ok(serde_yaml::from_str(&text)?)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log_warn!("Config file {} does not exist", path.display());
            let config = T::default();
            write_default(path, &config)?;
            Ok(config)
        }
        Err(e) => Err(e.into()),
    }
}

fn write_default<T: Serialize>(path: &Path, config: &T) -> Result<()> {
    // ---
    let text = serde_yaml::to_string(config)?;

    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o640);
    }

    options.open(path)?.write_all(text.as_bytes())?;
    Ok(())
}
