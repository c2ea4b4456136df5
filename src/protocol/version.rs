use std::path::Path;
use std::time::SystemTime;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::Result;

/// `date` layout: weekday, month, day, time, zone, year, e.g.
/// `Mon Jan  2 15:04:05 +03:00 2006`.
///
/// The zone is the local UTC offset, not an abbreviation such as `MSK`:
/// chrono renders `%Z` for [`Local`] as `%:z` since it carries no time zone
/// database.
const DATE_FORMAT: &str = "%a %b %e %H:%M:%S %Z %Y";

/// Static identity of a running service, answered to `info`.
///
/// `date` is left empty at construction and filled in by
/// [`with_executable_date`](Self::with_executable_date) each time the record
/// is served.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Version {
    pub subsystem: String,
    pub name: String,
    pub description: String,
    pub version: String,
    pub date: String,
}

impl Version {
    pub fn new(
        subsystem: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        // ---
        Self {
            subsystem: subsystem.into(),
            name: name.into(),
            description: description.into(),
            version: version.into(),
            date: String::new(),
        }
    }

    /// Copy of this record dated with the running executable's modification time.
    pub fn with_executable_date(&self) -> Result<Self> {
        // ---
        let path = std::env::current_exe()?;
        self.with_file_date(&path)
    }

    /// Copy of this record dated with `path`'s modification time.
    pub fn with_file_date(&self, path: &Path) -> Result<Self> {
        // ---
        let modified = std::fs::metadata(path)?.modified()?;
        Ok(Self {
            date: format_date(modified),
            ..self.clone()
        })
    }
}

fn format_date(time: SystemTime) -> String {
    DateTime::<Local>::from(time).format(DATE_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use std::time::Duration;

    #[test]
    fn serializes_with_capitalized_fields() {
        // ---
        let version = Version::new("audio", "tagger", "Tags releases", "1.2.0");
        let value = serde_json::to_value(&version).unwrap();
        assert_eq!(value["Subsystem"], "audio");
        assert_eq!(value["Version"], "1.2.0");
        assert_eq!(value["Date"], "");
    }

    #[test]
    fn date_follows_file_modification_time() {
        // ---
        let file = tempfile::NamedTempFile::new().unwrap();
        let version = Version::new("s", "n", "d", "v");

        let first = version.with_file_date(file.path()).unwrap();
        assert!(!first.date.is_empty());

        let later = SystemTime::now() + Duration::from_secs(3 * 24 * 3600);
        file.as_file().set_modified(later).unwrap();

        let second = version.with_file_date(file.path()).unwrap();
        assert_eq!(second.date, format_date(later));
        assert_ne!(first.date, second.date);
        assert!(version.date.is_empty(), "the template record stays undated");
    }

    #[test]
    fn date_zone_is_numeric_offset() {
        // ---
        let when = SystemTime::UNIX_EPOCH + Duration::from_secs(1_136_214_245);
        let date = format_date(when);
        let fields: Vec<&str> = date.split_whitespace().collect();

        assert_eq!(fields.len(), 6, "{date}");
        let zone = fields[4];
        assert!(zone.starts_with('+') || zone.starts_with('-'), "{date}");
        assert_eq!(zone.len(), "+03:00".len(), "{date}");
        assert_eq!(fields[5], "2006", "{date}");
    }

    #[test]
    fn running_executable_is_datable() {
        // ---
        let dated = Version::default().with_executable_date().unwrap();
        assert!(!dated.date.is_empty());
    }
}
