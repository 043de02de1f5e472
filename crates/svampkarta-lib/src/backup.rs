//! JSON backup export and import
//!
//! Backups written by any app version must keep loading, so import is
//! deliberately lenient: a byte-order mark and surrounding whitespace are
//! ignored, the marker list may be an array, an object keyed by id, or the
//! first array-valued field of the document, and entries that fail to parse
//! are skipped instead of failing the whole import.

use crate::category::CategoryOverrides;
use crate::{CarLocation, Category, CategorySet, Marker, MarkerStore, Result, SvampError};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const BACKUP_VERSION: &str = "1.0";
pub const APP_NAME: &str = "Min Svampkarta";

/// A full snapshot of the user's data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backup {
    pub version: String,
    /// RFC 3339 timestamp with millisecond precision
    pub export_date: String,
    pub markers: Vec<Marker>,
    pub car_location: Option<CarLocation>,
    #[serde(default)]
    pub custom_categories: Vec<Category>,
    #[serde(default)]
    pub removed_defaults: Vec<String>,
    pub app_name: String,
    /// Entries dropped while parsing
    #[serde(skip)]
    skipped: usize,
}

/// What an import changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// Markers found in the backup
    pub in_backup: usize,
    /// Markers that were new and got added
    pub added: usize,
    /// Entries that could not be read
    pub skipped: usize,
    /// Categories added or replaced
    pub categories_merged: usize,
    pub car_restored: bool,
}

impl Backup {
    /// Snapshot the current data
    pub fn new(
        markers: &MarkerStore,
        categories: &CategorySet,
        car_location: Option<CarLocation>,
        exported_at: DateTime<Utc>,
    ) -> Self {
        let CategoryOverrides {
            custom_categories,
            removed_defaults,
        } = categories.to_overrides();
        Self {
            version: BACKUP_VERSION.to_string(),
            export_date: exported_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            markers: markers.markers().to_vec(),
            car_location,
            custom_categories,
            removed_defaults,
            app_name: APP_NAME.to_string(),
            skipped: 0,
        }
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// When the backup was written, if the date is readable
    pub fn exported_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.export_date)
            .ok()
            .map(|date| date.with_timezone(&Utc))
    }

    /// Suggested file name for a backup written on `date`
    pub fn file_name(date: NaiveDate) -> String {
        format!("svampkartan-backup-{}.json", date.format("%Y-%m-%d"))
    }

    /// Read a backup file's contents
    pub fn parse(text: &str) -> Result<Self> {
        #[cfg(feature = "profiling")]
        profiling::scope!("backup::parse");

        let cleaned = text.trim_start_matches('\u{feff}').trim();
        let document: Value = serde_json::from_str(cleaned)?;
        let entries = locate_markers(&document)
            .ok_or_else(|| SvampError::InvalidBackup("no list of finds found".to_string()))?;

        let mut skipped = 0;
        let markers = parse_entries::<Marker>(entries, "marker", &mut skipped);

        let field = |name: &str| document.get(name).filter(|v| !v.is_null());
        let car_location = field("carLocation").and_then(|value| {
            serde_json::from_value(value.clone())
                .inspect_err(|e| tracing::warn!("Ignoring unreadable car location: {}", e))
                .ok()
        });
        let custom_categories = match field("customCategories").and_then(Value::as_array) {
            Some(entries) => parse_entries::<Category>(entries.clone(), "category", &mut skipped),
            None => Vec::new(),
        };
        let removed_defaults = field("removedDefaults")
            .and_then(Value::as_array)
            .map(|ids| {
                ids.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let text_field = |name: &str, default: &str| {
            field(name)
                .and_then(Value::as_str)
                .unwrap_or(default)
                .to_string()
        };

        let backup = Self {
            version: text_field("version", BACKUP_VERSION),
            export_date: text_field("exportDate", ""),
            markers,
            car_location,
            custom_categories,
            removed_defaults,
            app_name: text_field("appName", APP_NAME),
            skipped,
        };
        tracing::info!(
            "Parsed backup version {} with {} markers ({} entries skipped)",
            backup.version,
            backup.markers.len(),
            skipped
        );
        Ok(backup)
    }

    /// Merge this backup into the current data
    ///
    /// Existing markers are kept; a backup marker is added only when no marker
    /// with the same latitude, longitude and name exists. A car location in the
    /// backup replaces the current one. Custom categories replace entries with
    /// the same id or are appended; removed defaults are not re-applied.
    pub fn apply(
        self,
        markers: &mut MarkerStore,
        categories: &mut CategorySet,
        car_location: &mut Option<CarLocation>,
    ) -> ImportSummary {
        let mut summary = ImportSummary {
            in_backup: self.markers.len(),
            skipped: self.skipped,
            ..ImportSummary::default()
        };
        summary.added = markers.merge(self.markers);

        if let Some(car) = self.car_location {
            *car_location = Some(car);
            summary.car_restored = true;
        }

        summary.categories_merged = self.custom_categories.len();
        for category in self.custom_categories {
            categories.upsert(category);
        }

        tracing::info!(
            "Backup merged: {} of {} markers added, {} categories merged",
            summary.added,
            summary.in_backup,
            summary.categories_merged
        );
        summary
    }
}

/// Find the list of markers in a backup document
fn locate_markers(document: &Value) -> Option<Vec<Value>> {
    if let Value::Array(entries) = document {
        return Some(entries.clone());
    }
    let object = document.as_object()?;
    match object.get("markers") {
        Some(Value::Array(entries)) => Some(entries.clone()),
        Some(Value::Object(by_id)) => Some(by_id.values().cloned().collect()),
        _ => object.values().find_map(|value| value.as_array().cloned()),
    }
}

fn parse_entries<T: DeserializeOwned>(entries: Vec<Value>, kind: &str, skipped: &mut usize) -> Vec<T> {
    entries
        .into_iter()
        .enumerate()
        .filter_map(|(i, entry)| match serde_json::from_value(entry) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::warn!("Skipping unreadable {} #{} in backup: {}", kind, i, e);
                *skipped += 1;
                None
            }
        })
        .collect()
}
