//! Gallery metadata catalog (`objects.json`) and file naming.

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// Published JPEG sizes (longest edge, pixels).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum Resolution {
    #[serde(rename = "25")]
    #[value(name = "25")]
    R25,
    #[serde(rename = "250")]
    #[value(name = "250")]
    R250,
    #[default]
    #[serde(rename = "500")]
    #[value(name = "500")]
    R500,
    #[serde(rename = "1000")]
    #[value(name = "1000")]
    R1000,
    #[serde(rename = "2000")]
    #[value(name = "2000")]
    R2000,
    #[serde(rename = "4000")]
    #[value(name = "4000")]
    R4000,
}

impl Resolution {
    /// Key used in the catalog's `jpg` map.
    pub fn key(&self) -> &'static str {
        match self {
            Resolution::R25 => "25",
            Resolution::R250 => "250",
            Resolution::R500 => "500",
            Resolution::R1000 => "1000",
            Resolution::R2000 => "2000",
            Resolution::R4000 => "4000",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Treat an explicit `null` like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// An explicit `null` name part is spelled `None`, the way the existing
/// shared image folders name those files.
fn null_as_none_literal<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Some(
        Option::<String>::deserialize(deserializer)?.unwrap_or_else(|| "None".to_string()),
    ))
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Person {
    /// `None` when the key is absent.
    #[serde(rename = "firstName", default, deserialize_with = "null_as_none_literal")]
    pub first_name: Option<String>,
    #[serde(rename = "familyName", default, deserialize_with = "null_as_none_literal")]
    pub family_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Multimedia {
    /// Resolution key to URL. Values are kept loose since some records
    /// carry nulls.
    #[serde(default, deserialize_with = "null_as_default")]
    pub jpg: HashMap<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GalleryObject {
    #[serde(rename = "objectId", default)]
    pub object_id: Option<Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub people: Vec<Person>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub multimedia: Vec<Multimedia>,
}

impl GalleryObject {
    pub fn has_images(&self) -> bool {
        !self.multimedia.is_empty()
    }

    fn object_id_str(&self) -> String {
        match &self.object_id {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => "unknown".to_string(),
        }
    }

    fn artist(&self) -> String {
        match self.people.first() {
            Some(person) => {
                let name = format!(
                    "{}_{}",
                    person.first_name.as_deref().unwrap_or_default(),
                    person.family_name.as_deref().unwrap_or_default()
                );
                sanitize_filename(name.trim_matches('_'), 30)
            }
            None => "Unknown".to_string(),
        }
    }
}

pub fn load_catalog(path: &Path) -> Result<Vec<GalleryObject>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read metadata {}", path.display()))?;
    let objects = serde_json::from_str(&content)
        .with_context(|| format!("Invalid metadata JSON in {}", path.display()))?;
    Ok(objects)
}

/// Keep alphanumerics, space, `.`, `_` and `-`, trim, and cap at
/// `max_length` characters. Empty input becomes `unknown`.
pub fn sanitize_filename(name: &str, max_length: usize) -> String {
    if name.is_empty() {
        return "unknown".to_string();
    }

    let safe: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '.' | '_' | '-'))
        .collect();
    safe.trim().chars().take(max_length).collect()
}

/// URL of the first image at `resolution` and the file name to store it as.
pub fn image_info(obj: &GalleryObject, resolution: Resolution) -> Option<(String, String)> {
    let media = obj.multimedia.first()?;
    let url = media
        .jpg
        .get(resolution.key())
        .and_then(Value::as_str)
        .filter(|u| !u.is_empty())?;

    let object_id = sanitize_filename(&obj.object_id_str(), 100);
    let filename = format!("{}_{}.jpg", obj.artist(), object_id);

    Some((url.to_string(), filename))
}
