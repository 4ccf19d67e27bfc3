use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::AppError;

/// Store-assigned identity of a dog record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DogId(Uuid);

impl DogId {
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }
}

impl From<Uuid> for DogId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl FromStr for DogId {
    type Err = AppError;

    /// Malformed ids cannot name any record, so they surface as NotFound.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(DogId)
            .map_err(|_| AppError::NotFound)
    }
}

impl fmt::Display for DogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DogRecord {
    pub id: DogId,
    pub name: String,
    pub age_yr: Option<u32>,
    pub age_mo: Option<u32>,
    pub breed: String,
    pub location: String,
    pub image: String,
    pub description: Option<String>,
    pub adopted: bool,
    pub date_added: DateTime<Utc>,
}

impl DogRecord {
    pub fn age_display(&self) -> String {
        match (self.age_yr, self.age_mo) {
            (None, None) => "Unknown".to_string(),
            (Some(y), None) => plural(y, "year"),
            (None, Some(m)) => plural(m, "month"),
            (Some(y), Some(m)) => format!("{}, {}", plural(y, "year"), plural(m, "month")),
        }
    }

    pub fn date_added_display(&self) -> String {
        self.date_added.format("%B %-d, %Y").to_string()
    }

    pub fn date_added_rfc3339(&self) -> String {
        self.date_added.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

fn plural(n: u32, unit: &str) -> String {
    if n == 1 {
        format!("1 {}", unit)
    } else {
        format!("{} {}s", n, unit)
    }
}

/// Validated input for creating a record.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDog {
    pub name: String,
    pub age_yr: Option<u32>,
    pub age_mo: Option<u32>,
    pub breed: String,
    pub location: String,
    pub image: Option<String>,
    pub description: Option<String>,
    pub date_added: Option<DateTime<Utc>>,
}

impl NewDog {
    pub fn new(name: &str, breed: &str, location: &str) -> Self {
        Self {
            name: name.to_string(),
            age_yr: None,
            age_mo: None,
            breed: breed.to_string(),
            location: location.to_string(),
            image: None,
            description: None,
            date_added: None,
        }
    }
}

/// Partial update. `None` leaves a field untouched; for the nullable
/// columns `Some(None)` clears the value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DogUpdate {
    pub name: Option<String>,
    pub age_yr: Option<Option<u32>>,
    pub age_mo: Option<Option<u32>>,
    pub breed: Option<String>,
    pub location: Option<String>,
    /// `Some(None)` resets to the placeholder image.
    pub image: Option<Option<String>>,
    pub description: Option<Option<String>>,
    pub adopted: Option<bool>,
}

impl DogUpdate {
    pub fn is_empty(&self) -> bool {
        *self == DogUpdate::default()
    }

    /// Applies the update onto an existing record.
    pub fn apply(self, dog: &mut DogRecord, placeholder_image: &str) {
        if let Some(name) = self.name {
            dog.name = name;
        }
        if let Some(age_yr) = self.age_yr {
            dog.age_yr = age_yr;
        }
        if let Some(age_mo) = self.age_mo {
            dog.age_mo = age_mo;
        }
        if let Some(breed) = self.breed {
            dog.breed = breed;
        }
        if let Some(location) = self.location {
            dog.location = location;
        }
        if let Some(image) = self.image {
            dog.image = image.unwrap_or_else(|| placeholder_image.to_string());
        }
        if let Some(description) = self.description {
            dog.description = description;
        }
        if let Some(adopted) = self.adopted {
            dog.adopted = adopted;
        }
    }
}

// -- Form bodies --

/// Body of `POST /dogs`.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DogForm {
    pub name: Option<String>,
    #[serde(rename = "ageYr")]
    pub age_yr: Option<String>,
    #[serde(rename = "ageMo")]
    pub age_mo: Option<String>,
    pub breed: Option<String>,
    pub location: Option<String>,
    pub image: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "dateAdded")]
    pub date_added: Option<String>,
}

impl DogForm {
    pub fn validate(&self) -> Result<NewDog, AppError> {
        let age_yr = parse_age(self.age_yr.as_deref(), "ageYr")?;
        let age_mo = parse_months(self.age_mo.as_deref())?;

        let date_added = match non_empty(self.date_added.as_deref()) {
            None => None,
            Some(raw) => Some(parse_date(&raw)?),
        };

        Ok(NewDog {
            name: required(self.name.as_deref(), "name")?,
            age_yr,
            age_mo,
            breed: required(self.breed.as_deref(), "breed")?,
            location: required(self.location.as_deref(), "location")?,
            image: image_url(self.image.as_deref())?,
            description: non_empty(self.description.as_deref()),
            date_added,
        })
    }
}

/// Body of `PUT /dogs/{id}`. Absent fields are left unchanged.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DogEditForm {
    pub name: Option<String>,
    #[serde(rename = "ageYr")]
    pub age_yr: Option<String>,
    #[serde(rename = "ageMo")]
    pub age_mo: Option<String>,
    pub breed: Option<String>,
    pub location: Option<String>,
    pub image: Option<String>,
    pub description: Option<String>,
    pub adopted: Option<String>,
}

impl DogEditForm {
    pub fn validate(&self) -> Result<DogUpdate, AppError> {
        let adopted = match self.adopted.as_deref().map(str::trim) {
            None => None,
            Some("yes") | Some("true") | Some("on") => Some(true),
            Some("no") | Some("false") => Some(false),
            Some(other) => {
                return Err(AppError::MalformedInput(format!(
                    "adopted must be \"yes\" or \"no\", got \"{}\"",
                    other
                )))
            }
        };

        Ok(DogUpdate {
            name: present_required(self.name.as_deref(), "name")?,
            age_yr: match self.age_yr.as_deref() {
                None => None,
                raw => Some(parse_age(raw, "ageYr")?),
            },
            age_mo: match self.age_mo.as_deref() {
                None => None,
                raw => Some(parse_months(raw)?),
            },
            breed: present_required(self.breed.as_deref(), "breed")?,
            location: present_required(self.location.as_deref(), "location")?,
            image: match self.image.as_deref() {
                None => None,
                raw => Some(image_url(raw)?),
            },
            description: self.description.as_deref().map(|d| non_empty(Some(d))),
            adopted,
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn required(value: Option<&str>, field: &str) -> Result<String, AppError> {
    non_empty(value).ok_or_else(|| AppError::MalformedInput(format!("{} is required", field)))
}

/// For edits: absent means "keep", present-but-blank is rejected.
fn present_required(value: Option<&str>, field: &str) -> Result<Option<String>, AppError> {
    value.map(|v| required(Some(v), field)).transpose()
}

fn parse_age(value: Option<&str>, field: &str) -> Result<Option<u32>, AppError> {
    match non_empty(value) {
        None => Ok(None),
        Some(raw) => raw.parse::<u32>().map(Some).map_err(|_| {
            AppError::MalformedInput(format!("{} must be a whole number, got \"{}\"", field, raw))
        }),
    }
}

fn parse_months(value: Option<&str>) -> Result<Option<u32>, AppError> {
    match parse_age(value, "ageMo")? {
        Some(months) if months > 11 => Err(AppError::MalformedInput(
            "ageMo must be between 0 and 11".to_string(),
        )),
        months => Ok(months),
    }
}

fn image_url(value: Option<&str>) -> Result<Option<String>, AppError> {
    match non_empty(value) {
        None => Ok(None),
        Some(raw) => {
            let parsed = url::Url::parse(&raw)
                .map_err(|_| AppError::MalformedInput(format!("image is not a URL: {}", raw)))?;
            match parsed.scheme() {
                "http" | "https" => Ok(Some(raw)),
                _ => Err(AppError::MalformedInput(
                    "image must be an http(s) URL".to_string(),
                )),
            }
        }
    }
}

fn parse_date(raw: &str) -> Result<DateTime<Utc>, AppError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| {
            AppError::MalformedInput(format!("dateAdded must be YYYY-MM-DD, got \"{}\"", raw))
        })
}
