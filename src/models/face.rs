use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

pub type FaceId = i64;
pub type PersonId = i64;

/// Who decided that a face belongs to a person.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PersonSource {
    /// Set by an explicit user action. Never touched by the engine.
    Manual,
    /// Set by clustering or nearest-neighbour propagation.
    Automatic,
}

impl PersonSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PersonSource::Manual => "manual",
            PersonSource::Automatic => "automatic",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "manual" => Some(PersonSource::Manual),
            "automatic" => Some(PersonSource::Automatic),
            _ => None,
        }
    }
}

impl ToSql for PersonSource {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for PersonSource {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        PersonSource::parse(s).ok_or_else(|| FromSqlError::Other(format!("unknown person source {s:?}").into()))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HiddenReason {
    /// Face box too small relative to the image to be useful.
    Small,
    Manual,
}

impl HiddenReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            HiddenReason::Small => "small",
            HiddenReason::Manual => "manual",
        }
    }
}

impl ToSql for HiddenReason {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for HiddenReason {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "small" => Ok(HiddenReason::Small),
            "manual" => Ok(HiddenReason::Manual),
            other => Err(FromSqlError::Other(format!("unknown hidden reason {other:?}").into())),
        }
    }
}

/// A person assignment. Person id and source only ever travel together, so a
/// face can't carry one without the other.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct PersonLabel {
    pub person_id: PersonId,
    pub source: PersonSource,
}

impl PersonLabel {
    pub fn manual(person_id: PersonId) -> Self {
        Self { person_id, source: PersonSource::Manual }
    }

    pub fn automatic(person_id: PersonId) -> Self {
        Self { person_id, source: PersonSource::Automatic }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct BoundingBox {
    pub top: i64,
    pub right: i64,
    pub bottom: i64,
    pub left: i64,
}

impl BoundingBox {
    pub fn width(&self) -> i64 {
        (self.right - self.left).max(0)
    }

    pub fn height(&self) -> i64 {
        (self.bottom - self.top).max(0)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Face {
    pub id: FaceId,
    pub image_id: i64,
    pub bbox: BoundingBox,
    #[serde(skip_serializing)]
    pub embedding: Option<Vec<f32>>,
    pub hidden: bool,
    pub hidden_reason: Option<HiddenReason>,
    pub label: Option<PersonLabel>,
}

impl Face {
    pub fn person_id(&self) -> Option<PersonId> {
        self.label.map(|l| l.person_id)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Person {
    pub id: PersonId,
    pub name: Option<String>,
    pub created_at: i64,
}

impl Person {
    /// Anonymous persons are placeholders the engine creates for clusters
    /// nobody has named yet.
    pub fn is_anonymous(&self) -> bool {
        self.name.as_deref().map_or(true, |n| n.trim().is_empty())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PersonSummary {
    pub id: PersonId,
    pub name: Option<String>,
    pub face_count: i64,
}

/// One face found by an embedder in an image.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_round_trips_through_text() {
        assert_eq!(PersonSource::parse("manual"), Some(PersonSource::Manual));
        assert_eq!(PersonSource::parse(PersonSource::Automatic.as_str()), Some(PersonSource::Automatic));
        assert_eq!(PersonSource::parse("MANUAL"), None);
    }

    #[test]
    fn blank_name_is_anonymous() {
        let p = Person { id: 1, name: Some("  ".into()), created_at: 0 };
        assert!(p.is_anonymous());
        let p = Person { id: 1, name: None, created_at: 0 };
        assert!(p.is_anonymous());
        let p = Person { id: 1, name: Some("Alice".into()), created_at: 0 };
        assert!(!p.is_anonymous());
    }

    #[test]
    fn source_serializes_lowercase() {
        let json = serde_json::to_string(&PersonLabel::automatic(4)).unwrap();
        assert_eq!(json, r#"{"person_id":4,"source":"automatic"}"#);
    }
}
