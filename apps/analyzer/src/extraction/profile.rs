use serde::{Serialize, Serializer};

/// Sentinel written for any field the reply did not supply.
pub const UNKNOWN: &str = "unknown";

/// A field value that is either known or explicitly unknown.
#[derive(Debug, Clone, PartialEq)]
pub enum Field<T> {
    Known(T),
    Unknown,
}

impl<T> Field<T> {
    pub fn is_known(&self) -> bool {
        matches!(self, Field::Known(_))
    }

    #[cfg(test)]
    pub fn known(&self) -> Option<&T> {
        match self {
            Field::Known(value) => Some(value),
            Field::Unknown => None,
        }
    }
}

impl<T> From<Option<T>> for Field<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Field::Unknown, Field::Known)
    }
}

impl<T: Serialize> Serialize for Field<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Field::Known(value) => value.serialize(serializer),
            Field::Unknown => serializer.serialize_str(UNKNOWN),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExperienceEntry {
    pub company: Option<String>,
    pub role: Option<String>,
    pub period: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EducationEntry {
    pub degree: Option<String>,
    pub institution: Option<String>,
    pub period: Option<String>,
}

/// Structured fields extracted from one resume. Validated once, at the reply
/// boundary, and stored as-is.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResumeProfile {
    pub name: Field<String>,
    pub email: Field<String>,
    pub phone: Field<String>,
    pub skills: Field<Vec<String>>,
    pub experience: Field<Vec<ExperienceEntry>>,
    pub education: Field<Vec<EducationEntry>>,
}

impl ResumeProfile {
    /// Name and email are what make an extraction trustworthy without review.
    pub fn has_required_fields(&self) -> bool {
        self.name.is_known() && self.email.is_known()
    }

    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if !self.name.is_known() {
            missing.push("name");
        }
        if !self.email.is_known() {
            missing.push("email");
        }
        if !self.phone.is_known() {
            missing.push("phone");
        }
        if !self.skills.is_known() {
            missing.push("skills");
        }
        if !self.experience.is_known() {
            missing.push("experience");
        }
        if !self.education.is_known() {
            missing.push("education");
        }
        missing
    }
}
