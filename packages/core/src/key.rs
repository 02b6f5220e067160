//! Course, usage and definition identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Errors related to key parsing and validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// A key component contains characters outside the allowed set.
    InvalidComponent {
        component: String,
        part: &'static str,
        message: String,
    },
    /// The key string is malformed.
    InvalidKey { message: String },
}

impl fmt::Display for KeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyError::InvalidComponent {
                component,
                part,
                message,
            } => {
                write!(f, "invalid {} '{}': {}", part, component, message)
            }
            KeyError::InvalidKey { message } => {
                write!(f, "invalid key: {}", message)
            }
        }
    }
}

impl std::error::Error for KeyError {}

const COURSE_PREFIX: &str = "course-v1:";
const USAGE_PREFIX: &str = "block-v1:";

/// Validate a single key component.
///
/// Org, course and run allow `[A-Za-z0-9_.~-]`; block ids additionally
/// allow `:`, which the file layout maps to a directory separator.
fn validate_component(
    component: &str,
    part: &'static str,
    allow_colon: bool,
) -> Result<(), KeyError> {
    if component.is_empty() {
        return Err(KeyError::InvalidComponent {
            component: component.to_string(),
            part,
            message: "empty component".to_string(),
        });
    }

    for c in component.chars() {
        let allowed = c.is_alphanumeric()
            || matches!(c, '_' | '-' | '.' | '~')
            || (allow_colon && c == ':');
        if !allowed {
            return Err(KeyError::InvalidComponent {
                component: component.to_string(),
                part,
                message: format!("invalid character '{}'", c),
            });
        }
    }

    Ok(())
}

/// Identifies a course run.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct CourseKey {
    pub org: String,
    pub course: String,
    pub run: String,
}

impl CourseKey {
    pub fn new(
        org: impl Into<String>,
        course: impl Into<String>,
        run: impl Into<String>,
    ) -> Result<Self, KeyError> {
        let key = CourseKey {
            org: org.into(),
            course: course.into(),
            run: run.into(),
        };
        validate_component(&key.org, "org", false)?;
        validate_component(&key.course, "course", false)?;
        validate_component(&key.run, "run", false)?;
        Ok(key)
    }

    /// Parse `course-v1:{org}+{course}+{run}`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use olx_core::CourseKey;
    ///
    /// let key = CourseKey::parse("course-v1:edX+DemoX+2024").unwrap();
    /// assert_eq!(key.run, "2024");
    /// assert_eq!(key.to_string(), "course-v1:edX+DemoX+2024");
    /// ```
    pub fn parse(s: &str) -> Result<Self, KeyError> {
        let body = s
            .strip_prefix(COURSE_PREFIX)
            .ok_or_else(|| KeyError::InvalidKey {
                message: format!("'{}' does not start with '{}'", s, COURSE_PREFIX),
            })?;
        let parts: Vec<&str> = body.split('+').collect();
        match parts.as_slice() {
            [org, course, run] => CourseKey::new(*org, *course, *run),
            _ => Err(KeyError::InvalidKey {
                message: format!("'{}' must have exactly org+course+run", s),
            }),
        }
    }

    /// Build a usage key inside this course.
    pub fn make_usage_key(
        &self,
        block_type: impl Into<String>,
        block_id: impl Into<String>,
    ) -> Result<UsageKey, KeyError> {
        UsageKey::new(self.clone(), block_type, block_id)
    }
}

impl fmt::Display for CourseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}+{}+{}", COURSE_PREFIX, self.org, self.course, self.run)
    }
}

impl FromStr for CourseKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CourseKey::parse(s)
    }
}

/// Identifies one placement of a block inside a course.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct UsageKey {
    pub course_key: CourseKey,
    pub block_type: String,
    pub block_id: String,
}

impl UsageKey {
    pub fn new(
        course_key: CourseKey,
        block_type: impl Into<String>,
        block_id: impl Into<String>,
    ) -> Result<Self, KeyError> {
        let key = UsageKey {
            course_key,
            block_type: block_type.into(),
            block_id: block_id.into(),
        };
        validate_component(&key.block_type, "block type", false)?;
        validate_component(&key.block_id, "block id", true)?;
        Ok(key)
    }

    /// Parse `block-v1:{org}+{course}+{run}+type@{type}+block@{id}`.
    pub fn parse(s: &str) -> Result<Self, KeyError> {
        let body = s
            .strip_prefix(USAGE_PREFIX)
            .ok_or_else(|| KeyError::InvalidKey {
                message: format!("'{}' does not start with '{}'", s, USAGE_PREFIX),
            })?;
        let parts: Vec<&str> = body.split('+').collect();
        let [org, course, run, block_type, block_id] = parts.as_slice() else {
            return Err(KeyError::InvalidKey {
                message: format!("'{}' must have org+course+run+type@..+block@..", s),
            });
        };
        let block_type = block_type
            .strip_prefix("type@")
            .ok_or_else(|| KeyError::InvalidKey {
                message: format!("'{}' is missing 'type@'", s),
            })?;
        let block_id = block_id
            .strip_prefix("block@")
            .ok_or_else(|| KeyError::InvalidKey {
                message: format!("'{}' is missing 'block@'", s),
            })?;
        UsageKey::new(CourseKey::new(*org, *course, *run)?, block_type, block_id)
    }

    /// The key used by course policy files: `{block_type}/{block_id}`.
    pub fn policy_key(&self) -> String {
        format!("{}/{}", self.block_type, self.block_id)
    }

    /// The definition this usage points at when none was recorded explicitly.
    pub fn default_definition(&self) -> DefinitionId {
        DefinitionId::new(self.block_type.clone(), self.block_id.clone())
    }
}

impl fmt::Display for UsageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}+{}+{}+type@{}+block@{}",
            USAGE_PREFIX,
            self.course_key.org,
            self.course_key.course,
            self.course_key.run,
            self.block_type,
            self.block_id
        )
    }
}

impl FromStr for UsageKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UsageKey::parse(s)
    }
}

impl Serialize for UsageKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for UsageKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        UsageKey::parse(&s).map_err(serde::de::Error::custom)
    }
}

impl Serialize for CourseKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CourseKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        CourseKey::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Identifies an authored definition, independent of where it is placed.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DefinitionId {
    pub category: String,
    pub name: String,
}

impl DefinitionId {
    pub fn new(category: impl Into<String>, name: impl Into<String>) -> Self {
        DefinitionId {
            category: category.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for DefinitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.category, self.name)
    }
}

/// Stable identity of a learner.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        UserId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parse a usage key literal, panicking if it is invalid.
///
/// Intended for literals in tests and examples.
#[macro_export]
macro_rules! usage_key {
    ($s:expr) => {
        $crate::UsageKey::parse($s).expect("invalid usage key literal")
    };
}
