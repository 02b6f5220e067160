//! User partitions and their groups.

use olx_core::{value_to_json, Value};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One bucket of learners.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: i64,
    pub name: String,
}

impl Group {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Group {
            id,
            name: name.into(),
        }
    }
}

/// A named set of mutually exclusive groups.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserPartition {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub groups: Vec<Group>,
    #[serde(default = "random_scheme")]
    pub scheme: String,
    #[serde(default = "active")]
    pub active: bool,
}

fn random_scheme() -> String {
    "random".to_string()
}

fn active() -> bool {
    true
}

impl UserPartition {
    pub fn new(id: i64, name: impl Into<String>, groups: Vec<Group>) -> Self {
        UserPartition {
            id,
            name: name.into(),
            description: String::new(),
            groups,
            scheme: random_scheme(),
            active: true,
        }
    }

    pub fn get_group(&self, id: i64) -> Option<&Group> {
        self.groups.iter().find(|group| group.id == id)
    }

    pub fn group_ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.groups.iter().map(|group| group.id)
    }

    /// Read a list of partitions from a `user_partitions` field value.
    pub fn list_from_value(value: &Value) -> Result<Vec<UserPartition>> {
        match value {
            Value::Null => Ok(Vec::new()),
            Value::List(_) => Ok(serde_json::from_value(value_to_json(value))?),
            other => Err(Error::InvalidPartition {
                message: format!("user_partitions must be a list, got {}", other.type_name()),
            }),
        }
    }

    /// The partition with `id`, if any.
    pub fn find(partitions: &[UserPartition], id: i64) -> Option<&UserPartition> {
        partitions.iter().find(|partition| partition.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use olx_core::json_to_value;

    #[test]
    fn parse_from_field_value() {
        let value = json_to_value(serde_json::json!([
            {"id": 0, "name": "Experiment", "groups": [{"id": 0, "name": "alpha"}, {"id": 1, "name": "beta"}]},
            {"id": 7, "name": "Cohorts", "description": "by cohort", "groups": [], "scheme": "cohort", "active": false}
        ]));

        let partitions = UserPartition::list_from_value(&value).unwrap();
        assert_eq!(partitions.len(), 2);
        assert_eq!(partitions[0].scheme, "random");
        assert!(partitions[0].active);
        assert_eq!(partitions[0].get_group(1).unwrap().name, "beta");
        assert!(partitions[0].get_group(2).is_none());
        assert_eq!(partitions[0].group_ids().collect::<Vec<_>>(), vec![0, 1]);
        assert!(!partitions[1].active);
        assert_eq!(UserPartition::find(&partitions, 7).unwrap().name, "Cohorts");
        assert!(UserPartition::find(&partitions, 3).is_none());
    }

    #[test]
    fn null_means_none() {
        assert!(UserPartition::list_from_value(&Value::Null).unwrap().is_empty());
    }

    #[test]
    fn rejects_non_lists() {
        assert!(matches!(
            UserPartition::list_from_value(&Value::from("x")),
            Err(Error::InvalidPartition { .. })
        ));
        let bad = json_to_value(serde_json::json!([{"id": "zero"}]));
        assert!(matches!(
            UserPartition::list_from_value(&bad),
            Err(Error::Json(_))
        ));
    }
}
