// Strongly typed identifiers for workflow engine entities
//
// Every configuration entity (workflows, detectors, condition groups, actions)
// and every piece of event context (projects, organizations, environments,
// issue groups) is keyed by a 64-bit integer primary key in the backing store.
// Wrapping each one in its own type means a `WorkflowId` can never be passed
// where a `DataConditionGroupId` is expected, which matters a great deal in a
// pipeline that juggles half a dozen kinds of ids at once.

use serde::{Deserialize, Serialize};

/// Declares an `i64` newtype identifier with the conversions every id needs.
///
/// ## Rust Learning Notes:
///
/// ### Declarative Macros
/// `macro_rules!` lets us stamp out the same struct and trait impls for each
/// identifier instead of copy-pasting them nine times. `$name:ident` captures
/// the type name and `$(#[$meta:meta])*` forwards doc comments.
///
/// ### `#[serde(transparent)]`
/// Serializes the newtype exactly like its inner `i64`, so JSON fixtures can
/// write `"id": 7` rather than `"id": [7]`.
macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            pub fn new(id: i64) -> Self {
                Self(id)
            }

            pub fn get(&self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_id!(
    /// Primary key of a [`Workflow`](super::Workflow)
    WorkflowId
);
entity_id!(
    /// Primary key of a [`Detector`](super::Detector)
    DetectorId
);
entity_id!(
    /// Primary key of an [`Action`](super::Action)
    ActionId
);
entity_id!(
    /// Primary key of a [`DataConditionGroup`](super::DataConditionGroup)
    DataConditionGroupId
);
entity_id!(
    /// Primary key of a [`DataCondition`](super::DataCondition)
    DataConditionId
);
entity_id!(ProjectId);
entity_id!(OrganizationId);
entity_id!(EnvironmentId);
entity_id!(
    /// Primary key of an issue group (the aggregate an event belongs to)
    GroupId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_serialize_as_plain_integers() {
        let id = WorkflowId::new(42);
        assert_eq!(serde_json::to_string(&id).unwrap(), "42");

        let parsed: DataConditionGroupId = serde_json::from_str("7").unwrap();
        assert_eq!(parsed, DataConditionGroupId(7));
        assert_eq!(parsed.to_string(), "7");
    }
}
