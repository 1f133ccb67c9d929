// Shared fixtures for unit tests

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use crate::models::{
    Activity, ActivityType, Detector, Group, GroupEvent, GroupState, WorkflowEventData,
};

pub fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, 0).unwrap()
}

/// Time every fixture event happens at
pub fn event_time() -> DateTime<Utc> {
    at(2024, 5, 1, 12, 0)
}

pub fn group(id: i64) -> Group {
    Group {
        id: id.into(),
        project_id: 1.into(),
        organization_id: 1.into(),
        group_type: "error".to_string(),
        priority: None,
        assignee: None,
        first_seen: at(2024, 4, 1, 12, 0),
        times_seen: 1,
    }
}

pub fn group_event(group: Group) -> GroupEvent {
    GroupEvent {
        event_id: Uuid::new_v4(),
        group,
        occurrence: None,
        environment: None,
        level: None,
        tags: Default::default(),
        value: None,
        datetime: event_time(),
        group_state: GroupState::default(),
        has_reappeared: false,
        has_escalated: false,
    }
}

pub fn activity(group: Group) -> Activity {
    Activity {
        id: 900,
        group,
        activity_type: ActivityType::SetResolved,
        data: serde_json::Value::Null,
        datetime: event_time(),
    }
}

pub fn event_data(event: GroupEvent) -> WorkflowEventData {
    WorkflowEventData::Group(event)
}

pub fn error_detector() -> Detector {
    Detector::new(1, 1, "error")
}
