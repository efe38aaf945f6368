//! Messages exchanged with fleet management.
//!
//! Field order in these structs is the serialized order and must not change.

use serde::{Deserialize, Serialize};

/// Lifecycle transition that starts the drain protocol.
pub const EC2_INSTANCE_TERMINATING: &str = "autoscaling:EC2_INSTANCE_TERMINATING";

/// Registry status for a serving instance.
pub const STATUS_ALIVE: &str = "ALIVE";

/// Autoscaling lifecycle notification carried on the message queue.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct LifecycleMessage {
    pub auto_scaling_group_name: String,
    pub service: String,
    pub time: String,
    pub account_id: String,
    pub lifecycle_transition: String,
    pub request_id: String,
    pub lifecycle_action_token: String,
    #[serde(rename = "EC2InstanceId")]
    pub ec2_instance_id: String,
    pub lifecycle_hook_name: String,
}

impl LifecycleMessage {
    pub fn is_terminating(&self) -> bool {
        self.lifecycle_transition == EC2_INSTANCE_TERMINATING
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    pub host: String,
    pub port: u16,
}

/// Value stored in an instance's registry leaf node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAnnouncement {
    #[serde(rename = "serviceEndpoint")]
    pub service_endpoint: ServiceEndpoint,
    pub status: String,
}

impl ServiceAnnouncement {
    pub fn alive(host: impl Into<String>, port: u16) -> Self {
        Self {
            service_endpoint: ServiceEndpoint {
                host: host.into(),
                port,
            },
            status: STATUS_ALIVE.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_message_field_order() {
        let msg = LifecycleMessage {
            auto_scaling_group_name: "asg".into(),
            service: "AWS Auto Scaling".into(),
            time: "2016-01-01T00:00:00Z".into(),
            account_id: "123".into(),
            lifecycle_transition: EC2_INSTANCE_TERMINATING.into(),
            request_id: "req".into(),
            lifecycle_action_token: "tok".into(),
            ec2_instance_id: "i-1".into(),
            lifecycle_hook_name: "hook".into(),
        };
        let json = serde_json::to_string(&msg).expect("serialize");
        assert_eq!(
            json,
            r#"{"AutoScalingGroupName":"asg","Service":"AWS Auto Scaling","Time":"2016-01-01T00:00:00Z","AccountId":"123","LifecycleTransition":"autoscaling:EC2_INSTANCE_TERMINATING","RequestId":"req","LifecycleActionToken":"tok","EC2InstanceId":"i-1","LifecycleHookName":"hook"}"#
        );
        let back: LifecycleMessage = serde_json::from_str(&json).expect("parse");
        assert!(back.is_terminating());
    }

    #[test]
    fn test_lifecycle_message_tolerates_missing_fields() {
        let msg: LifecycleMessage =
            serde_json::from_str(r#"{"EC2InstanceId":"i-9","Event":"autoscaling:TEST_NOTIFICATION"}"#)
                .expect("parse");
        assert_eq!(msg.ec2_instance_id, "i-9");
        assert!(!msg.is_terminating());
    }

    #[test]
    fn test_announcement_bytes() {
        let json = serde_json::to_string(&ServiceAnnouncement::alive("10.0.0.5", 4430))
            .expect("serialize");
        assert_eq!(
            json,
            r#"{"serviceEndpoint":{"host":"10.0.0.5","port":4430},"status":"ALIVE"}"#
        );
    }
}
