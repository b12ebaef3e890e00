use serde::{Deserialize, Serialize};

use crate::domain::{ExternalUuid, GroupId, Member, MemberId};

/// Payload sent to the remote service when creating a member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateMemberRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub team: String,
}

impl CreateMemberRequest {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
            .trim()
            .to_string()
    }
}

/// Canonical record returned by the server after a successful create.
///
/// Only `id` is mandatory; display fields the server omits keep their
/// provisional values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerMember {
    pub id: MemberId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_uuid: Option<ExternalUuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
}

impl ServerMember {
    pub fn confirmed(id: impl Into<String>) -> Self {
        Self {
            id: MemberId::new(id),
            external_uuid: None,
            full_name: None,
            email: None,
            role: None,
            team: None,
        }
    }

    /// Builds the confirmed member, taking server fields over provisional ones.
    pub fn into_member(self, provisional: &Member) -> Member {
        Member {
            id: self.id,
            full_name: self
                .full_name
                .unwrap_or_else(|| provisional.full_name.clone()),
            email: self.email.unwrap_or_else(|| provisional.email.clone()),
            role: self.role.unwrap_or_else(|| provisional.role.clone()),
            team: self.team.unwrap_or_else(|| provisional.team.clone()),
            external_uuid: self.external_uuid.or_else(|| provisional.external_uuid.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum RosterRequest {
    RemoveMember {
        member_id: MemberId,
    },
    ReassignMember {
        external_uuid: ExternalUuid,
        target_group_id: GroupId,
    },
    CreateMember(CreateMemberRequest),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provisional() -> Member {
        Member {
            id: MemberId::new("temp_1"),
            full_name: "New User".into(),
            email: "new@x.com".into(),
            role: "member".into(),
            team: "A".into(),
            external_uuid: None,
        }
    }

    #[test]
    fn server_member_keeps_provisional_fields_it_omits() {
        let member = ServerMember::confirmed("real-id").into_member(&provisional());
        assert_eq!(member.id, MemberId::new("real-id"));
        assert_eq!(member.full_name, "New User");
        assert_eq!(member.role, "member");
        assert!(member.external_uuid.is_none());
    }

    #[test]
    fn server_member_fields_win_over_provisional() {
        let server: ServerMember = serde_json::from_str(
            r#"{"id":"real-id","external_uuid":"u-9","role":"admin"}"#,
        )
        .expect("decode");
        let member = server.into_member(&provisional());
        assert_eq!(member.role, "admin");
        assert_eq!(member.external_uuid, Some(ExternalUuid::new("u-9")));
        assert_eq!(member.email, "new@x.com");
    }

    #[test]
    fn full_name_trims_missing_parts() {
        let request = CreateMemberRequest {
            first_name: " New ".into(),
            last_name: String::new(),
            email: "new@x.com".into(),
            role: None,
            team: String::new(),
        };
        assert_eq!(request.full_name(), "New");
    }

    #[test]
    fn roster_request_uses_tagged_encoding() {
        let request = RosterRequest::RemoveMember {
            member_id: MemberId::new("7"),
        };
        let encoded = serde_json::to_value(&request).expect("encode");
        assert_eq!(encoded["type"], "remove_member");
        assert_eq!(encoded["payload"]["member_id"], "7");
    }
}
