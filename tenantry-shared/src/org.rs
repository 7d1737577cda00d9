use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrganizationPlan {
    #[default]
    Free,
    Pro,
    Enterprise,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrganizationStatus {
    #[default]
    Active,
    Suspended,
    Deleted,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub owner_id: String,
    pub plan: OrganizationPlan,
    pub status: OrganizationStatus,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrganizationBody {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub plan: Option<OrganizationPlan>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_body_defaults() {
        let body: CreateOrganizationBody = serde_json::from_str(r#"{"name":"Acme"}"#).unwrap();
        assert_eq!(body.name, "Acme");
        assert_eq!(body.description, None);
        assert_eq!(body.plan, None);
    }

    #[test]
    fn test_organization_serializes_camel_case() {
        let org = Organization {
            id: "org-1".into(),
            name: "Acme".into(),
            description: None,
            owner_id: "user-1".into(),
            plan: OrganizationPlan::Pro,
            status: OrganizationStatus::Active,
            created_at: "2025-01-01T00:00:00Z".into(),
            updated_at: "2025-01-01T00:00:00Z".into(),
        };
        let json = serde_json::to_value(&org).unwrap();
        assert_eq!(json["ownerId"], "user-1");
        assert_eq!(json["plan"], "pro");
        assert_eq!(json["createdAt"], "2025-01-01T00:00:00Z");
    }
}
