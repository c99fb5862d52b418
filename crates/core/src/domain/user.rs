use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::CoreError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Customer,
    Advisor,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Advisor => "advisor",
            Self::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "customer" => Some(Self::Customer),
            "advisor" => Some(Self::Advisor),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    pub fn is_staff(&self) -> bool {
        matches!(self, Self::Advisor | Self::Admin)
    }
}

/// The slice of the user directory the core needs: role and activity
/// lookups. Account management itself is an external collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub role: UserRole,
    pub active: bool,
}

#[async_trait]
pub trait StaffDirectory: Send + Sync {
    async fn find(&self, id: &UserId) -> Result<Option<UserProfile>, CoreError>;
}

#[derive(Default)]
pub struct InMemoryStaffDirectory {
    users: std::sync::Mutex<Vec<UserProfile>>,
}

impl InMemoryStaffDirectory {
    pub fn with_users(users: Vec<UserProfile>) -> Self {
        Self { users: std::sync::Mutex::new(users) }
    }

    pub fn add(&self, profile: UserProfile) {
        match self.users.lock() {
            Ok(mut users) => users.push(profile),
            Err(poisoned) => poisoned.into_inner().push(profile),
        }
    }
}

#[async_trait]
impl StaffDirectory for InMemoryStaffDirectory {
    async fn find(&self, id: &UserId) -> Result<Option<UserProfile>, CoreError> {
        let users = match self.users.lock() {
            Ok(users) => users,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(users.iter().find(|profile| &profile.id == id).cloned())
    }
}
