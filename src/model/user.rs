use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::role::RoleId;

pub type UserId = u64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct User {
    #[schema(example = 1)]
    pub id: UserId,
    #[schema(example = "jdoe")]
    pub username: String,
    /// Tag id printed on the card, used by readers to identify the holder.
    #[schema(example = "04A1B2C3")]
    pub rfid_code: String,
    #[schema(example = "John Doe")]
    pub full_name: String,
    #[schema(example = 3, nullable = true)]
    pub role_id: Option<RoleId>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub rfid_code: String,
    pub full_name: String,
    pub role_id: Option<RoleId>,
}
