use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub type DeviceId = u64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Device {
    #[schema(example = 7)]
    pub id: DeviceId,
    #[schema(example = "Warehouse gate B")]
    pub location: String,
}
