use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Section {
    pub id: i64,
    pub name: String,
    pub owner: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewSection {
    #[validate(length(min = 5, max = 64))]
    pub name: String,
}
