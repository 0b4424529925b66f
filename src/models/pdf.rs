use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Serialize, FromRow)]
pub struct PdfMeta {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: Option<String>,
    pub hash: String,
}
