use crate::models::{Asset, Locator, MediaKind};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "assets")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub owner_id: String,
    pub kind: String,
    pub title: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    /// Tagged JSON of [`Locator`].
    #[sea_orm(column_type = "Text", nullable)]
    pub locator: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for Asset {
    type Error = String;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&model.id).map_err(|e| format!("bad id: {}", e))?;
        let owner_id =
            Uuid::parse_str(&model.owner_id).map_err(|e| format!("bad owner_id: {}", e))?;
        let kind: MediaKind = model.kind.parse()?;
        let locator = match model.locator {
            Some(raw) => Some(
                serde_json::from_str::<Locator>(&raw).map_err(|e| format!("bad locator: {}", e))?,
            ),
            None => None,
        };

        Ok(Asset {
            id,
            owner_id,
            kind,
            title: model.title,
            description: model.description,
            locator,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}

/// Serializes the locator column.
pub fn encode_locator(locator: Option<&Locator>) -> Result<Option<String>, String> {
    locator
        .map(|l| serde_json::to_string(l).map_err(|e| e.to_string()))
        .transpose()
}
