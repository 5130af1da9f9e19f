use crate::entities::assets;
use crate::entities::prelude::Assets;
use crate::models::Asset;
use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("asset {0} not found")]
    NotFound(Uuid),

    #[error("database error: {0}")]
    Database(#[from] DbErr),

    #[error("asset {id} has a corrupt record: {reason}")]
    Corrupt { id: String, reason: String },
}

/// Persistence for asset records.
#[async_trait]
pub trait AssetRepository: Send + Sync {
    async fn create(&self, asset: &Asset) -> Result<(), RepositoryError>;

    async fn get(&self, id: Uuid) -> Result<Asset, RepositoryError>;

    /// Overwrites the mutable fields of an existing record.
    async fn update(&self, asset: &Asset) -> Result<(), RepositoryError>;

    async fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<Asset>, RepositoryError>;

    async fn ping(&self) -> Result<(), RepositoryError>;
}

pub struct SeaOrmAssetRepository {
    db: DatabaseConnection,
}

impl SeaOrmAssetRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    fn to_active(asset: &Asset) -> Result<assets::ActiveModel, RepositoryError> {
        let locator =
            assets::encode_locator(asset.locator.as_ref()).map_err(|reason| {
                RepositoryError::Corrupt {
                    id: asset.id.to_string(),
                    reason,
                }
            })?;

        Ok(assets::ActiveModel {
            id: Set(asset.id.to_string()),
            owner_id: Set(asset.owner_id.to_string()),
            kind: Set(asset.kind.as_str().to_string()),
            title: Set(asset.title.clone()),
            description: Set(asset.description.clone()),
            locator: Set(locator),
            created_at: Set(asset.created_at),
            updated_at: Set(asset.updated_at),
        })
    }

    fn from_model(model: assets::Model) -> Result<Asset, RepositoryError> {
        let id = model.id.clone();
        Asset::try_from(model).map_err(|reason| RepositoryError::Corrupt { id, reason })
    }
}

#[async_trait]
impl AssetRepository for SeaOrmAssetRepository {
    async fn create(&self, asset: &Asset) -> Result<(), RepositoryError> {
        Self::to_active(asset)?.insert(&self.db).await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Asset, RepositoryError> {
        let model = Assets::find_by_id(id.to_string())
            .one(&self.db)
            .await?
            .ok_or(RepositoryError::NotFound(id))?;
        Self::from_model(model)
    }

    async fn update(&self, asset: &Asset) -> Result<(), RepositoryError> {
        match Self::to_active(asset)?.update(&self.db).await {
            Ok(_) => Ok(()),
            Err(DbErr::RecordNotUpdated) => Err(RepositoryError::NotFound(asset.id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<Asset>, RepositoryError> {
        Assets::find()
            .filter(assets::Column::OwnerId.eq(owner_id.to_string()))
            .order_by_desc(assets::Column::CreatedAt)
            .all(&self.db)
            .await?
            .into_iter()
            .map(Self::from_model)
            .collect()
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        self.db.ping().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::run_migrations;
    use crate::models::{Locator, MediaKind};
    use chrono::Utc;
    use sea_orm::{ConnectOptions, Database};

    async fn repository() -> SeaOrmAssetRepository {
        let mut opt = ConnectOptions::new("sqlite::memory:");
        opt.max_connections(1).sqlx_logging(false);
        let db = Database::connect(opt).await.unwrap();
        run_migrations(&db).await.unwrap();
        SeaOrmAssetRepository::new(db)
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let repo = repository().await;
        let asset = Asset::new(Uuid::new_v4(), MediaKind::Video, "Boots".to_string(), None);

        repo.create(&asset).await.unwrap();
        let loaded = repo.get(asset.id).await.unwrap();

        assert_eq!(loaded.id, asset.id);
        assert_eq!(loaded.owner_id, asset.owner_id);
        assert_eq!(loaded.kind, MediaKind::Video);
        assert!(loaded.locator.is_none());
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let repo = repository().await;
        let id = Uuid::new_v4();
        assert!(matches!(repo.get(id).await, Err(RepositoryError::NotFound(missing)) if missing == id));
    }

    #[tokio::test]
    async fn test_update_persists_locator() {
        let repo = repository().await;
        let mut asset = Asset::new(Uuid::new_v4(), MediaKind::Video, "Boots".to_string(), None);
        repo.create(&asset).await.unwrap();

        asset.locator = Some(Locator::BucketKey {
            bucket: "tubely-media".to_string(),
            key: format!("videos/{}.mp4", asset.id),
        });
        asset.updated_at = Utc::now();
        repo.update(&asset).await.unwrap();

        let loaded = repo.get(asset.id).await.unwrap();
        assert_eq!(loaded.locator, asset.locator);
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let repo = repository().await;
        let asset = Asset::new(Uuid::new_v4(), MediaKind::Thumbnail, "Nope".to_string(), None);
        assert!(matches!(
            repo.update(&asset).await,
            Err(RepositoryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_by_owner_filters() {
        let repo = repository().await;
        let owner = Uuid::new_v4();
        for title in ["one", "two"] {
            repo.create(&Asset::new(owner, MediaKind::Video, title.to_string(), None))
                .await
                .unwrap();
        }
        repo.create(&Asset::new(Uuid::new_v4(), MediaKind::Video, "other".to_string(), None))
            .await
            .unwrap();

        let mine = repo.list_by_owner(owner).await.unwrap();
        assert_eq!(mine.len(), 2);
        assert!(mine.iter().all(|a| a.owner_id == owner));
    }

    #[tokio::test]
    async fn test_ping() {
        let repo = repository().await;
        repo.ping().await.unwrap();
    }
}
