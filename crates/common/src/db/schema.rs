//! Table bootstrap from the entity definitions.
//!
//! Creation order follows the foreign keys. Every statement is
//! `IF NOT EXISTS`, so running it against an existing database is a no-op.

use crate::db::models::*;
use crate::errors::Result;
use sea_orm::{ConnectionTrait, DatabaseConnection, EntityTrait, Schema};
use tracing::info;

/// Create all Foodgram tables and indexes that do not exist yet
pub async fn create_schema(db: &DatabaseConnection) -> Result<()> {
    let schema = Schema::new(db.get_database_backend());

    create_table(db, &schema, UserEntity).await?;
    create_table(db, &schema, TagEntity).await?;
    create_table(db, &schema, IngredientEntity).await?;
    create_table(db, &schema, RecipeEntity).await?;
    create_table(db, &schema, RecipeIngredientEntity).await?;
    create_table(db, &schema, RecipeTagEntity).await?;
    create_table(db, &schema, FavoriteEntity).await?;
    create_table(db, &schema, ShoppingCartEntity).await?;
    create_table(db, &schema, FollowEntity).await?;

    info!("Database schema ready");
    Ok(())
}

async fn create_table<E>(db: &DatabaseConnection, schema: &Schema, entity: E) -> Result<()>
where
    E: EntityTrait,
{
    let backend = db.get_database_backend();

    let mut table = schema.create_table_from_entity(entity);
    table.if_not_exists();
    db.execute(backend.build(&table)).await?;

    for mut index in schema.create_index_from_entity(entity) {
        index.if_not_exists();
        db.execute(backend.build(&index)).await?;
    }

    Ok(())
}
