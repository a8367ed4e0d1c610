//! Repository pattern for database operations
//!
//! Provides a clean interface for all data access operations
//! with proper error handling and transaction support.

use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::{is_unique_violation, AppError, Membership, Result};
use crate::shopping_list::{CartIngredient, CartRecipe, ShoppingCartSource};
use crate::{MAX_AMOUNT, MAX_AMOUNT_SCALE, MIN_COOKING_TIME};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Expr, Func},
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, DbErr,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use tracing::{debug, info};
use uuid::Uuid;

/// Rows per statement when bulk loading reference data
const IMPORT_CHUNK_SIZE: usize = 500;

/// Data for registering a user
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
}

/// Data for creating a recipe
#[derive(Debug, Clone)]
pub struct NewRecipe {
    pub name: String,
    pub image: String,
    pub text: String,
    pub cooking_time: i32,
    /// (ingredient id, amount)
    pub ingredients: Vec<(Uuid, Decimal)>,
    pub tags: Vec<Uuid>,
}

/// Partial recipe update. `None` leaves the field untouched; a present
/// ingredient or tag list replaces the stored one.
#[derive(Debug, Clone, Default)]
pub struct RecipePatch {
    pub name: Option<String>,
    pub image: Option<String>,
    pub text: Option<String>,
    pub cooking_time: Option<i32>,
    pub ingredients: Option<Vec<(Uuid, Decimal)>>,
    pub tags: Option<Vec<Uuid>>,
}

/// Recipe list filters. All present filters must match.
#[derive(Debug, Clone, Default)]
pub struct RecipeFilter {
    /// Tag slugs; a recipe matches when it carries any of them
    pub tags: Vec<String>,
    pub author: Option<Uuid>,
    pub favorited_by: Option<Uuid>,
    pub in_cart_of: Option<Uuid>,
}

/// One page of results plus the total across all pages
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

impl<T> Page<T> {
    fn empty() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
        }
    }
}

/// A user as seen by the caller
#[derive(Debug, Clone)]
pub struct UserProfile {
    pub user: User,
    pub is_subscribed: bool,
}

/// An ingredient with the amount a recipe uses
#[derive(Debug, Clone)]
pub struct RecipeIngredientView {
    pub ingredient: Ingredient,
    pub amount: Decimal,
}

/// A recipe with everything its read representation needs
#[derive(Debug, Clone)]
pub struct RecipeDetails {
    pub recipe: Recipe,
    pub author: UserProfile,
    pub ingredients: Vec<RecipeIngredientView>,
    pub tags: Vec<Tag>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
}

impl NewRecipe {
    /// Check the invariants the database cannot express
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)?;
        validate_cooking_time(self.cooking_time)?;
        validate_ingredients(&self.ingredients)?;
        validate_tags(&self.tags)
    }
}

impl RecipePatch {
    /// Check the fields that are present
    pub fn validate(&self) -> Result<()> {
        if let Some(ref name) = self.name {
            validate_name(name)?;
        }
        if let Some(cooking_time) = self.cooking_time {
            validate_cooking_time(cooking_time)?;
        }
        if let Some(ref ingredients) = self.ingredients {
            validate_ingredients(ingredients)?;
        }
        if let Some(ref tags) = self.tags {
            validate_tags(tags)?;
        }
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(AppError::validation("name", "Recipe name must not be blank"));
    }
    Ok(())
}

fn validate_cooking_time(cooking_time: i32) -> Result<()> {
    if cooking_time < MIN_COOKING_TIME {
        return Err(AppError::validation(
            "cooking_time",
            format!("Cooking time must be at least {} minute", MIN_COOKING_TIME),
        ));
    }
    Ok(())
}

fn validate_ingredients(ingredients: &[(Uuid, Decimal)]) -> Result<()> {
    if ingredients.is_empty() {
        return Err(AppError::validation("ingredients", "At least one ingredient is required"));
    }
    for (id, amount) in ingredients {
        validate_amount(*id, *amount)?;
    }
    let duplicates = duplicates(ingredients.iter().map(|(id, _)| *id));
    if !duplicates.is_empty() {
        return Err(AppError::validation(
            "ingredients",
            format!("Ingredients must not repeat: {}", join_ids(&duplicates)),
        ));
    }
    Ok(())
}

fn validate_amount(id: Uuid, amount: Decimal) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(AppError::validation(
            "ingredients",
            format!("Amount of ingredient {} must be greater than zero", id),
        ));
    }
    if amount.normalize().scale() > MAX_AMOUNT_SCALE {
        return Err(AppError::validation(
            "ingredients",
            format!(
                "Amount of ingredient {} may have at most {} decimal places",
                id, MAX_AMOUNT_SCALE
            ),
        ));
    }
    if amount >= Decimal::from(MAX_AMOUNT) {
        return Err(AppError::validation(
            "ingredients",
            format!("Amount of ingredient {} must be less than {}", id, MAX_AMOUNT),
        ));
    }
    Ok(())
}

fn validate_tags(tags: &[Uuid]) -> Result<()> {
    if tags.is_empty() {
        return Err(AppError::validation("tags", "At least one tag is required"));
    }
    let duplicates = duplicates(tags.iter().copied());
    if !duplicates.is_empty() {
        return Err(AppError::validation(
            "tags",
            format!("Tags must not repeat: {}", join_ids(&duplicates)),
        ));
    }
    Ok(())
}

/// Values that occur more than once, in first-repeat order
fn duplicates<T, I>(items: I) -> Vec<T>
where
    T: Hash + Eq + Clone,
    I: IntoIterator<Item = T>,
{
    let mut seen = HashSet::new();
    let mut repeated = Vec::new();
    for item in items {
        if !seen.insert(item.clone()) && !repeated.contains(&item) {
            repeated.push(item);
        }
    }
    repeated
}

fn join_ids(ids: &[Uuid]) -> String {
    ids.iter().map(Uuid::to_string).collect::<Vec<_>>().join(", ")
}

/// Translate a uniqueness violation from a racing insert into a conflict
fn membership_conflict(err: DbErr, membership: Membership, id: Uuid) -> AppError {
    if is_unique_violation(&err) {
        AppError::AlreadyExists {
            membership,
            id: id.to_string(),
        }
    } else {
        err.into()
    }
}

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Get the write connection
    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }

    // ========================================================================
    // Health Check
    // ========================================================================

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    // ========================================================================
    // User Operations
    // ========================================================================

    /// Register a user. Email is stored lowercased.
    pub async fn create_user(&self, new_user: NewUser) -> Result<User> {
        let email = new_user.email.trim().to_lowercase();
        let username = new_user.username.trim().to_string();
        let conn = self.write_conn();

        let taken = UserEntity::find()
            .filter(
                Condition::any()
                    .add(UserColumn::Email.eq(email.as_str()))
                    .add(UserColumn::Username.eq(username.as_str())),
            )
            .one(conn)
            .await?;

        if let Some(existing) = taken {
            let message = if existing.email == email {
                "A user with this email already exists"
            } else {
                "A user with this username already exists"
            };
            return Err(AppError::Duplicate {
                message: message.to_string(),
            });
        }

        let user = UserActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(email),
            username: Set(username),
            first_name: Set(new_user.first_name),
            last_name: Set(new_user.last_name),
            password_hash: Set(new_user.password_hash),
            avatar: Set(None),
            created_at: Set(Utc::now().into()),
        };

        let user = user.insert(conn).await.map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Duplicate {
                    message: "A user with this email or username already exists".to_string(),
                }
            } else {
                e.into()
            }
        })?;

        info!(user_id = %user.id, username = %user.username, "User registered");
        Ok(user)
    }

    /// Find user by ID
    pub async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        UserEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Find user by email (case-insensitive)
    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        UserEntity::find()
            .filter(UserColumn::Email.eq(email.trim().to_lowercase()))
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Find user by ID or fail with `UserNotFound`
    pub async fn require_user(&self, id: Uuid) -> Result<User> {
        self.find_user_by_id(id)
            .await?
            .ok_or_else(|| AppError::UserNotFound { id: id.to_string() })
    }

    /// List users ordered by username
    pub async fn list_users(&self, page: u64, limit: u64) -> Result<Page<User>> {
        let paginator = UserEntity::find()
            .order_by_asc(UserColumn::Username)
            .paginate(self.read_conn(), limit);

        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page).await?;

        Ok(Page { items, total })
    }

    /// Set or clear the avatar
    pub async fn set_avatar(&self, user_id: Uuid, avatar: Option<String>) -> Result<User> {
        let mut user: UserActiveModel = self.require_user(user_id).await?.into();
        user.avatar = Set(avatar);
        user.update(self.write_conn()).await.map_err(Into::into)
    }

    /// Replace the stored password hash
    pub async fn set_password_hash(&self, user_id: Uuid, password_hash: String) -> Result<()> {
        let mut user: UserActiveModel = self.require_user(user_id).await?.into();
        user.password_hash = Set(password_hash);
        user.update(self.write_conn()).await?;
        Ok(())
    }

    /// Attach `is_subscribed` for `viewer` to each user
    pub async fn user_profiles(
        &self,
        users: Vec<User>,
        viewer: Option<Uuid>,
    ) -> Result<Vec<UserProfile>> {
        let ids: HashSet<Uuid> = users.iter().map(|user| user.id).collect();
        let subscribed = match viewer {
            Some(viewer) => self.subscribed_among(viewer, &ids).await?,
            None => HashSet::new(),
        };

        Ok(users
            .into_iter()
            .map(|user| UserProfile {
                is_subscribed: subscribed.contains(&user.id),
                user,
            })
            .collect())
    }

    /// Single-user variant of [`Repository::user_profiles`]
    pub async fn user_profile(&self, user: User, viewer: Option<Uuid>) -> Result<UserProfile> {
        let is_subscribed = match viewer {
            Some(viewer) => self.is_subscribed(viewer, user.id).await?,
            None => false,
        };
        Ok(UserProfile { user, is_subscribed })
    }

    // ========================================================================
    // Subscription Operations
    // ========================================================================

    /// Follow `author_id`. Returns the author.
    pub async fn subscribe(&self, follower_id: Uuid, author_id: Uuid) -> Result<User> {
        if follower_id == author_id {
            return Err(AppError::SelfFollow);
        }

        let author = self.require_user(author_id).await?;
        let conn = self.write_conn();

        if FollowEntity::find_by_id((follower_id, author_id))
            .one(conn)
            .await?
            .is_some()
        {
            return Err(AppError::AlreadyExists {
                membership: Membership::Subscription,
                id: author_id.to_string(),
            });
        }

        let follow = FollowActiveModel {
            user_id: Set(follower_id),
            author_id: Set(author_id),
            created_at: Set(Utc::now().into()),
        };

        FollowEntity::insert(follow)
            .exec_without_returning(conn)
            .await
            .map_err(|e| membership_conflict(e, Membership::Subscription, author_id))?;

        debug!(follower_id = %follower_id, author_id = %author_id, "Subscribed");
        Ok(author)
    }

    /// Stop following `author_id`
    pub async fn unsubscribe(&self, follower_id: Uuid, author_id: Uuid) -> Result<()> {
        if follower_id == author_id {
            return Err(AppError::SelfFollow);
        }

        self.require_user(author_id).await?;

        let result = FollowEntity::delete_by_id((follower_id, author_id))
            .exec(self.write_conn())
            .await?;

        if result.rows_affected == 0 {
            return Err(AppError::MembershipNotFound {
                membership: Membership::Subscription,
                id: author_id.to_string(),
            });
        }

        debug!(follower_id = %follower_id, author_id = %author_id, "Unsubscribed");
        Ok(())
    }

    /// Whether `follower_id` follows `author_id`
    pub async fn is_subscribed(&self, follower_id: Uuid, author_id: Uuid) -> Result<bool> {
        Ok(FollowEntity::find_by_id((follower_id, author_id))
            .one(self.read_conn())
            .await?
            .is_some())
    }

    /// Authors followed by `follower_id`, ordered by username
    pub async fn list_subscriptions(
        &self,
        follower_id: Uuid,
        page: u64,
        limit: u64,
    ) -> Result<Page<User>> {
        let conn = self.read_conn();

        let author_ids: Vec<Uuid> = FollowEntity::find()
            .select_only()
            .column(FollowColumn::AuthorId)
            .filter(FollowColumn::UserId.eq(follower_id))
            .into_tuple()
            .all(conn)
            .await?;

        if author_ids.is_empty() {
            return Ok(Page::empty());
        }

        let paginator = UserEntity::find()
            .filter(UserColumn::Id.is_in(author_ids))
            .order_by_asc(UserColumn::Username)
            .paginate(conn, limit);

        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page).await?;

        Ok(Page { items, total })
    }

    async fn subscribed_among(
        &self,
        follower_id: Uuid,
        author_ids: &HashSet<Uuid>,
    ) -> Result<HashSet<Uuid>> {
        if author_ids.is_empty() {
            return Ok(HashSet::new());
        }

        let ids: Vec<Uuid> = FollowEntity::find()
            .select_only()
            .column(FollowColumn::AuthorId)
            .filter(FollowColumn::UserId.eq(follower_id))
            .filter(FollowColumn::AuthorId.is_in(author_ids.iter().copied()))
            .into_tuple()
            .all(self.read_conn())
            .await?;

        Ok(ids.into_iter().collect())
    }

    // ========================================================================
    // Tag Operations
    // ========================================================================

    /// All tags ordered by name
    pub async fn list_tags(&self) -> Result<Vec<Tag>> {
        TagEntity::find()
            .order_by_asc(TagColumn::Name)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Find tag by ID
    pub async fn find_tag(&self, id: Uuid) -> Result<Option<Tag>> {
        TagEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Insert tags whose name and slug are both unused (case-insensitive).
    /// Returns how many were created.
    pub async fn import_tags(&self, tags: Vec<(String, String)>) -> Result<usize> {
        let conn = self.write_conn();

        let existing = TagEntity::find().all(conn).await?;
        let mut names: HashSet<String> = existing.iter().map(|tag| tag.name.to_lowercase()).collect();
        let mut slugs: HashSet<String> = existing.into_iter().map(|tag| tag.slug.to_lowercase()).collect();

        let mut fresh = Vec::new();
        for (name, slug) in tags {
            let name = name.trim().to_string();
            let slug = slug.trim().to_string();
            if name.is_empty()
                || slug.is_empty()
                || names.contains(&name.to_lowercase())
                || slugs.contains(&slug.to_lowercase())
            {
                continue;
            }
            names.insert(name.to_lowercase());
            slugs.insert(slug.to_lowercase());
            fresh.push(TagActiveModel {
                id: Set(Uuid::new_v4()),
                name: Set(name),
                slug: Set(slug),
            });
        }

        let created = fresh.len();
        let txn = conn.begin().await?;
        let mut rows = fresh.into_iter().peekable();
        while rows.peek().is_some() {
            let chunk: Vec<TagActiveModel> = rows.by_ref().take(IMPORT_CHUNK_SIZE).collect();
            TagEntity::insert_many(chunk)
                .exec_without_returning(&txn)
                .await?;
        }
        txn.commit().await?;

        info!(created, "Tags imported");
        Ok(created)
    }

    // ========================================================================
    // Ingredient Operations
    // ========================================================================

    /// Ingredients whose name starts with `prefix` (case-insensitive), ordered by name
    pub async fn search_ingredients(&self, prefix: Option<&str>) -> Result<Vec<Ingredient>> {
        let mut query = IngredientEntity::find();

        if let Some(prefix) = prefix.map(str::trim).filter(|p| !p.is_empty()) {
            let pattern = format!("{}%", prefix.to_lowercase());
            query = query.filter(
                Expr::expr(Func::lower(Expr::col(IngredientColumn::Name))).like(pattern),
            );
        }

        query
            .order_by_asc(IngredientColumn::Name)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Find ingredient by ID
    pub async fn find_ingredient(&self, id: Uuid) -> Result<Option<Ingredient>> {
        IngredientEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Insert ingredients not yet present (case-insensitive name and unit).
    /// Returns how many were created.
    pub async fn import_ingredients(&self, ingredients: Vec<(String, String)>) -> Result<usize> {
        let conn = self.write_conn();

        let mut known: HashSet<(String, String)> = IngredientEntity::find()
            .all(conn)
            .await?
            .into_iter()
            .map(|i| (i.name.to_lowercase(), i.measurement_unit.to_lowercase()))
            .collect();

        let mut fresh = Vec::new();
        for (name, unit) in ingredients {
            let name = name.trim().to_string();
            let unit = unit.trim().to_string();
            if name.is_empty() || !known.insert((name.to_lowercase(), unit.to_lowercase())) {
                continue;
            }
            fresh.push(IngredientActiveModel {
                id: Set(Uuid::new_v4()),
                name: Set(name),
                measurement_unit: Set(unit),
            });
        }

        let created = fresh.len();
        let txn = conn.begin().await?;
        let mut rows = fresh.into_iter().peekable();
        while rows.peek().is_some() {
            let chunk: Vec<IngredientActiveModel> = rows.by_ref().take(IMPORT_CHUNK_SIZE).collect();
            IngredientEntity::insert_many(chunk)
                .exec_without_returning(&txn)
                .await?;
        }
        txn.commit().await?;

        info!(created, "Ingredients imported");
        Ok(created)
    }

    // ========================================================================
    // Recipe Operations
    // ========================================================================

    /// Find recipe by ID
    pub async fn find_recipe(&self, id: Uuid) -> Result<Option<Recipe>> {
        RecipeEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Find recipe by ID or fail with `RecipeNotFound`
    pub async fn require_recipe(&self, id: Uuid) -> Result<Recipe> {
        self.find_recipe(id)
            .await?
            .ok_or_else(|| AppError::RecipeNotFound { id: id.to_string() })
    }

    /// Create a recipe with its ingredients and tags in one transaction
    pub async fn create_recipe(&self, author_id: Uuid, new_recipe: NewRecipe) -> Result<Recipe> {
        new_recipe.validate()?;
        self.ensure_ingredients_exist(&new_recipe.ingredients).await?;
        self.ensure_tags_exist(&new_recipe.tags).await?;

        let now = Utc::now();
        let txn = self.write_conn().begin().await?;

        let recipe = RecipeActiveModel {
            id: Set(Uuid::new_v4()),
            author_id: Set(author_id),
            name: Set(new_recipe.name.trim().to_string()),
            image: Set(new_recipe.image),
            text: Set(new_recipe.text),
            cooking_time: Set(new_recipe.cooking_time),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        }
        .insert(&txn)
        .await?;

        replace_ingredients(&txn, recipe.id, &new_recipe.ingredients).await?;
        replace_tags(&txn, recipe.id, &new_recipe.tags).await?;

        txn.commit().await?;

        info!(recipe_id = %recipe.id, author_id = %author_id, "Recipe created");
        Ok(recipe)
    }

    /// Apply a patch to a recipe owned by `editor_id`
    pub async fn update_recipe(
        &self,
        recipe_id: Uuid,
        editor_id: Uuid,
        patch: RecipePatch,
    ) -> Result<Recipe> {
        let existing = self.require_recipe(recipe_id).await?;
        if existing.author_id != editor_id {
            return Err(AppError::NotRecipeAuthor {
                id: recipe_id.to_string(),
            });
        }

        patch.validate()?;
        if let Some(ref ingredients) = patch.ingredients {
            self.ensure_ingredients_exist(ingredients).await?;
        }
        if let Some(ref tags) = patch.tags {
            self.ensure_tags_exist(tags).await?;
        }

        let txn = self.write_conn().begin().await?;

        let mut recipe: RecipeActiveModel = existing.into();
        if let Some(name) = patch.name {
            recipe.name = Set(name.trim().to_string());
        }
        if let Some(image) = patch.image {
            recipe.image = Set(image);
        }
        if let Some(text) = patch.text {
            recipe.text = Set(text);
        }
        if let Some(cooking_time) = patch.cooking_time {
            recipe.cooking_time = Set(cooking_time);
        }
        recipe.updated_at = Set(Utc::now().into());

        let recipe = recipe.update(&txn).await?;

        if let Some(ref ingredients) = patch.ingredients {
            replace_ingredients(&txn, recipe_id, ingredients).await?;
        }
        if let Some(ref tags) = patch.tags {
            replace_tags(&txn, recipe_id, tags).await?;
        }

        txn.commit().await?;

        info!(recipe_id = %recipe_id, "Recipe updated");
        Ok(recipe)
    }

    /// Delete a recipe owned by `editor_id` together with its associations
    /// and every favorite and cart entry pointing at it
    pub async fn delete_recipe(&self, recipe_id: Uuid, editor_id: Uuid) -> Result<()> {
        let existing = self.require_recipe(recipe_id).await?;
        if existing.author_id != editor_id {
            return Err(AppError::NotRecipeAuthor {
                id: recipe_id.to_string(),
            });
        }

        let txn = self.write_conn().begin().await?;

        RecipeIngredientEntity::delete_many()
            .filter(RecipeIngredientColumn::RecipeId.eq(recipe_id))
            .exec(&txn)
            .await?;
        RecipeTagEntity::delete_many()
            .filter(RecipeTagColumn::RecipeId.eq(recipe_id))
            .exec(&txn)
            .await?;
        FavoriteEntity::delete_many()
            .filter(FavoriteColumn::RecipeId.eq(recipe_id))
            .exec(&txn)
            .await?;
        ShoppingCartEntity::delete_many()
            .filter(ShoppingCartColumn::RecipeId.eq(recipe_id))
            .exec(&txn)
            .await?;
        RecipeEntity::delete_by_id(recipe_id).exec(&txn).await?;

        txn.commit().await?;

        info!(recipe_id = %recipe_id, "Recipe deleted");
        Ok(())
    }

    /// List recipes newest first
    pub async fn list_recipes(
        &self,
        filter: &RecipeFilter,
        page: u64,
        limit: u64,
    ) -> Result<Page<Recipe>> {
        let conn = self.read_conn();
        let mut query = RecipeEntity::find();

        if let Some(author) = filter.author {
            query = query.filter(RecipeColumn::AuthorId.eq(author));
        }

        let mut allowed: Option<HashSet<Uuid>> = None;

        if !filter.tags.is_empty() {
            let tag_ids: Vec<Uuid> = TagEntity::find()
                .select_only()
                .column(TagColumn::Id)
                .filter(TagColumn::Slug.is_in(filter.tags.iter().cloned()))
                .into_tuple()
                .all(conn)
                .await?;

            let tagged: Vec<Uuid> = if tag_ids.is_empty() {
                Vec::new()
            } else {
                RecipeTagEntity::find()
                    .select_only()
                    .column(RecipeTagColumn::RecipeId)
                    .filter(RecipeTagColumn::TagId.is_in(tag_ids))
                    .into_tuple()
                    .all(conn)
                    .await?
            };
            allowed = Some(narrow(allowed, tagged));
        }

        if let Some(user_id) = filter.favorited_by {
            let favorited: Vec<Uuid> = FavoriteEntity::find()
                .select_only()
                .column(FavoriteColumn::RecipeId)
                .filter(FavoriteColumn::UserId.eq(user_id))
                .into_tuple()
                .all(conn)
                .await?;
            allowed = Some(narrow(allowed, favorited));
        }

        if let Some(user_id) = filter.in_cart_of {
            let carted: Vec<Uuid> = ShoppingCartEntity::find()
                .select_only()
                .column(ShoppingCartColumn::RecipeId)
                .filter(ShoppingCartColumn::UserId.eq(user_id))
                .into_tuple()
                .all(conn)
                .await?;
            allowed = Some(narrow(allowed, carted));
        }

        if let Some(ids) = allowed {
            if ids.is_empty() {
                return Ok(Page::empty());
            }
            query = query.filter(RecipeColumn::Id.is_in(ids));
        }

        let paginator = query
            .order_by_desc(RecipeColumn::CreatedAt)
            .order_by_asc(RecipeColumn::Id)
            .paginate(conn, limit);

        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page).await?;

        Ok(Page { items, total })
    }

    /// Newest recipes of an author, at most `limit` when given
    pub async fn recipes_by_author(&self, author_id: Uuid, limit: Option<u64>) -> Result<Vec<Recipe>> {
        let mut query = RecipeEntity::find()
            .filter(RecipeColumn::AuthorId.eq(author_id))
            .order_by_desc(RecipeColumn::CreatedAt);

        if let Some(limit) = limit {
            query = query.limit(limit);
        }

        query.all(self.read_conn()).await.map_err(Into::into)
    }

    /// Number of recipes an author has published
    pub async fn count_recipes_by_author(&self, author_id: Uuid) -> Result<u64> {
        RecipeEntity::find()
            .filter(RecipeColumn::AuthorId.eq(author_id))
            .count(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Load a single recipe with details for `viewer`
    pub async fn recipe_detail(&self, recipe_id: Uuid, viewer: Option<Uuid>) -> Result<RecipeDetails> {
        let recipe = self.require_recipe(recipe_id).await?;
        self.recipe_details(vec![recipe], viewer)
            .await?
            .pop()
            .ok_or_else(|| AppError::RecipeNotFound {
                id: recipe_id.to_string(),
            })
    }

    /// Load authors, ingredients, tags and viewer flags for a batch of recipes.
    ///
    /// Issues a fixed number of queries regardless of the batch size and keeps
    /// the input order.
    pub async fn recipe_details(
        &self,
        recipes: Vec<Recipe>,
        viewer: Option<Uuid>,
    ) -> Result<Vec<RecipeDetails>> {
        if recipes.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.read_conn();
        let recipe_ids: Vec<Uuid> = recipes.iter().map(|recipe| recipe.id).collect();
        let author_ids: HashSet<Uuid> = recipes.iter().map(|recipe| recipe.author_id).collect();

        let authors: HashMap<Uuid, User> = UserEntity::find()
            .filter(UserColumn::Id.is_in(author_ids.iter().copied()))
            .all(conn)
            .await?
            .into_iter()
            .map(|user| (user.id, user))
            .collect();

        let mut ingredients: HashMap<Uuid, Vec<RecipeIngredientView>> = HashMap::new();
        let rows = RecipeIngredientEntity::find()
            .filter(RecipeIngredientColumn::RecipeId.is_in(recipe_ids.clone()))
            .find_also_related(IngredientEntity)
            .all(conn)
            .await?;
        for (link, ingredient) in rows {
            if let Some(ingredient) = ingredient {
                ingredients
                    .entry(link.recipe_id)
                    .or_default()
                    .push(RecipeIngredientView {
                        ingredient,
                        amount: link.amount.normalize(),
                    });
            }
        }

        let mut tags: HashMap<Uuid, Vec<Tag>> = HashMap::new();
        let rows = RecipeTagEntity::find()
            .filter(RecipeTagColumn::RecipeId.is_in(recipe_ids.clone()))
            .find_also_related(TagEntity)
            .all(conn)
            .await?;
        for (link, tag) in rows {
            if let Some(tag) = tag {
                tags.entry(link.recipe_id).or_default().push(tag);
            }
        }

        let (subscribed, favorited, in_cart) = match viewer {
            Some(viewer) => (
                self.subscribed_among(viewer, &author_ids).await?,
                self.favorited_among(viewer, &recipe_ids).await?,
                self.in_cart_among(viewer, &recipe_ids).await?,
            ),
            None => (HashSet::new(), HashSet::new(), HashSet::new()),
        };

        recipes
            .into_iter()
            .map(|recipe| {
                let author = authors.get(&recipe.author_id).cloned().ok_or_else(|| {
                    AppError::Internal {
                        message: format!("Author {} of recipe {} is missing", recipe.author_id, recipe.id),
                    }
                })?;

                let mut recipe_ingredients = ingredients.remove(&recipe.id).unwrap_or_default();
                recipe_ingredients.sort_by(|a, b| a.ingredient.name.cmp(&b.ingredient.name));

                let mut recipe_tags = tags.remove(&recipe.id).unwrap_or_default();
                recipe_tags.sort_by(|a, b| a.name.cmp(&b.name));

                Ok(RecipeDetails {
                    author: UserProfile {
                        is_subscribed: subscribed.contains(&author.id),
                        user: author,
                    },
                    ingredients: recipe_ingredients,
                    tags: recipe_tags,
                    is_favorited: favorited.contains(&recipe.id),
                    is_in_shopping_cart: in_cart.contains(&recipe.id),
                    recipe,
                })
            })
            .collect()
    }

    async fn ensure_ingredients_exist(&self, items: &[(Uuid, Decimal)]) -> Result<()> {
        let ids: Vec<Uuid> = items.iter().map(|(id, _)| *id).collect();
        let found: HashSet<Uuid> = IngredientEntity::find()
            .select_only()
            .column(IngredientColumn::Id)
            .filter(IngredientColumn::Id.is_in(ids.clone()))
            .into_tuple::<Uuid>()
            .all(self.write_conn())
            .await?
            .into_iter()
            .collect();

        let missing: Vec<Uuid> = ids.into_iter().filter(|id| !found.contains(id)).collect();
        if !missing.is_empty() {
            return Err(AppError::validation(
                "ingredients",
                format!("Unknown ingredients: {}", join_ids(&missing)),
            ));
        }
        Ok(())
    }

    async fn ensure_tags_exist(&self, ids: &[Uuid]) -> Result<()> {
        let found: HashSet<Uuid> = TagEntity::find()
            .select_only()
            .column(TagColumn::Id)
            .filter(TagColumn::Id.is_in(ids.iter().copied()))
            .into_tuple::<Uuid>()
            .all(self.write_conn())
            .await?
            .into_iter()
            .collect();

        let missing: Vec<Uuid> = ids.iter().copied().filter(|id| !found.contains(id)).collect();
        if !missing.is_empty() {
            return Err(AppError::validation(
                "tags",
                format!("Unknown tags: {}", join_ids(&missing)),
            ));
        }
        Ok(())
    }

    // ========================================================================
    // Favorite Operations
    // ========================================================================

    /// Add a recipe to favorites. Returns the recipe.
    pub async fn add_favorite(&self, user_id: Uuid, recipe_id: Uuid) -> Result<Recipe> {
        let recipe = self.require_recipe(recipe_id).await?;
        let conn = self.write_conn();

        if FavoriteEntity::find_by_id((user_id, recipe_id))
            .one(conn)
            .await?
            .is_some()
        {
            return Err(AppError::AlreadyExists {
                membership: Membership::Favorite,
                id: recipe_id.to_string(),
            });
        }

        let entry = FavoriteActiveModel {
            user_id: Set(user_id),
            recipe_id: Set(recipe_id),
            created_at: Set(Utc::now().into()),
        };

        FavoriteEntity::insert(entry)
            .exec_without_returning(conn)
            .await
            .map_err(|e| membership_conflict(e, Membership::Favorite, recipe_id))?;

        debug!(user_id = %user_id, recipe_id = %recipe_id, "Favorite added");
        Ok(recipe)
    }

    /// Remove a recipe from favorites
    pub async fn remove_favorite(&self, user_id: Uuid, recipe_id: Uuid) -> Result<()> {
        self.require_recipe(recipe_id).await?;

        let result = FavoriteEntity::delete_by_id((user_id, recipe_id))
            .exec(self.write_conn())
            .await?;

        if result.rows_affected == 0 {
            return Err(AppError::MembershipNotFound {
                membership: Membership::Favorite,
                id: recipe_id.to_string(),
            });
        }

        debug!(user_id = %user_id, recipe_id = %recipe_id, "Favorite removed");
        Ok(())
    }

    async fn favorited_among(&self, user_id: Uuid, recipe_ids: &[Uuid]) -> Result<HashSet<Uuid>> {
        let ids: Vec<Uuid> = FavoriteEntity::find()
            .select_only()
            .column(FavoriteColumn::RecipeId)
            .filter(FavoriteColumn::UserId.eq(user_id))
            .filter(FavoriteColumn::RecipeId.is_in(recipe_ids.iter().copied()))
            .into_tuple()
            .all(self.read_conn())
            .await?;

        Ok(ids.into_iter().collect())
    }

    // ========================================================================
    // Shopping Cart Operations
    // ========================================================================

    /// Add a recipe to the shopping cart. Returns the recipe.
    pub async fn add_to_cart(&self, user_id: Uuid, recipe_id: Uuid) -> Result<Recipe> {
        let recipe = self.require_recipe(recipe_id).await?;
        let conn = self.write_conn();

        if ShoppingCartEntity::find_by_id((user_id, recipe_id))
            .one(conn)
            .await?
            .is_some()
        {
            return Err(AppError::AlreadyExists {
                membership: Membership::ShoppingCart,
                id: recipe_id.to_string(),
            });
        }

        let entry = ShoppingCartActiveModel {
            user_id: Set(user_id),
            recipe_id: Set(recipe_id),
            created_at: Set(Utc::now().into()),
        };

        ShoppingCartEntity::insert(entry)
            .exec_without_returning(conn)
            .await
            .map_err(|e| membership_conflict(e, Membership::ShoppingCart, recipe_id))?;

        debug!(user_id = %user_id, recipe_id = %recipe_id, "Added to shopping cart");
        Ok(recipe)
    }

    /// Remove a recipe from the shopping cart
    pub async fn remove_from_cart(&self, user_id: Uuid, recipe_id: Uuid) -> Result<()> {
        self.require_recipe(recipe_id).await?;

        let result = ShoppingCartEntity::delete_by_id((user_id, recipe_id))
            .exec(self.write_conn())
            .await?;

        if result.rows_affected == 0 {
            return Err(AppError::MembershipNotFound {
                membership: Membership::ShoppingCart,
                id: recipe_id.to_string(),
            });
        }

        debug!(user_id = %user_id, recipe_id = %recipe_id, "Removed from shopping cart");
        Ok(())
    }

    async fn in_cart_among(&self, user_id: Uuid, recipe_ids: &[Uuid]) -> Result<HashSet<Uuid>> {
        let ids: Vec<Uuid> = ShoppingCartEntity::find()
            .select_only()
            .column(ShoppingCartColumn::RecipeId)
            .filter(ShoppingCartColumn::UserId.eq(user_id))
            .filter(ShoppingCartColumn::RecipeId.is_in(recipe_ids.iter().copied()))
            .into_tuple()
            .all(self.read_conn())
            .await?;

        Ok(ids.into_iter().collect())
    }
}

#[async_trait]
impl ShoppingCartSource for Repository {
    async fn cart_recipes(&self, user_id: Uuid) -> Result<Vec<CartRecipe>> {
        let conn = self.read_conn();

        let recipe_ids: Vec<Uuid> = ShoppingCartEntity::find()
            .select_only()
            .column(ShoppingCartColumn::RecipeId)
            .filter(ShoppingCartColumn::UserId.eq(user_id))
            .into_tuple()
            .all(conn)
            .await?;

        if recipe_ids.is_empty() {
            return Ok(Vec::new());
        }

        let recipes = RecipeEntity::find()
            .filter(RecipeColumn::Id.is_in(recipe_ids.clone()))
            .find_also_related(UserEntity)
            .all(conn)
            .await?;

        let mut ingredients: HashMap<Uuid, Vec<CartIngredient>> = HashMap::new();
        let rows = RecipeIngredientEntity::find()
            .filter(RecipeIngredientColumn::RecipeId.is_in(recipe_ids))
            .find_also_related(IngredientEntity)
            .all(conn)
            .await?;
        for (link, ingredient) in rows {
            if let Some(ingredient) = ingredient {
                ingredients.entry(link.recipe_id).or_default().push(CartIngredient {
                    name: ingredient.name,
                    measurement_unit: ingredient.measurement_unit,
                    amount: link.amount,
                });
            }
        }

        Ok(recipes
            .into_iter()
            .map(|(recipe, author)| CartRecipe {
                id: recipe.id,
                author_username: author.map(|user| user.username).unwrap_or_default(),
                ingredients: ingredients.remove(&recipe.id).unwrap_or_default(),
                name: recipe.name,
            })
            .collect())
    }
}

async fn replace_ingredients<C>(conn: &C, recipe_id: Uuid, items: &[(Uuid, Decimal)]) -> Result<()>
where
    C: ConnectionTrait,
{
    RecipeIngredientEntity::delete_many()
        .filter(RecipeIngredientColumn::RecipeId.eq(recipe_id))
        .exec(conn)
        .await?;

    if items.is_empty() {
        return Ok(());
    }

    let rows = items.iter().map(|(ingredient_id, amount)| RecipeIngredientActiveModel {
        recipe_id: Set(recipe_id),
        ingredient_id: Set(*ingredient_id),
        amount: Set(*amount),
    });
    RecipeIngredientEntity::insert_many(rows)
        .exec_without_returning(conn)
        .await?;

    Ok(())
}

async fn replace_tags<C>(conn: &C, recipe_id: Uuid, tags: &[Uuid]) -> Result<()>
where
    C: ConnectionTrait,
{
    RecipeTagEntity::delete_many()
        .filter(RecipeTagColumn::RecipeId.eq(recipe_id))
        .exec(conn)
        .await?;

    if tags.is_empty() {
        return Ok(());
    }

    let rows = tags.iter().map(|tag_id| RecipeTagActiveModel {
        recipe_id: Set(recipe_id),
        tag_id: Set(*tag_id),
    });
    RecipeTagEntity::insert_many(rows)
        .exec_without_returning(conn)
        .await?;

    Ok(())
}

/// Intersect an optional running id set with another candidate list
fn narrow(current: Option<HashSet<Uuid>>, candidates: Vec<Uuid>) -> HashSet<Uuid> {
    let candidates: HashSet<Uuid> = candidates.into_iter().collect();
    match current {
        Some(current) => current.intersection(&candidates).copied().collect(),
        None => candidates,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_schema;
    use sea_orm::{ConnectOptions, Database};

    async fn repo() -> Repository {
        let mut opts = ConnectOptions::new("sqlite::memory:");
        opts.max_connections(1).min_connections(1).sqlx_logging(false);
        let conn = Database::connect(opts).await.unwrap();
        create_schema(&conn).await.unwrap();
        Repository::new(DbPool::from_connection(conn))
    }

    async fn user(repo: &Repository, name: &str) -> User {
        repo.create_user(NewUser {
            email: format!("{}@example.com", name),
            username: name.to_string(),
            first_name: name.to_string(),
            last_name: "Tester".to_string(),
            password_hash: "hash".to_string(),
        })
        .await
        .unwrap()
    }

    async fn seed(repo: &Repository) -> (Vec<Ingredient>, Vec<Tag>) {
        repo.import_ingredients(vec![
            ("Flour".into(), "g".into()),
            ("Egg".into(), "pcs".into()),
            ("Milk".into(), "ml".into()),
        ])
        .await
        .unwrap();
        repo.import_tags(vec![
            ("Breakfast".into(), "breakfast".into()),
            ("Dinner".into(), "dinner".into()),
        ])
        .await
        .unwrap();

        let ingredients = repo.search_ingredients(None).await.unwrap();
        let tags = repo.list_tags().await.unwrap();
        (ingredients, tags)
    }

    fn by_name<'a>(ingredients: &'a [Ingredient], name: &str) -> &'a Ingredient {
        ingredients.iter().find(|i| i.name == name).unwrap()
    }

    async fn recipe(
        repo: &Repository,
        author: &User,
        name: &str,
        ingredients: Vec<(Uuid, i64)>,
        tags: Vec<Uuid>,
    ) -> Recipe {
        repo.create_recipe(
            author.id,
            NewRecipe {
                name: name.to_string(),
                image: "data:image/png;base64,AAAA".to_string(),
                text: "Mix and cook".to_string(),
                cooking_time: 10,
                ingredients: ingredients
                    .into_iter()
                    .map(|(id, amount)| (id, Decimal::from(amount)))
                    .collect(),
                tags,
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_duplicate_user_rejected() {
        let repo = repo().await;
        user(&repo, "alice").await;

        let err = repo
            .create_user(NewUser {
                email: "ALICE@example.com".into(),
                username: "alice2".into(),
                first_name: "A".into(),
                last_name: "B".into(),
                password_hash: "hash".into(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Duplicate { .. }));
        assert!(repo.find_user_by_email("Alice@Example.com").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_favorite_twice_conflicts() {
        let repo = repo().await;
        let (ingredients, tags) = seed(&repo).await;
        let alice = user(&repo, "alice").await;
        let pancakes = recipe(&repo, &alice, "Pancakes", vec![(ingredients[0].id, 100)], vec![tags[0].id]).await;

        repo.add_favorite(alice.id, pancakes.id).await.unwrap();
        let err = repo.add_favorite(alice.id, pancakes.id).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::AlreadyExists { membership: Membership::Favorite, .. }
        ));

        repo.remove_favorite(alice.id, pancakes.id).await.unwrap();
        let err = repo.remove_favorite(alice.id, pancakes.id).await.unwrap_err();
        assert!(matches!(err, AppError::MembershipNotFound { .. }));
    }

    #[tokio::test]
    async fn test_remove_absent_cart_entry() {
        let repo = repo().await;
        let (ingredients, tags) = seed(&repo).await;
        let alice = user(&repo, "alice").await;
        let pancakes = recipe(&repo, &alice, "Pancakes", vec![(ingredients[0].id, 100)], vec![tags[0].id]).await;

        let err = repo.remove_from_cart(alice.id, pancakes.id).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::MembershipNotFound { membership: Membership::ShoppingCart, .. }
        ));

        let err = repo.add_to_cart(alice.id, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::RecipeNotFound { .. }));
    }

    #[tokio::test]
    async fn test_favorite_and_cart_are_independent() {
        let repo = repo().await;
        let (ingredients, tags) = seed(&repo).await;
        let alice = user(&repo, "alice").await;
        let pancakes = recipe(&repo, &alice, "Pancakes", vec![(ingredients[0].id, 100)], vec![tags[0].id]).await;

        repo.add_favorite(alice.id, pancakes.id).await.unwrap();
        repo.add_to_cart(alice.id, pancakes.id).await.unwrap();
        repo.remove_favorite(alice.id, pancakes.id).await.unwrap();

        let details = repo.recipe_detail(pancakes.id, Some(alice.id)).await.unwrap();
        assert!(!details.is_favorited);
        assert!(details.is_in_shopping_cart);
    }

    #[tokio::test]
    async fn test_self_follow_rejected_first() {
        let repo = repo().await;
        let ghost = Uuid::new_v4();

        // Self-follow wins even for a user that does not exist
        assert!(matches!(repo.subscribe(ghost, ghost).await, Err(AppError::SelfFollow)));
        assert!(matches!(repo.unsubscribe(ghost, ghost).await, Err(AppError::SelfFollow)));
    }

    #[tokio::test]
    async fn test_subscription_toggle() {
        let repo = repo().await;
        let alice = user(&repo, "alice").await;
        let bob = user(&repo, "bob").await;

        repo.subscribe(alice.id, bob.id).await.unwrap();
        assert!(repo.is_subscribed(alice.id, bob.id).await.unwrap());
        assert!(!repo.is_subscribed(bob.id, alice.id).await.unwrap());

        let err = repo.subscribe(alice.id, bob.id).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::AlreadyExists { membership: Membership::Subscription, .. }
        ));

        let page = repo.list_subscriptions(alice.id, 0, 10).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].id, bob.id);

        repo.unsubscribe(alice.id, bob.id).await.unwrap();
        assert!(matches!(
            repo.unsubscribe(alice.id, bob.id).await,
            Err(AppError::MembershipNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_create_recipe_validation() {
        let repo = repo().await;
        let (ingredients, tags) = seed(&repo).await;
        let alice = user(&repo, "alice").await;
        let flour = by_name(&ingredients, "Flour").id;

        let base = NewRecipe {
            name: "Bread".into(),
            image: "img".into(),
            text: "Bake".into(),
            cooking_time: 30,
            ingredients: vec![(flour, Decimal::from(500))],
            tags: vec![tags[0].id],
        };

        let duplicate = NewRecipe {
            ingredients: vec![(flour, Decimal::from(1)), (flour, Decimal::from(2))],
            ..base.clone()
        };
        let err = repo.create_recipe(alice.id, duplicate).await.unwrap_err();
        assert_eq!(err.field(), Some("ingredients"));

        let unknown = NewRecipe {
            tags: vec![Uuid::new_v4()],
            ..base.clone()
        };
        let err = repo.create_recipe(alice.id, unknown).await.unwrap_err();
        assert_eq!(err.field(), Some("tags"));

        let too_fast = NewRecipe {
            cooking_time: 0,
            ..base.clone()
        };
        assert!(repo.create_recipe(alice.id, too_fast).await.is_err());

        let zero_amount = NewRecipe {
            ingredients: vec![(flour, Decimal::ZERO)],
            ..base.clone()
        };
        assert!(repo.create_recipe(alice.id, zero_amount).await.is_err());

        assert!(repo.create_recipe(alice.id, base).await.is_ok());
    }

    #[tokio::test]
    async fn test_update_and_delete_require_author() {
        let repo = repo().await;
        let (ingredients, tags) = seed(&repo).await;
        let alice = user(&repo, "alice").await;
        let bob = user(&repo, "bob").await;
        let flour = by_name(&ingredients, "Flour").id;
        let milk = by_name(&ingredients, "Milk").id;
        let pancakes = recipe(&repo, &alice, "Pancakes", vec![(flour, 100)], vec![tags[0].id]).await;

        let patch = RecipePatch {
            name: Some("Crepes".into()),
            ingredients: Some(vec![(milk, Decimal::from(250))]),
            ..Default::default()
        };
        let err = repo.update_recipe(pancakes.id, bob.id, patch.clone()).await.unwrap_err();
        assert!(matches!(err, AppError::NotRecipeAuthor { .. }));

        let updated = repo.update_recipe(pancakes.id, alice.id, patch).await.unwrap();
        assert_eq!(updated.name, "Crepes");

        let details = repo.recipe_detail(pancakes.id, None).await.unwrap();
        assert_eq!(details.ingredients.len(), 1);
        assert_eq!(details.ingredients[0].ingredient.name, "Milk");
        assert_eq!(details.tags.len(), 1);

        repo.add_to_cart(bob.id, pancakes.id).await.unwrap();
        assert!(matches!(
            repo.delete_recipe(pancakes.id, bob.id).await,
            Err(AppError::NotRecipeAuthor { .. })
        ));
        repo.delete_recipe(pancakes.id, alice.id).await.unwrap();

        assert!(repo.find_recipe(pancakes.id).await.unwrap().is_none());
        assert!(repo.cart_recipes(bob.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_recipes_filters() {
        let repo = repo().await;
        let (ingredients, tags) = seed(&repo).await;
        let alice = user(&repo, "alice").await;
        let bob = user(&repo, "bob").await;
        let egg = by_name(&ingredients, "Egg").id;
        let breakfast = tags.iter().find(|t| t.slug == "breakfast").unwrap().id;
        let dinner = tags.iter().find(|t| t.slug == "dinner").unwrap().id;

        let omelette = recipe(&repo, &alice, "Omelette", vec![(egg, 3)], vec![breakfast]).await;
        let quiche = recipe(&repo, &bob, "Quiche", vec![(egg, 4)], vec![dinner]).await;
        recipe(&repo, &bob, "Frittata", vec![(egg, 5)], vec![breakfast, dinner]).await;

        let all = repo.list_recipes(&RecipeFilter::default(), 0, 10).await.unwrap();
        assert_eq!(all.total, 3);

        let by_tag = RecipeFilter {
            tags: vec!["breakfast".into()],
            ..Default::default()
        };
        assert_eq!(repo.list_recipes(&by_tag, 0, 10).await.unwrap().total, 2);

        let by_author = RecipeFilter {
            author: Some(bob.id),
            tags: vec!["breakfast".into()],
            ..Default::default()
        };
        assert_eq!(repo.list_recipes(&by_author, 0, 10).await.unwrap().total, 1);

        repo.add_favorite(alice.id, quiche.id).await.unwrap();
        repo.add_to_cart(alice.id, omelette.id).await.unwrap();

        let favorites = RecipeFilter {
            favorited_by: Some(alice.id),
            ..Default::default()
        };
        let page = repo.list_recipes(&favorites, 0, 10).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id, quiche.id);

        let cart_and_favorite = RecipeFilter {
            favorited_by: Some(alice.id),
            in_cart_of: Some(alice.id),
            ..Default::default()
        };
        assert_eq!(repo.list_recipes(&cart_and_favorite, 0, 10).await.unwrap().total, 0);

        let unknown_tag = RecipeFilter {
            tags: vec!["dessert".into()],
            ..Default::default()
        };
        assert_eq!(repo.list_recipes(&unknown_tag, 0, 10).await.unwrap().total, 0);

        let paged = repo.list_recipes(&RecipeFilter::default(), 1, 2).await.unwrap();
        assert_eq!(paged.total, 3);
        assert_eq!(paged.items.len(), 1);
    }

    #[tokio::test]
    async fn test_search_ingredients_prefix() {
        let repo = repo().await;
        seed(&repo).await;

        let found = repo.search_ingredients(Some("fl")).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Flour");

        let found = repo.search_ingredients(Some("MI")).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Milk");

        assert!(repo.search_ingredients(Some("our")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_import_skips_existing() {
        let repo = repo().await;
        seed(&repo).await;

        let created = repo
            .import_ingredients(vec![
                ("flour".into(), "G".into()),
                ("Sugar".into(), "g".into()),
                ("Sugar".into(), "g".into()),
            ])
            .await
            .unwrap();
        assert_eq!(created, 1);

        let created = repo
            .import_tags(vec![
                ("Breakfast".into(), "morning".into()),
                ("BREAKFAST".into(), "brunch".into()),
                ("Supper".into(), "DINNER".into()),
                ("Lunch".into(), "lunch".into()),
                ("lunch".into(), "midday".into()),
            ])
            .await
            .unwrap();
        assert_eq!(created, 1);
        assert_eq!(repo.list_tags().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_amount_bounds() {
        let repo = repo().await;
        let (ingredients, tags) = seed(&repo).await;
        let alice = user(&repo, "alice").await;
        let flour = by_name(&ingredients, "Flour").id;

        let with_amount = |amount: &str| NewRecipe {
            name: "Bread".into(),
            image: "img".into(),
            text: "Bake".into(),
            cooking_time: 30,
            ingredients: vec![(flour, amount.parse::<Decimal>().unwrap())],
            tags: vec![tags[0].id],
        };

        for rejected in ["0.0001", "1000000000", "50000000000000000000000000000", "-1"] {
            let err = repo
                .create_recipe(alice.id, with_amount(rejected))
                .await
                .unwrap_err();
            assert_eq!(err.field(), Some("ingredients"), "amount {}", rejected);
        }

        // Trailing zeros do not count against the scale
        for accepted in ["999999999.999", "1.5000", "0.001"] {
            assert!(
                repo.create_recipe(alice.id, with_amount(accepted)).await.is_ok(),
                "amount {}",
                accepted
            );
        }
    }

    #[tokio::test]
    async fn test_racing_insert_maps_to_conflict() {
        let repo = repo().await;
        let (ingredients, tags) = seed(&repo).await;
        let alice = user(&repo, "alice").await;
        let pancakes = recipe(&repo, &alice, "Pancakes", vec![(ingredients[0].id, 100)], vec![tags[0].id]).await;

        let entry = || FavoriteActiveModel {
            user_id: Set(alice.id),
            recipe_id: Set(pancakes.id),
            created_at: Set(Utc::now().into()),
        };

        // Insert directly, skipping the pre-check a concurrent request would also pass
        FavoriteEntity::insert(entry())
            .exec_without_returning(repo.write_conn())
            .await
            .unwrap();
        let err = FavoriteEntity::insert(entry())
            .exec_without_returning(repo.write_conn())
            .await
            .unwrap_err();

        assert!(is_unique_violation(&err));
        let mapped = membership_conflict(err, Membership::Favorite, pancakes.id);
        assert!(matches!(
            mapped,
            AppError::AlreadyExists { membership: Membership::Favorite, .. }
        ));
        assert_eq!(mapped.status_code(), axum::http::StatusCode::CONFLICT);

        let other = membership_conflict(DbErr::Custom("boom".into()), Membership::Favorite, pancakes.id);
        assert!(matches!(other, AppError::Database(_)));
    }

    #[tokio::test]
    async fn test_cart_recipes_feed_shopping_list() {
        let repo = repo().await;
        let (ingredients, tags) = seed(&repo).await;
        let alice = user(&repo, "alice").await;
        let bob = user(&repo, "bob").await;
        let flour = by_name(&ingredients, "Flour").id;
        let egg = by_name(&ingredients, "Egg").id;

        let a = recipe(&repo, &alice, "Bread", vec![(flour, 200)], vec![tags[0].id]).await;
        let b = recipe(&repo, &bob, "Cake", vec![(flour, 100), (egg, 2)], vec![tags[0].id]).await;

        assert!(repo.cart_recipes(alice.id).await.unwrap().is_empty());

        repo.add_to_cart(alice.id, a.id).await.unwrap();
        repo.add_to_cart(alice.id, b.id).await.unwrap();

        let today = chrono::NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let text = crate::shopping_list::generate(&repo, alice.id)
            .await
            .unwrap()
            .render(today);

        assert!(text.contains("1. Egg - 2 pcs\n2. Flour - 300 g\n"));
        assert!(text.contains("1. Bread (author: alice)\n2. Cake (author: bob)\n"));
    }

    #[test]
    fn test_duplicates_helper() {
        assert_eq!(duplicates(vec![1, 2, 1, 3, 1, 2]), vec![1, 2]);
        assert!(duplicates(Vec::<u8>::new()).is_empty());
    }
}
