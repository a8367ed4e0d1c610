//! SeaORM entity models
//!
//! Database entities for Foodgram

mod favorite;
mod follow;
mod ingredient;
mod recipe;
mod recipe_ingredient;
mod recipe_tag;
mod shopping_cart;
mod tag;
mod user;

pub use user::{
    Entity as UserEntity,
    Model as User,
    ActiveModel as UserActiveModel,
    Column as UserColumn,
};

pub use tag::{
    Entity as TagEntity,
    Model as Tag,
    ActiveModel as TagActiveModel,
    Column as TagColumn,
};

pub use ingredient::{
    Entity as IngredientEntity,
    Model as Ingredient,
    ActiveModel as IngredientActiveModel,
    Column as IngredientColumn,
};

pub use recipe::{
    Entity as RecipeEntity,
    Model as Recipe,
    ActiveModel as RecipeActiveModel,
    Column as RecipeColumn,
};

pub use recipe_ingredient::{
    Entity as RecipeIngredientEntity,
    Model as RecipeIngredient,
    ActiveModel as RecipeIngredientActiveModel,
    Column as RecipeIngredientColumn,
};

pub use recipe_tag::{
    Entity as RecipeTagEntity,
    Model as RecipeTag,
    ActiveModel as RecipeTagActiveModel,
    Column as RecipeTagColumn,
};

pub use favorite::{
    Entity as FavoriteEntity,
    Model as Favorite,
    ActiveModel as FavoriteActiveModel,
    Column as FavoriteColumn,
};

pub use shopping_cart::{
    Entity as ShoppingCartEntity,
    Model as ShoppingCartEntry,
    ActiveModel as ShoppingCartActiveModel,
    Column as ShoppingCartColumn,
};

pub use follow::{
    Entity as FollowEntity,
    Model as Follow,
    ActiveModel as FollowActiveModel,
    Column as FollowColumn,
};
