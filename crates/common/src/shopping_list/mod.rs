//! Shopping list aggregation
//!
//! Turns the recipes in a user's cart into a single downloadable text
//! document: one line per distinct ingredient with the summed amount,
//! followed by the list of recipes it was built from.
//!
//! Ingredients are merged on the case-insensitive `(name, unit)` pair.
//! Amounts are `Decimal`, so totals are exact.

use crate::errors::{AppError, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Attachment filename for the download
pub const FILENAME: &str = "shopping_list.txt";

/// Content type of the rendered document
pub const CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// One ingredient line of a recipe in the cart
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartIngredient {
    pub name: String,
    pub measurement_unit: String,
    pub amount: Decimal,
}

/// A recipe in the cart together with its ingredients
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartRecipe {
    pub id: Uuid,
    pub name: String,
    pub author_username: String,
    pub ingredients: Vec<CartIngredient>,
}

/// An ingredient after merging across all cart recipes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedIngredient {
    /// Capitalized display name
    pub name: String,
    /// Lowercased unit
    pub measurement_unit: String,
    pub amount: Decimal,
}

/// Manifest line naming a recipe the list was built from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeEntry {
    pub id: Uuid,
    pub name: String,
    pub author_username: String,
}

/// Loads the cart contents for a user.
///
/// Implemented by the repository; tests provide in-memory fakes.
#[async_trait]
pub trait ShoppingCartSource: Send + Sync {
    async fn cart_recipes(&self, user_id: Uuid) -> Result<Vec<CartRecipe>>;
}

/// Aggregated shopping list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShoppingList {
    pub ingredients: Vec<MergedIngredient>,
    pub recipes: Vec<RecipeEntry>,
}

impl ShoppingList {
    /// Build the list from the cart recipes.
    ///
    /// An empty cart is [`AppError::EmptyShoppingCart`].
    pub fn build(recipes: &[CartRecipe]) -> Result<Self> {
        if recipes.is_empty() {
            return Err(AppError::EmptyShoppingCart);
        }

        let ingredients = merge_ingredients(recipes.iter().flat_map(|recipe| &recipe.ingredients))?;

        let mut manifest: Vec<RecipeEntry> = recipes
            .iter()
            .map(|recipe| RecipeEntry {
                id: recipe.id,
                name: recipe.name.clone(),
                author_username: recipe.author_username.clone(),
            })
            .collect();
        manifest.sort_by_cached_key(|entry| {
            (entry.name.to_lowercase(), entry.author_username.clone(), entry.id)
        });

        Ok(Self {
            ingredients,
            recipes: manifest,
        })
    }

    /// Render the plain-text document dated `today`
    pub fn render(&self, today: NaiveDate) -> String {
        let mut lines = Vec::with_capacity(self.ingredients.len() + self.recipes.len() + 6);

        lines.push(format!("Shopping list for {}", today.format("%-d %B %Y")));
        lines.push(String::new());
        lines.push("Required ingredients:".to_string());
        for (index, item) in self.ingredients.iter().enumerate() {
            let line = format!(
                "{}. {} - {} {}",
                index + 1,
                item.name,
                item.amount,
                item.measurement_unit
            );
            lines.push(line.trim_end().to_string());
        }

        lines.push(String::new());
        lines.push("Recipes:".to_string());
        for (index, recipe) in self.recipes.iter().enumerate() {
            lines.push(format!(
                "{}. {} (author: {})",
                index + 1,
                recipe.name,
                recipe.author_username
            ));
        }

        lines.push(String::new());
        lines.push("Enjoy your cooking!".to_string());

        let mut text = lines.join("\n");
        text.push('\n');
        text
    }
}

/// Merge ingredient lines on case-insensitive `(name, unit)`, summing amounts.
///
/// The result is sorted by name, then unit. A total that does not fit in a
/// `Decimal` is a validation error.
pub fn merge_ingredients<'a, I>(ingredients: I) -> Result<Vec<MergedIngredient>>
where
    I: IntoIterator<Item = &'a CartIngredient>,
{
    let mut totals: BTreeMap<(String, String), Decimal> = BTreeMap::new();

    for item in ingredients {
        let key = (
            item.name.trim().to_lowercase(),
            item.measurement_unit.trim().to_lowercase(),
        );
        let total = totals.entry(key).or_insert(Decimal::ZERO);
        *total = total.checked_add(item.amount).ok_or_else(|| {
            AppError::validation(
                "shopping_cart",
                format!("Total amount of {} is too large to add up", item.name.trim()),
            )
        })?;
    }

    Ok(totals
        .into_iter()
        .map(|((name, measurement_unit), amount)| MergedIngredient {
            name: capitalize(&name),
            measurement_unit,
            amount: amount.normalize(),
        })
        .collect())
}

/// Build the shopping list for `user_id`.
///
/// An empty cart is reported as [`AppError::EmptyShoppingCart`].
pub async fn generate<S>(source: &S, user_id: Uuid) -> Result<ShoppingList>
where
    S: ShoppingCartSource + ?Sized,
{
    let recipes = source.cart_recipes(user_id).await?;
    let list = ShoppingList::build(&recipes)?;

    tracing::debug!(
        user_id = %user_id,
        recipes = list.recipes.len(),
        ingredients = list.ingredients.len(),
        "Shopping list built"
    );

    Ok(list)
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ingredient(name: &str, amount: i64, unit: &str) -> CartIngredient {
        CartIngredient {
            name: name.to_string(),
            measurement_unit: unit.to_string(),
            amount: Decimal::from(amount),
        }
    }

    fn recipe(name: &str, author: &str, ingredients: Vec<CartIngredient>) -> CartRecipe {
        CartRecipe {
            id: Uuid::new_v4(),
            name: name.to_string(),
            author_username: author.to_string(),
            ingredients,
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
    }

    struct FixedCart(Vec<CartRecipe>);

    #[async_trait]
    impl ShoppingCartSource for FixedCart {
        async fn cart_recipes(&self, _user_id: Uuid) -> Result<Vec<CartRecipe>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_flour_and_egg() {
        let cart = vec![
            recipe("Pancakes", "alice", vec![ingredient("Flour", 200, "g")]),
            recipe(
                "Omelette",
                "bob",
                vec![ingredient("Flour", 100, "g"), ingredient("Egg", 2, "pcs")],
            ),
        ];

        let list = ShoppingList::build(&cart).unwrap();
        assert_eq!(
            list.ingredients,
            vec![
                MergedIngredient {
                    name: "Egg".into(),
                    measurement_unit: "pcs".into(),
                    amount: Decimal::from(2),
                },
                MergedIngredient {
                    name: "Flour".into(),
                    measurement_unit: "g".into(),
                    amount: Decimal::from(300),
                },
            ]
        );

        let expected = "Shopping list for 5 March 2024\n\
                        \n\
                        Required ingredients:\n\
                        1. Egg - 2 pcs\n\
                        2. Flour - 300 g\n\
                        \n\
                        Recipes:\n\
                        1. Omelette (author: bob)\n\
                        2. Pancakes (author: alice)\n\
                        \n\
                        Enjoy your cooking!\n";
        assert_eq!(list.render(date()), expected);
    }

    #[test]
    fn test_merge_is_case_insensitive() {
        let items = vec![
            ingredient("sugar", 10, "G"),
            ingredient("Sugar ", 15, "g"),
            ingredient("SUGAR", 1, "tbsp"),
        ];

        let merged = merge_ingredients(&items).unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].name, "Sugar");
        assert_eq!(merged[0].measurement_unit, "g");
        assert_eq!(merged[0].amount, Decimal::from(25));
        assert_eq!(merged[1].measurement_unit, "tbsp");
        assert_eq!(merged[1].amount, Decimal::from(1));
    }

    #[test]
    fn test_merged_total_equals_sum() {
        let cart: Vec<CartRecipe> = (1..=5)
            .map(|i| recipe(&format!("Recipe {}", i), "cook", vec![ingredient("Milk", i * 50, "ml")]))
            .collect();

        let list = ShoppingList::build(&cart).unwrap();
        assert_eq!(list.ingredients.len(), 1);
        assert_eq!(list.ingredients[0].amount, Decimal::from(750));
        assert_eq!(list.recipes.len(), 5);
    }

    #[test]
    fn test_fractional_amounts_are_exact() {
        let items = vec![
            CartIngredient {
                name: "Oil".into(),
                measurement_unit: "l".into(),
                amount: Decimal::new(1, 1),
            },
            CartIngredient {
                name: "Oil".into(),
                measurement_unit: "l".into(),
                amount: Decimal::new(200, 3),
            },
        ];

        let merged = merge_ingredients(&items).unwrap();
        assert_eq!(merged[0].amount.to_string(), "0.3");
    }

    #[test]
    fn test_order_independent() {
        let a = recipe("Soup", "ann", vec![ingredient("Carrot", 2, "pcs"), ingredient("water", 1, "l")]);
        let b = recipe("Salad", "ben", vec![ingredient("carrot", 1, "PCS"), ingredient("Oil", 20, "ml")]);
        let c = recipe("Stew", "cat", vec![ingredient("Water", 2, "l")]);

        let forward = ShoppingList::build(&[a.clone(), b.clone(), c.clone()]).unwrap();
        let backward = ShoppingList::build(&[c, b, a]).unwrap();

        assert_eq!(forward, backward);
        assert_eq!(forward.render(date()), backward.render(date()));
    }

    #[test]
    fn test_empty_cart() {
        assert!(matches!(ShoppingList::build(&[]), Err(AppError::EmptyShoppingCart)));
    }

    #[test]
    fn test_overflowing_total_is_rejected() {
        let huge = CartIngredient {
            name: "Rice".into(),
            measurement_unit: "g".into(),
            amount: Decimal::MAX,
        };
        let items = vec![huge.clone(), huge];

        let err = merge_ingredients(&items).unwrap_err();
        assert_eq!(err.field(), Some("shopping_cart"));
        assert!(err.is_client_error());

        let cart = vec![recipe("Pilaf", "ann", items)];
        assert!(ShoppingList::build(&cart).is_err());
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("flour"), "Flour");
        assert_eq!(capitalize("éclair"), "Éclair");
        assert_eq!(capitalize(""), "");
    }

    #[tokio::test]
    async fn test_generate_empty_cart() {
        let source = FixedCart(Vec::new());
        let result = generate(&source, Uuid::new_v4()).await;
        assert!(matches!(result, Err(AppError::EmptyShoppingCart)));
    }

    #[tokio::test]
    async fn test_generate_renders() {
        let source = FixedCart(vec![recipe("Tea", "tom", vec![ingredient("Tea leaves", 5, "g")])]);
        let text = generate(&source, Uuid::new_v4()).await.unwrap().render(date());

        assert!(text.starts_with("Shopping list for 5 March 2024\n"));
        assert!(text.contains("1. Tea leaves - 5 g\n"));
        assert!(text.contains("1. Tea (author: tom)\n"));
    }
}
