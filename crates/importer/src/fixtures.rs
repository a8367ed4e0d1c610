//! JSON fixture formats

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
pub struct IngredientFixture {
    pub name: String,
    pub measurement_unit: String,
}

#[derive(Debug, Deserialize)]
pub struct TagFixture {
    pub name: String,
    pub slug: String,
}

/// Parse `[{"name": .., "measurement_unit": ..}]`, dropping entries with a blank name
pub fn parse_ingredients(raw: &str) -> Result<Vec<(String, String)>> {
    let items: Vec<IngredientFixture> =
        serde_json::from_str(raw).context("Malformed ingredient fixture")?;

    Ok(items
        .into_iter()
        .map(|item| (item.name.trim().to_string(), item.measurement_unit.trim().to_string()))
        .filter(|(name, _)| !name.is_empty())
        .collect())
}

/// Parse `[{"name": .., "slug": ..}]`
pub fn parse_tags(raw: &str) -> Result<Vec<(String, String)>> {
    let items: Vec<TagFixture> = serde_json::from_str(raw).context("Malformed tag fixture")?;

    Ok(items
        .into_iter()
        .map(|item| (item.name.trim().to_string(), item.slug.trim().to_string()))
        .filter(|(name, slug)| !name.is_empty() && !slug.is_empty())
        .collect())
}

pub fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ingredients() {
        let raw = r#"[
            {"name": " Flour ", "measurement_unit": "g"},
            {"name": "", "measurement_unit": "g"},
            {"name": "Egg", "measurement_unit": "pcs"}
        ]"#;

        let parsed = parse_ingredients(raw).unwrap();
        assert_eq!(
            parsed,
            vec![
                ("Flour".to_string(), "g".to_string()),
                ("Egg".to_string(), "pcs".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_tags() {
        let raw = r#"[{"name": "Breakfast", "slug": "breakfast"}, {"name": "Nameless", "slug": ""}]"#;
        let parsed = parse_tags(raw).unwrap();
        assert_eq!(parsed, vec![("Breakfast".to_string(), "breakfast".to_string())]);
    }

    #[test]
    fn test_malformed_fixture() {
        assert!(parse_ingredients(r#"{"name": "Flour"}"#).is_err());
        assert!(parse_tags(r#"[{"name": "Breakfast"}]"#).is_err());
    }
}
