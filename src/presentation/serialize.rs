use serde::Serialize;
use sqlx::{Pool, Postgres};

use crate::database::{
    actions::{
        count_author_recipes, get_user_by_id, is_favorite, is_in_shopping_cart, is_subscribed,
        list_author_recipes, list_recipe_ingredients, list_recipe_tags,
    },
    error::Error,
    schema::{Id, Recipe, RecipeIngredient, Tag, User},
};

/// Public user representation. The subscription flag is relative to the
/// viewer and false for anonymous viewers.
#[derive(Serialize, Debug, Clone)]
pub struct UserProfile {
    pub email: String,
    pub id: Id,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub is_subscribed: bool,
}

impl UserProfile {
    fn new(user: User, is_subscribed: bool) -> Self {
        Self {
            email: user.email,
            id: user.id,
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
            is_subscribed,
        }
    }
}

/// Compact recipe representation used inside collection listings.
#[derive(Serialize, Debug, Clone)]
pub struct RecipeMinimal {
    pub id: Id,
    pub name: String,
    pub image: String,
    pub cooking_time: i32,
}

impl From<Recipe> for RecipeMinimal {
    fn from(value: Recipe) -> Self {
        Self {
            id: value.id,
            name: value.name,
            image: value.image,
            cooking_time: value.cooking_time,
        }
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct RecipeIngredientView {
    pub id: Id,
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

impl From<RecipeIngredient> for RecipeIngredientView {
    fn from(value: RecipeIngredient) -> Self {
        Self {
            id: value.ingredient_id,
            name: value.name,
            measurement_unit: value.measurement_unit,
            amount: value.amount,
        }
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct RecipeFull {
    pub id: Id,
    pub tags: Vec<Tag>,
    pub author: UserProfile,
    pub ingredients: Vec<RecipeIngredientView>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
    pub name: String,
    pub image: String,
    pub text: String,
    pub cooking_time: i32,
}

/// Subscription listing entry: the author's profile with a capped recipe
/// preview.
#[derive(Serialize, Debug, Clone)]
pub struct AuthorWithRecipes {
    pub email: String,
    pub id: Id,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub is_subscribed: bool,
    pub recipes: Vec<RecipeMinimal>,
    pub recipes_count: i64,
}

/// Parses the `recipes_limit` query value. Absent means unlimited; `"0"`
/// is a valid cap and yields an empty preview (it is never treated as
/// "no limit"). Non-numeric or negative values are rejected.
pub fn parse_recipes_limit(value: Option<&str>) -> Result<Option<i64>, Error> {
    match value {
        None => Ok(None),
        Some(raw) => match raw.parse::<i64>() {
            Ok(limit) if limit >= 0 => Ok(Some(limit)),
            _ => Err(Error::Validation(String::from(
                "`recipes_limit` must be a non-negative integer",
            ))),
        },
    }
}

pub async fn render_user_profile(
    user: User,
    viewer: Option<Id>,
    pool: &Pool<Postgres>,
) -> Result<UserProfile, Error> {
    let subscribed = match viewer {
        Some(viewer) => is_subscribed(viewer, user.id, pool).await?,
        None => false,
    };

    Ok(UserProfile::new(user, subscribed))
}

/// Assembles the full recipe view: catalog joins plus the viewer-relative
/// flags.
pub async fn render_recipe(
    recipe: Recipe,
    viewer: Option<Id>,
    pool: &Pool<Postgres>,
) -> Result<RecipeFull, Error> {
    let author = get_user_by_id(pool, recipe.author_id)
        .await?
        .ok_or_else(|| Error::Internal(String::from("Recipe author row is missing")))?;
    let author = render_user_profile(author, viewer, pool).await?;

    let tags = list_recipe_tags(recipe.id, pool).await?;
    let ingredients = list_recipe_ingredients(recipe.id, pool)
        .await?
        .into_iter()
        .map(RecipeIngredientView::from)
        .collect();

    let (is_favorited, in_cart) = match viewer {
        Some(viewer) => (
            is_favorite(recipe.id, viewer, pool).await?,
            is_in_shopping_cart(recipe.id, viewer, pool).await?,
        ),
        None => (false, false),
    };

    Ok(RecipeFull {
        id: recipe.id,
        tags,
        author,
        ingredients,
        is_favorited,
        is_in_shopping_cart: in_cart,
        name: recipe.name,
        image: recipe.image,
        text: recipe.text,
        cooking_time: recipe.cooking_time,
    })
}

pub async fn render_author(
    author: User,
    viewer: Option<Id>,
    recipes_limit: Option<i64>,
    pool: &Pool<Postgres>,
) -> Result<AuthorWithRecipes, Error> {
    let recipes_count = count_author_recipes(author.id, pool).await?;
    let recipes = list_author_recipes(author.id, recipes_limit, pool)
        .await?
        .into_iter()
        .map(RecipeMinimal::from)
        .collect();

    let profile = render_user_profile(author, viewer, pool).await?;

    Ok(AuthorWithRecipes {
        email: profile.email,
        id: profile.id,
        username: profile.username,
        first_name: profile.first_name,
        last_name: profile.last_name,
        is_subscribed: profile.is_subscribed,
        recipes,
        recipes_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn recipes_limit_parsing() {
        assert_eq!(parse_recipes_limit(None).unwrap(), None);
        assert_eq!(parse_recipes_limit(Some("3")).unwrap(), Some(3));
        assert_eq!(parse_recipes_limit(Some("0")).unwrap(), Some(0));
        assert!(matches!(
            parse_recipes_limit(Some("-1")),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            parse_recipes_limit(Some("three")),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn minimal_recipe_keeps_the_listing_fields() {
        let recipe = Recipe {
            id: 1,
            author_id: 2,
            name: String::from("Borscht"),
            image: String::from("recipes/images/borscht.png"),
            text: String::from("Simmer for an hour."),
            cooking_time: 60,
            pub_date: Utc::now(),
        };

        let minimal = RecipeMinimal::from(recipe);
        let json = serde_json::to_value(&minimal).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": 1,
                "name": "Borscht",
                "image": "recipes/images/borscht.png",
                "cooking_time": 60,
            })
        );
    }

    #[test]
    fn profile_never_exposes_the_password() {
        let user = User {
            id: 7,
            email: String::from("cook@example.com"),
            username: String::from("cook"),
            first_name: String::from("Remy"),
            last_name: String::from("Gusteau"),
            password: String::from("<hash>"),
        };

        let profile = UserProfile::new(user, true);
        let json = serde_json::to_string(&profile).unwrap();
        assert!(!json.contains("<hash>"));
        assert!(json.contains("\"is_subscribed\":true"));
    }
}
