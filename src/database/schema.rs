use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type Id = i32;

#[derive(sqlx::FromRow, Debug, Clone, Serialize)]
pub struct User {
    pub id: Id,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing)]
    pub password: String,
}

/// User row with the windowed total for paginated listings.
#[derive(sqlx::FromRow, Debug, Clone, Serialize)]
pub struct UserRow {
    pub id: Id,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub count: i64,
}

impl From<UserRow> for User {
    fn from(value: UserRow) -> Self {
        Self {
            id: value.id,
            email: value.email,
            username: value.username,
            first_name: value.first_name,
            last_name: value.last_name,
            password: value.password,
        }
    }
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: Id,
    pub name: String,
    pub color: String,
    pub slug: String,
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize, Deserialize)]
pub struct Ingredient {
    pub id: Id,
    pub name: String,
    pub measurement_unit: String,
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize)]
pub struct Recipe {
    pub id: Id,
    pub author_id: Id,
    pub name: String,
    pub image: String,
    pub text: String,
    pub cooking_time: i32,
    pub pub_date: DateTime<Utc>,
}

/// Recipe row with the windowed total for paginated listings.
#[derive(sqlx::FromRow, Debug, Clone, Serialize)]
pub struct RecipeRow {
    pub id: Id,
    pub author_id: Id,
    pub name: String,
    pub image: String,
    pub text: String,
    pub cooking_time: i32,
    pub pub_date: DateTime<Utc>,
    pub count: i64,
}

impl From<RecipeRow> for Recipe {
    fn from(value: RecipeRow) -> Self {
        Self {
            id: value.id,
            author_id: value.author_id,
            name: value.name,
            image: value.image,
            text: value.text,
            cooking_time: value.cooking_time,
            pub_date: value.pub_date,
        }
    }
}

/// One ingredient link of a recipe, joined with the catalog row.
#[derive(sqlx::FromRow, Debug, Clone, Serialize)]
pub struct RecipeIngredient {
    pub recipe_id: Id,
    pub ingredient_id: Id,
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

/// Raw (name, unit, amount) row collected from every recipe in a user's
/// shopping cart, before grouping.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct CartIngredientRow {
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

/// One grouped line of the exported shopping list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShoppingListEntry {
    pub name: String,
    pub measurement_unit: String,
    pub total_amount: i64,
}
