use std::collections::BTreeMap;

use sqlx::{Pool, Postgres, QueryBuilder, Transaction};

use crate::{
    authentication::{
        cryptography::{hash_password, verify_password},
        jwt::{generate_jwt_session, SessionData},
        permissions::ensure_author,
    },
    constants::{RECIPE_COUNT_PER_PAGE, SUBSCRIPTION_COUNT_PER_PAGE},
};

use super::{
    error::{Error, QueryError},
    form::{IngredientAmount, IngredientForm, RecipeForm, RecipeUpdateForm, RegisterForm, TagForm},
    pagination::PageContext,
    schema::{
        CartIngredientRow, Id, Ingredient, Recipe, RecipeIngredient, RecipeRow, ShoppingListEntry,
        Tag, User, UserRow,
    },
};

pub async fn run_migrations(pool: &Pool<Postgres>) -> Result<(), Error> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| Error::Internal(format!("{e}")))
}

/* Users */

pub async fn get_user(pool: &Pool<Postgres>, username: &str) -> Result<Option<User>, Error> {
    let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE username = $1")
        .bind(username)
        .fetch_optional(&*pool)
        .await
        .map_err(|e| Error::from(QueryError::from(e)))?;

    Ok(row)
}

pub async fn get_user_by_id(pool: &Pool<Postgres>, user_id: Id) -> Result<Option<User>, Error> {
    let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(&*pool)
        .await
        .map_err(|e| Error::from(QueryError::from(e)))?;

    Ok(row)
}

/// Creates an account. The stored password is an argon2 hash, never the
/// plain text one.
pub async fn register_user(form: RegisterForm, pool: &Pool<Postgres>) -> Result<Id, Error> {
    form.validate()?;
    let password = hash_password(&form.password)?;

    let row: Option<(Id,)> = sqlx::query_as(
        "
        INSERT INTO users (email, username, first_name, last_name, password)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT DO NOTHING RETURNING id;
    ",
    )
    .bind(&form.email)
    .bind(&form.username)
    .bind(&form.first_name)
    .bind(&form.last_name)
    .bind(password)
    .fetch_optional(&*pool)
    .await
    .map_err(|e| Error::from(QueryError::from(e)))?;

    match row {
        Some(row) => Ok(row.0),
        None => Err(Error::Conflict(String::from(
            "A user with this email or username already exists",
        ))),
    }
}

pub async fn login_user(
    username: &str,
    password: &str,
    pool: &Pool<Postgres>,
) -> Result<String, Error> {
    let user = match get_user(pool, username).await? {
        Some(user) => user,
        None => return Err(Error::Unauthorized(String::from("Invalid credentials"))),
    };

    let authenticated = verify_password(password, &user.password)?;
    if !authenticated {
        return Err(Error::Unauthorized(String::from("Invalid credentials")));
    }

    Ok(generate_jwt_session(&user))
}

/* Tags */

pub async fn create_tag(form: TagForm, pool: &Pool<Postgres>) -> Result<Id, Error> {
    form.validate()?;

    let row: Option<(Id,)> = sqlx::query_as(
        "INSERT INTO tags (name, color, slug) VALUES ($1, $2, $3) ON CONFLICT DO NOTHING RETURNING id",
    )
    .bind(&form.name)
    .bind(&form.color)
    .bind(&form.slug)
    .fetch_optional(pool)
    .await
    .map_err(|e| Error::from(QueryError::from(e)))?;

    match row {
        Some(row) => Ok(row.0),
        None => Err(Error::Conflict(String::from(
            "Tag name, color and slug must all be unique",
        ))),
    }
}

pub async fn get_tag(id: Id, pool: &Pool<Postgres>) -> Result<Option<Tag>, Error> {
    let row: Option<Tag> = sqlx::query_as("SELECT * FROM tags WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| Error::from(QueryError::from(e)))?;

    Ok(row)
}

pub async fn list_tags(pool: &Pool<Postgres>) -> Result<Vec<Tag>, Error> {
    let rows: Vec<Tag> = sqlx::query_as("SELECT * FROM tags ORDER BY name")
        .fetch_all(pool)
        .await
        .map_err(|e| Error::from(QueryError::from(e)))?;

    Ok(rows)
}

async fn get_tags(ids: &[Id], pool: &Pool<Postgres>) -> Result<Vec<Tag>, Error> {
    let rows: Vec<Tag> = sqlx::query_as("SELECT * FROM tags WHERE id = ANY($1)")
        .bind(ids.to_vec())
        .fetch_all(pool)
        .await
        .map_err(|e| Error::from(QueryError::from(e)))?;

    Ok(rows)
}

/* Ingredients */

pub async fn create_ingredient(form: IngredientForm, pool: &Pool<Postgres>) -> Result<Id, Error> {
    form.validate()?;

    let row: Option<(Id,)> = sqlx::query_as(
        "
        INSERT INTO ingredients (name, measurement_unit)
        VALUES ($1, $2)
        ON CONFLICT DO NOTHING RETURNING id;
    ",
    )
    .bind(&form.name)
    .bind(&form.measurement_unit)
    .fetch_optional(pool)
    .await
    .map_err(|e| Error::from(QueryError::from(e)))?;

    match row {
        Some(row) => Ok(row.0),
        None => Err(Error::Conflict(String::from(
            "This ingredient and measurement unit pair already exists",
        ))),
    }
}

pub async fn get_ingredient(id: Id, pool: &Pool<Postgres>) -> Result<Option<Ingredient>, Error> {
    let row: Option<Ingredient> = sqlx::query_as("SELECT * FROM ingredients WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| Error::from(QueryError::from(e)))?;

    Ok(row)
}

pub async fn list_ingredients(pool: &Pool<Postgres>) -> Result<Vec<Ingredient>, Error> {
    let rows: Vec<Ingredient> = sqlx::query_as("SELECT * FROM ingredients ORDER BY name")
        .fetch_all(pool)
        .await
        .map_err(|e| Error::from(QueryError::from(e)))?;

    Ok(rows)
}

/// Case-insensitive name prefix search, unpaginated.
pub async fn search_ingredients(
    prefix: &str,
    pool: &Pool<Postgres>,
) -> Result<Vec<Ingredient>, Error> {
    let rows: Vec<Ingredient> =
        sqlx::query_as("SELECT * FROM ingredients WHERE name ILIKE $1 ORDER BY name")
            .bind(format!("{prefix}%"))
            .fetch_all(pool)
            .await
            .map_err(|e| Error::from(QueryError::from(e)))?;

    Ok(rows)
}

async fn get_ingredients(ids: &[Id], pool: &Pool<Postgres>) -> Result<Vec<Ingredient>, Error> {
    let rows: Vec<Ingredient> = sqlx::query_as("SELECT * FROM ingredients WHERE id = ANY($1)")
        .bind(ids.to_vec())
        .fetch_all(pool)
        .await
        .map_err(|e| Error::from(QueryError::from(e)))?;

    Ok(rows)
}

/// Deletion is blocked by the database while any recipe still references
/// the ingredient.
pub async fn delete_ingredient(id: Id, pool: &Pool<Postgres>) -> Result<(), Error> {
    let result = sqlx::query("DELETE FROM ingredients WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| {
            let e = QueryError::from(e);
            if e.is_foreign_key_violation() {
                Error::Protected(String::from(
                    "Ingredient is used by at least one recipe and cannot be deleted",
                ))
            } else {
                e.into()
            }
        })?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(String::from(
            "No ingredient exists with specified id",
        )));
    }

    Ok(())
}

/* Recipes */

pub async fn get_recipe(id: Id, pool: &Pool<Postgres>) -> Result<Option<Recipe>, Error> {
    let row: Option<Recipe> = sqlx::query_as("SELECT * FROM recipes WHERE id = $1")
        .bind(id)
        .fetch_optional(&*pool)
        .await
        .map_err(|e| Error::from(QueryError::from(e)))?;

    Ok(row)
}

/// Case-insensitive (author, name) lookup. `exclude_id` leaves one recipe
/// out of the search, so a recipe never collides with itself on rename.
pub async fn find_recipe(
    author_id: Id,
    name: &str,
    exclude_id: Option<Id>,
    pool: &Pool<Postgres>,
) -> Result<Option<Id>, Error> {
    let row: Option<(Id,)> = sqlx::query_as(
        "
        SELECT id FROM recipes
        WHERE author_id = $1 AND LOWER(name) = LOWER($2) AND id IS DISTINCT FROM $3
    ",
    )
    .bind(author_id)
    .bind(name)
    .bind(exclude_id)
    .fetch_optional(&*pool)
    .await
    .map_err(|e| Error::from(QueryError::from(e)))?;

    Ok(row.map(|r| r.0))
}

/// The uniqueness rule folds case across the full alphabet, not just
/// ASCII; recipe names here are routinely Cyrillic.
pub fn recipe_names_match(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

/// Resolves a recipe for mutation: the recipe must exist and the session
/// user must be its author.
pub async fn get_recipe_mut(
    id: Id,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<Recipe, Error> {
    match get_recipe(id, pool).await? {
        Some(recipe) => {
            ensure_author(session, recipe.author_id)?;
            Ok(recipe)
        }
        None => Err(Error::NotFound(String::from(
            "No recipe exists with specified id",
        ))),
    }
}

/// The author is always the session user; the recipe row and the full tag
/// and ingredient link sets are written in one transaction.
pub async fn create_recipe(
    session: &SessionData,
    form: RecipeForm,
    pool: &Pool<Postgres>,
) -> Result<Id, Error> {
    form.validate()?;
    check_tags_exist(&form.tags, pool).await?;
    check_ingredients_exist(&form.ingredients, pool).await?;

    if find_recipe(session.user_id, &form.name, None, pool)
        .await?
        .is_some()
    {
        return Err(Error::Conflict(String::from(
            "An author cannot have two recipes with the same name",
        )));
    }

    let mut tx = pool.begin().await.map_err(|e| Error::from(QueryError::from(e)))?;

    let id: (Id,) = sqlx::query_as(
        "
        INSERT INTO recipes (author_id, name, image, text, cooking_time)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
    ",
    )
    .bind(session.user_id)
    .bind(&form.name)
    .bind(&form.image)
    .bind(&form.text)
    .bind(form.cooking_time)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| Error::from(QueryError::from(e)))?;

    insert_tag_links(id.0, &form.tags, &mut tx).await?;
    insert_ingredient_links(id.0, &form.ingredients, &mut tx).await?;

    tx.commit().await.map_err(|e| Error::from(QueryError::from(e)))?;

    Ok(id.0)
}

/// Fields absent from the form keep their stored value; a present tag or
/// ingredient list replaces the stored links wholesale (clear-then-set).
pub async fn update_recipe(
    id: Id,
    session: &SessionData,
    form: RecipeUpdateForm,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    form.validate()?;
    let recipe = get_recipe_mut(id, session, pool).await?;

    if let Some(name) = &form.name {
        // A case-only rename of the recipe itself is always allowed.
        if !recipe_names_match(name, &recipe.name)
            && find_recipe(recipe.author_id, name, Some(recipe.id), pool)
                .await?
                .is_some()
        {
            return Err(Error::Conflict(String::from(
                "An author cannot have two recipes with the same name",
            )));
        }
    }
    if let Some(tags) = &form.tags {
        check_tags_exist(tags, pool).await?;
    }
    if let Some(ingredients) = &form.ingredients {
        check_ingredients_exist(ingredients, pool).await?;
    }

    let mut tx = pool.begin().await.map_err(|e| Error::from(QueryError::from(e)))?;

    sqlx::query(
        "
        UPDATE recipes SET
        name = COALESCE($1, name),
        image = COALESCE($2, image),
        text = COALESCE($3, text),
        cooking_time = COALESCE($4, cooking_time)
        WHERE id = $5
    ",
    )
    .bind(&form.name)
    .bind(&form.image)
    .bind(&form.text)
    .bind(form.cooking_time)
    .bind(id)
    .execute(&mut *tx)
    .await
    .map_err(|e| Error::from(QueryError::from(e)))?;

    if let Some(tags) = &form.tags {
        sqlx::query("DELETE FROM recipe_tags WHERE recipe_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::from(QueryError::from(e)))?;
        insert_tag_links(id, tags, &mut tx).await?;
    }

    if let Some(ingredients) = &form.ingredients {
        sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::from(QueryError::from(e)))?;
        insert_ingredient_links(id, ingredients, &mut tx).await?;
    }

    tx.commit().await.map_err(|e| Error::from(QueryError::from(e)))?;

    Ok(())
}

pub async fn delete_recipe(
    id: Id,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    get_recipe_mut(id, session, pool).await?;

    sqlx::query("DELETE FROM recipes WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| Error::from(QueryError::from(e)))?;

    Ok(())
}

async fn check_tags_exist(ids: &[Id], pool: &Pool<Postgres>) -> Result<(), Error> {
    let found = get_tags(ids, pool).await?;
    if found.len() != ids.len() {
        return Err(Error::NotFound(String::from(
            "No tag exists with specified id",
        )));
    }
    Ok(())
}

async fn check_ingredients_exist(
    ingredients: &[IngredientAmount],
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    let ids: Vec<Id> = ingredients.iter().map(|i| i.id).collect();
    let found = get_ingredients(&ids, pool).await?;
    if found.len() != ids.len() {
        return Err(Error::NotFound(String::from(
            "No ingredient exists with specified id",
        )));
    }
    Ok(())
}

async fn insert_tag_links(
    recipe_id: Id,
    tag_ids: &[Id],
    tx: &mut Transaction<'_, Postgres>,
) -> Result<(), Error> {
    if tag_ids.is_empty() {
        return Ok(());
    }

    let mut query_builder: QueryBuilder<Postgres> =
        QueryBuilder::new("INSERT INTO recipe_tags (recipe_id, tag_id) ");

    query_builder.push_values(tag_ids.iter(), |mut b, tag_id| {
        b.push_bind(recipe_id).push_bind(*tag_id);
    });

    query_builder
        .build()
        .execute(&mut **tx)
        .await
        .map_err(|e| Error::from(QueryError::from(e)))?;

    Ok(())
}

async fn insert_ingredient_links(
    recipe_id: Id,
    ingredients: &[IngredientAmount],
    tx: &mut Transaction<'_, Postgres>,
) -> Result<(), Error> {
    if ingredients.is_empty() {
        return Ok(());
    }

    let mut query_builder: QueryBuilder<Postgres> =
        QueryBuilder::new("INSERT INTO recipe_ingredients (recipe_id, ingredient_id, amount) ");

    query_builder.push_values(ingredients.iter(), |mut b, ingredient| {
        b.push_bind(recipe_id)
            .push_bind(ingredient.id)
            .push_bind(ingredient.amount);
    });

    query_builder
        .build()
        .execute(&mut **tx)
        .await
        .map_err(|e| Error::from(QueryError::from(e)))?;

    Ok(())
}

pub async fn list_recipe_tags(recipe_id: Id, pool: &Pool<Postgres>) -> Result<Vec<Tag>, Error> {
    let rows: Vec<Tag> = sqlx::query_as(
        "
        SELECT t.* FROM recipe_tags rt
        INNER JOIN tags t ON t.id = rt.tag_id
        WHERE rt.recipe_id = $1
        ORDER BY t.name
    ",
    )
    .bind(recipe_id)
    .fetch_all(pool)
    .await
    .map_err(|e| Error::from(QueryError::from(e)))?;

    Ok(rows)
}

pub async fn list_recipe_ingredients(
    recipe_id: Id,
    pool: &Pool<Postgres>,
) -> Result<Vec<RecipeIngredient>, Error> {
    let rows: Vec<RecipeIngredient> = sqlx::query_as(
        "
        SELECT ri.recipe_id AS recipe_id, i.id AS ingredient_id, i.name AS name,
               i.measurement_unit AS measurement_unit, ri.amount AS amount
        FROM recipe_ingredients ri
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE ri.recipe_id = $1
        ORDER BY i.name
    ",
    )
    .bind(recipe_id)
    .fetch_all(pool)
    .await
    .map_err(|e| Error::from(QueryError::from(e)))?;

    Ok(rows)
}

/* Recipe listing */

#[derive(Debug, Default, Clone)]
pub struct RecipeFilter {
    pub author: Option<Id>,
    /// Tag slugs; a recipe matches when it carries any of the listed tags.
    pub tags: Vec<String>,
    pub is_favorited: Option<bool>,
    pub is_in_shopping_cart: Option<bool>,
    /// Authenticated viewer, if any.
    pub viewer: Option<Id>,
}

impl RecipeFilter {
    pub fn requires_viewer(&self) -> bool {
        self.is_favorited.is_some() || self.is_in_shopping_cart.is_some()
    }
}

/// Newest first. Viewer-relative filters from an unauthenticated caller
/// yield the empty page instead of an error.
pub async fn fetch_recipes(
    filter: &RecipeFilter,
    offset: i64,
    pool: &Pool<Postgres>,
) -> Result<PageContext<RecipeRow>, Error> {
    if filter.requires_viewer() && filter.viewer.is_none() {
        return Ok(PageContext::no_rows());
    }

    let mut query_builder: QueryBuilder<Postgres> =
        QueryBuilder::new("SELECT r.*, COUNT(*) OVER() AS count FROM recipes r WHERE TRUE");

    if let Some(author) = filter.author {
        query_builder.push(" AND r.author_id = ").push_bind(author);
    }

    if !filter.tags.is_empty() {
        query_builder
            .push(
                " AND EXISTS (SELECT 1 FROM recipe_tags rt INNER JOIN tags t ON t.id = rt.tag_id \
                 WHERE rt.recipe_id = r.id AND t.slug = ANY(",
            )
            .push_bind(filter.tags.clone())
            .push("))");
    }

    if let (Some(value), Some(viewer)) = (filter.is_favorited, filter.viewer) {
        query_builder
            .push(if value { " AND EXISTS" } else { " AND NOT EXISTS" })
            .push(" (SELECT 1 FROM user_favorites f WHERE f.recipe_id = r.id AND f.user_id = ")
            .push_bind(viewer)
            .push(")");
    }

    if let (Some(value), Some(viewer)) = (filter.is_in_shopping_cart, filter.viewer) {
        query_builder
            .push(if value { " AND EXISTS" } else { " AND NOT EXISTS" })
            .push(" (SELECT 1 FROM shopping_carts sc WHERE sc.recipe_id = r.id AND sc.user_id = ")
            .push_bind(viewer)
            .push(")");
    }

    query_builder
        .push(" ORDER BY r.pub_date DESC LIMIT ")
        .push_bind(RECIPE_COUNT_PER_PAGE)
        .push(" OFFSET ")
        .push_bind(offset);

    let rows: Vec<RecipeRow> = query_builder
        .build_query_as::<RecipeRow>()
        .fetch_all(pool)
        .await
        .map_err(|e| Error::from(QueryError::from(e)))?;

    let total_count = rows.first().map(|r| r.count).unwrap_or(0);
    Ok(PageContext::from_rows(
        rows,
        total_count,
        RECIPE_COUNT_PER_PAGE,
        offset,
    ))
}

pub async fn list_author_recipes(
    author_id: Id,
    limit: Option<i64>,
    pool: &Pool<Postgres>,
) -> Result<Vec<Recipe>, Error> {
    // LIMIT NULL reads as no limit.
    let rows: Vec<Recipe> = sqlx::query_as(
        "SELECT * FROM recipes WHERE author_id = $1 ORDER BY pub_date DESC LIMIT $2",
    )
    .bind(author_id)
    .bind(limit)
    .fetch_all(pool)
    .await
    .map_err(|e| Error::from(QueryError::from(e)))?;

    Ok(rows)
}

pub async fn count_author_recipes(author_id: Id, pool: &Pool<Postgres>) -> Result<i64, Error> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM recipes WHERE author_id = $1")
        .bind(author_id)
        .fetch_one(pool)
        .await
        .map_err(|e| Error::from(QueryError::from(e)))?;

    Ok(row.0)
}

/* Favorites */

pub async fn is_favorite(recipe_id: Id, user_id: Id, pool: &Pool<Postgres>) -> Result<bool, Error> {
    let row: Option<(Id,)> = sqlx::query_as(
        "SELECT recipe_id FROM user_favorites WHERE recipe_id = $1 AND user_id = $2",
    )
    .bind(recipe_id)
    .bind(user_id)
    .fetch_optional(&*pool)
    .await
    .map_err(|e| Error::from(QueryError::from(e)))?;

    Ok(row.is_some())
}

pub async fn add_to_favorites(
    recipe_id: Id,
    user_id: Id,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    if get_recipe(recipe_id, pool).await?.is_none() {
        return Err(Error::NotFound(String::from(
            "No recipe exists with specified id",
        )));
    }

    let result = sqlx::query(
        "INSERT INTO user_favorites (user_id, recipe_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(user_id)
    .bind(recipe_id)
    .execute(pool)
    .await
    .map_err(|e| Error::from(QueryError::from(e)))?;

    if result.rows_affected() == 0 {
        return Err(Error::Conflict(String::from(
            "Recipe is already in favorites",
        )));
    }

    Ok(())
}

pub async fn remove_from_favorites(
    recipe_id: Id,
    user_id: Id,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    if get_recipe(recipe_id, pool).await?.is_none() {
        return Err(Error::NotFound(String::from(
            "No recipe exists with specified id",
        )));
    }

    let result = sqlx::query("DELETE FROM user_favorites WHERE user_id = $1 AND recipe_id = $2")
        .bind(user_id)
        .bind(recipe_id)
        .execute(pool)
        .await
        .map_err(|e| Error::from(QueryError::from(e)))?;

    if result.rows_affected() == 0 {
        return Err(Error::NotInCollection(String::from(
            "Recipe is not in favorites",
        )));
    }

    Ok(())
}

pub async fn fetch_favorites(
    user_id: Id,
    offset: i64,
    pool: &Pool<Postgres>,
) -> Result<PageContext<RecipeRow>, Error> {
    let rows: Vec<RecipeRow> = sqlx::query_as(
        "
        SELECT r.*, COUNT(*) OVER() AS count
        FROM user_favorites f
        INNER JOIN recipes r ON r.id = f.recipe_id
        WHERE f.user_id = $1
        ORDER BY r.pub_date DESC LIMIT $2 OFFSET $3
    ",
    )
    .bind(user_id)
    .bind(RECIPE_COUNT_PER_PAGE)
    .bind(offset)
    .fetch_all(pool)
    .await
    .map_err(|e| Error::from(QueryError::from(e)))?;

    let total_count = rows.first().map(|r| r.count).unwrap_or(0);
    Ok(PageContext::from_rows(
        rows,
        total_count,
        RECIPE_COUNT_PER_PAGE,
        offset,
    ))
}

/* Shopping cart */

pub async fn is_in_shopping_cart(
    recipe_id: Id,
    user_id: Id,
    pool: &Pool<Postgres>,
) -> Result<bool, Error> {
    let row: Option<(Id,)> = sqlx::query_as(
        "SELECT recipe_id FROM shopping_carts WHERE recipe_id = $1 AND user_id = $2",
    )
    .bind(recipe_id)
    .bind(user_id)
    .fetch_optional(&*pool)
    .await
    .map_err(|e| Error::from(QueryError::from(e)))?;

    Ok(row.is_some())
}

pub async fn add_to_shopping_cart(
    recipe_id: Id,
    user_id: Id,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    if get_recipe(recipe_id, pool).await?.is_none() {
        return Err(Error::NotFound(String::from(
            "No recipe exists with specified id",
        )));
    }

    let result = sqlx::query(
        "INSERT INTO shopping_carts (user_id, recipe_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(user_id)
    .bind(recipe_id)
    .execute(pool)
    .await
    .map_err(|e| Error::from(QueryError::from(e)))?;

    if result.rows_affected() == 0 {
        return Err(Error::Conflict(String::from(
            "Recipe is already in the shopping cart",
        )));
    }

    Ok(())
}

pub async fn remove_from_shopping_cart(
    recipe_id: Id,
    user_id: Id,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    if get_recipe(recipe_id, pool).await?.is_none() {
        return Err(Error::NotFound(String::from(
            "No recipe exists with specified id",
        )));
    }

    let result = sqlx::query("DELETE FROM shopping_carts WHERE user_id = $1 AND recipe_id = $2")
        .bind(user_id)
        .bind(recipe_id)
        .execute(pool)
        .await
        .map_err(|e| Error::from(QueryError::from(e)))?;

    if result.rows_affected() == 0 {
        return Err(Error::NotInCollection(String::from(
            "Recipe is not in the shopping cart",
        )));
    }

    Ok(())
}

/* Shopping list export */

pub async fn list_cart_ingredients(
    user_id: Id,
    pool: &Pool<Postgres>,
) -> Result<Vec<CartIngredientRow>, Error> {
    let rows: Vec<CartIngredientRow> = sqlx::query_as(
        "
        SELECT i.name AS name, i.measurement_unit AS measurement_unit, ri.amount AS amount
        FROM shopping_carts sc
        INNER JOIN recipe_ingredients ri ON ri.recipe_id = sc.recipe_id
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE sc.user_id = $1
    ",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .map_err(|e| Error::from(QueryError::from(e)))?;

    Ok(rows)
}

/// Groups cart rows by (name, unit) and sums the amounts. The BTreeMap
/// keeps the output sorted by ingredient name, so the export is stable for
/// a fixed cart state.
pub fn aggregate_shopping_list(rows: Vec<CartIngredientRow>) -> Vec<ShoppingListEntry> {
    let mut groups: BTreeMap<(String, String), i64> = BTreeMap::new();
    for row in rows {
        *groups
            .entry((row.name, row.measurement_unit))
            .or_insert(0) += i64::from(row.amount);
    }

    groups
        .into_iter()
        .map(|((name, measurement_unit), total_amount)| ShoppingListEntry {
            name,
            measurement_unit,
            total_amount,
        })
        .collect()
}

pub fn render_shopping_list(entries: &[ShoppingListEntry]) -> String {
    use crate::constants::{SHOPPING_LIST_EMPTY, SHOPPING_LIST_HEADER};

    let mut content = String::from(SHOPPING_LIST_HEADER);
    if entries.is_empty() {
        content.push('\n');
        content.push_str(SHOPPING_LIST_EMPTY);
        return content;
    }

    for entry in entries {
        content.push_str(&format!(
            "\n- {} ({}) - {}",
            entry.name, entry.measurement_unit, entry.total_amount
        ));
    }
    content
}

/// Full read-side export for a user's cart. No side effects.
pub async fn build_shopping_list(user_id: Id, pool: &Pool<Postgres>) -> Result<String, Error> {
    let rows = list_cart_ingredients(user_id, pool).await?;
    let entries = aggregate_shopping_list(rows);
    Ok(render_shopping_list(&entries))
}

/* Subscriptions */

pub async fn is_subscribed(user_id: Id, author_id: Id, pool: &Pool<Postgres>) -> Result<bool, Error> {
    let row: Option<(Id,)> = sqlx::query_as(
        "SELECT author_id FROM subscriptions WHERE user_id = $1 AND author_id = $2",
    )
    .bind(user_id)
    .bind(author_id)
    .fetch_optional(&*pool)
    .await
    .map_err(|e| Error::from(QueryError::from(e)))?;

    Ok(row.is_some())
}

pub async fn subscribe(user_id: Id, author_id: Id, pool: &Pool<Postgres>) -> Result<(), Error> {
    if user_id == author_id {
        return Err(Error::Conflict(String::from(
            "Subscribing to yourself is not possible",
        )));
    }
    if get_user_by_id(pool, author_id).await?.is_none() {
        return Err(Error::NotFound(String::from(
            "No user exists with specified id",
        )));
    }

    let result = sqlx::query(
        "INSERT INTO subscriptions (user_id, author_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(user_id)
    .bind(author_id)
    .execute(pool)
    .await
    .map_err(|e| Error::from(QueryError::from(e)))?;

    if result.rows_affected() == 0 {
        return Err(Error::Conflict(String::from(
            "Subscribing twice to the same author is not possible",
        )));
    }

    Ok(())
}

pub async fn unsubscribe(user_id: Id, author_id: Id, pool: &Pool<Postgres>) -> Result<(), Error> {
    if get_user_by_id(pool, author_id).await?.is_none() {
        return Err(Error::NotFound(String::from(
            "No user exists with specified id",
        )));
    }

    let result = sqlx::query("DELETE FROM subscriptions WHERE user_id = $1 AND author_id = $2")
        .bind(user_id)
        .bind(author_id)
        .execute(pool)
        .await
        .map_err(|e| Error::from(QueryError::from(e)))?;

    if result.rows_affected() == 0 {
        return Err(Error::NotInCollection(String::from(
            "Author is not in subscriptions",
        )));
    }

    Ok(())
}

pub async fn fetch_subscriptions(
    user_id: Id,
    offset: i64,
    pool: &Pool<Postgres>,
) -> Result<PageContext<User>, Error> {
    let rows: Vec<UserRow> = sqlx::query_as(
        "
        SELECT u.*, COUNT(*) OVER() AS count
        FROM subscriptions s
        INNER JOIN users u ON u.id = s.author_id
        WHERE s.user_id = $1
        ORDER BY u.id LIMIT $2 OFFSET $3
    ",
    )
    .bind(user_id)
    .bind(SUBSCRIPTION_COUNT_PER_PAGE)
    .bind(offset)
    .fetch_all(pool)
    .await
    .map_err(|e| Error::from(QueryError::from(e)))?;

    let total_count = rows.first().map(|r| r.count).unwrap_or(0);
    Ok(
        PageContext::from_rows(rows, total_count, SUBSCRIPTION_COUNT_PER_PAGE, offset)
            .map(User::from),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, unit: &str, amount: i32) -> CartIngredientRow {
        CartIngredientRow {
            name: name.to_string(),
            measurement_unit: unit.to_string(),
            amount,
        }
    }

    #[test]
    fn aggregation_sums_equal_name_unit_pairs() {
        let entries = aggregate_shopping_list(vec![row("Flour", "g", 2), row("Flour", "g", 3)]);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "Flour");
        assert_eq!(entries[0].measurement_unit, "g");
        assert_eq!(entries[0].total_amount, 5);
    }

    #[test]
    fn aggregation_keeps_different_units_apart() {
        let entries = aggregate_shopping_list(vec![row("Milk", "ml", 200), row("Milk", "l", 1)]);
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn aggregation_orders_by_name_ascending() {
        let entries = aggregate_shopping_list(vec![
            row("Salt", "g", 5),
            row("Flour", "g", 100),
            row("Milk", "ml", 200),
        ]);
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Flour", "Milk", "Salt"]);
    }

    #[test]
    fn rendered_list_matches_the_wire_format() {
        let entries = aggregate_shopping_list(vec![row("Flour", "g", 2), row("Flour", "g", 3)]);
        let content = render_shopping_list(&entries);
        assert_eq!(content, "Список покупок:\n- Flour (g) - 5");
    }

    #[test]
    fn empty_cart_renders_the_fixed_message() {
        let content = render_shopping_list(&[]);
        assert_eq!(
            content,
            "Список покупок:\nВ Списке покупок отсутствуют рецепты."
        );
    }

    #[test]
    fn name_matching_folds_case_beyond_ascii() {
        assert!(recipe_names_match("Soup", "soup"));
        assert!(recipe_names_match("Борщ", "борщ"));
        assert!(recipe_names_match("БОРЩ", "борщ"));
        assert!(!recipe_names_match("Борщ", "Борщ украинский"));
        assert!(!recipe_names_match("Soup", "Stew"));
    }

    #[test]
    fn viewer_filters_require_a_viewer() {
        let filter = RecipeFilter {
            is_favorited: Some(true),
            ..Default::default()
        };
        assert!(filter.requires_viewer());

        let filter = RecipeFilter {
            is_in_shopping_cart: Some(false),
            ..Default::default()
        };
        assert!(filter.requires_viewer());

        let filter = RecipeFilter {
            author: Some(1),
            tags: vec![String::from("breakfast")],
            ..Default::default()
        };
        assert!(!filter.requires_viewer());
    }
}
