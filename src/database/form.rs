use std::collections::HashSet;

use serde::Deserialize;

use crate::constants::{
    MAX_COLOR_LENGTH, MAX_COOKING_TIME, MAX_EMAIL_LENGTH, MAX_INGREDIENT_AMOUNT, MAX_NAME_LENGTH,
    MAX_USERNAME_LENGTH, MIN_COOKING_TIME, MIN_INGREDIENT_AMOUNT,
};

use super::{
    error::Error,
    schema::Id,
    validate::{
        validate_email, validate_hex_color, validate_length, validate_range, validate_slug,
        validate_username,
    },
};

#[derive(Deserialize, Debug, Clone)]
pub struct RegisterForm {
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

impl RegisterForm {
    pub fn validate(&self) -> Result<(), Error> {
        validate_length("email", &self.email, MAX_EMAIL_LENGTH)?;
        validate_email(&self.email)?;
        validate_length("username", &self.username, MAX_USERNAME_LENGTH)?;
        validate_username(&self.username)?;
        validate_length("first_name", &self.first_name, MAX_USERNAME_LENGTH)?;
        validate_length("last_name", &self.last_name, MAX_USERNAME_LENGTH)?;
        validate_length("password", &self.password, MAX_USERNAME_LENGTH)?;
        Ok(())
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct TagForm {
    pub name: String,
    pub color: String,
    pub slug: String,
}

impl TagForm {
    pub fn validate(&self) -> Result<(), Error> {
        validate_length("name", &self.name, MAX_NAME_LENGTH)?;
        validate_length("color", &self.color, MAX_COLOR_LENGTH)?;
        validate_hex_color(&self.color)?;
        validate_length("slug", &self.slug, MAX_NAME_LENGTH)?;
        validate_slug(&self.slug)?;
        Ok(())
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct IngredientForm {
    pub name: String,
    pub measurement_unit: String,
}

impl IngredientForm {
    pub fn validate(&self) -> Result<(), Error> {
        validate_length("name", &self.name, MAX_NAME_LENGTH)?;
        validate_length("measurement_unit", &self.measurement_unit, MAX_NAME_LENGTH)?;
        Ok(())
    }
}

/// One (ingredient id, amount) pair of a recipe payload.
#[derive(Deserialize, Debug, Clone)]
pub struct IngredientAmount {
    pub id: Id,
    pub amount: i32,
}

#[derive(Deserialize, Debug, Clone)]
pub struct RecipeForm {
    pub name: String,
    pub image: String,
    pub text: String,
    pub cooking_time: i32,
    pub tags: Vec<Id>,
    pub ingredients: Vec<IngredientAmount>,
}

impl RecipeForm {
    pub fn validate(&self) -> Result<(), Error> {
        validate_length("name", &self.name, MAX_NAME_LENGTH)?;
        validate_length("text", &self.text, usize::MAX)?;
        validate_range(
            "cooking_time",
            self.cooking_time,
            MIN_COOKING_TIME,
            MAX_COOKING_TIME,
        )?;
        validate_tag_ids(&self.tags)?;
        validate_ingredient_amounts(&self.ingredients)?;
        Ok(())
    }
}

/// Partial recipe payload: absent fields are preserved on update, present
/// tag/ingredient lists fully replace the stored ones.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct RecipeUpdateForm {
    pub name: Option<String>,
    pub image: Option<String>,
    pub text: Option<String>,
    pub cooking_time: Option<i32>,
    pub tags: Option<Vec<Id>>,
    pub ingredients: Option<Vec<IngredientAmount>>,
}

impl RecipeUpdateForm {
    pub fn validate(&self) -> Result<(), Error> {
        if let Some(name) = &self.name {
            validate_length("name", name, MAX_NAME_LENGTH)?;
        }
        if let Some(text) = &self.text {
            validate_length("text", text, usize::MAX)?;
        }
        if let Some(cooking_time) = self.cooking_time {
            validate_range(
                "cooking_time",
                cooking_time,
                MIN_COOKING_TIME,
                MAX_COOKING_TIME,
            )?;
        }
        if let Some(tags) = &self.tags {
            validate_tag_ids(tags)?;
        }
        if let Some(ingredients) = &self.ingredients {
            validate_ingredient_amounts(ingredients)?;
        }
        Ok(())
    }
}

fn validate_tag_ids(tags: &[Id]) -> Result<(), Error> {
    if tags.is_empty() {
        return Err(Error::Validation(String::from(
            "At least one recipe tag is required",
        )));
    }
    let unique: HashSet<Id> = tags.iter().copied().collect();
    if unique.len() != tags.len() {
        return Err(Error::Validation(String::from(
            "Recipe tags must not repeat",
        )));
    }
    Ok(())
}

fn validate_ingredient_amounts(ingredients: &[IngredientAmount]) -> Result<(), Error> {
    if ingredients.is_empty() {
        return Err(Error::Validation(String::from(
            "At least one recipe ingredient is required",
        )));
    }
    let unique: HashSet<Id> = ingredients.iter().map(|i| i.id).collect();
    if unique.len() != ingredients.len() {
        return Err(Error::Validation(String::from(
            "Recipe ingredients must not repeat",
        )));
    }
    for ingredient in ingredients {
        validate_range(
            "amount",
            ingredient.amount,
            MIN_INGREDIENT_AMOUNT,
            MAX_INGREDIENT_AMOUNT,
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recipe_form() -> RecipeForm {
        RecipeForm {
            name: String::from("Borscht"),
            image: String::from("recipes/images/borscht.png"),
            text: String::from("Simmer for an hour."),
            cooking_time: 60,
            tags: vec![1, 2],
            ingredients: vec![
                IngredientAmount { id: 1, amount: 2 },
                IngredientAmount { id: 2, amount: 300 },
            ],
        }
    }

    #[test]
    fn valid_recipe_passes() {
        assert!(recipe_form().validate().is_ok());
    }

    #[test]
    fn rejects_empty_tag_list() {
        let mut form = recipe_form();
        form.tags.clear();
        assert!(matches!(form.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn rejects_duplicate_tags() {
        let mut form = recipe_form();
        form.tags = vec![1, 1];
        assert!(matches!(form.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn rejects_empty_ingredient_list() {
        let mut form = recipe_form();
        form.ingredients.clear();
        assert!(matches!(form.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn rejects_duplicate_ingredients() {
        let mut form = recipe_form();
        form.ingredients = vec![
            IngredientAmount { id: 7, amount: 1 },
            IngredientAmount { id: 7, amount: 2 },
        ];
        assert!(matches!(form.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn rejects_out_of_range_cooking_time() {
        let mut form = recipe_form();
        form.cooking_time = 0;
        assert!(form.validate().is_err());
        form.cooking_time = 10001;
        assert!(form.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_amount() {
        let mut form = recipe_form();
        form.ingredients[0].amount = 0;
        assert!(form.validate().is_err());
        form.ingredients[0].amount = 100001;
        assert!(form.validate().is_err());
    }

    #[test]
    fn update_form_allows_absent_fields() {
        let form = RecipeUpdateForm::default();
        assert!(form.validate().is_ok());
    }

    #[test]
    fn update_form_checks_present_fields() {
        let form = RecipeUpdateForm {
            tags: Some(vec![]),
            ..Default::default()
        };
        assert!(form.validate().is_err());

        let form = RecipeUpdateForm {
            cooking_time: Some(0),
            ..Default::default()
        };
        assert!(form.validate().is_err());
    }
}
