pub const RECIPE_COUNT_PER_PAGE: i64 = 6;
pub const SUBSCRIPTION_COUNT_PER_PAGE: i64 = 6;

pub const MIN_COOKING_TIME: i32 = 1;
pub const MAX_COOKING_TIME: i32 = 10000;
pub const MIN_INGREDIENT_AMOUNT: i32 = 1;
pub const MAX_INGREDIENT_AMOUNT: i32 = 100000;

pub const MAX_NAME_LENGTH: usize = 200;
pub const MAX_EMAIL_LENGTH: usize = 254;
pub const MAX_USERNAME_LENGTH: usize = 150;
pub const MAX_COLOR_LENGTH: usize = 7;

pub const REGEX_HEX_COLOR: &str = r"^#([A-Fa-f0-9]{6}|[A-Fa-f0-9]{3})$";
pub const REGEX_USERNAME: &str = r"^[\w.@+-]+$";
pub const REGEX_SLUG: &str = r"^[-a-zA-Z0-9_]+$";

/* The exported file is consumed by the frontend as-is, so the header and
the empty-cart line are part of the wire format. */
pub const SHOPPING_LIST_HEADER: &str = "Список покупок:";
pub const SHOPPING_LIST_EMPTY: &str = "В Списке покупок отсутствуют рецепты.";
pub const SHOPPING_LIST_FILE_NAME: &str = "shopping_cart.txt";
pub const SHOPPING_LIST_CONTENT_TYPE: &str = "text/plain";
