use redis::{aio::MultiplexedConnection, AsyncCommands, FromRedisValue, ToRedisArgs};
use redis_macros::{FromRedisValue, ToRedisArgs};
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Postgres};

use crate::database::{
    actions::{list_ingredients, list_tags},
    error::{CacheError, Error},
    schema::{Ingredient, Tag},
};

// Caching - keys

/// The two unpaginated catalog listings are the only cached reads.
#[derive(Clone, Copy, Debug)]
pub enum CacheKey {
    Tags,
    Ingredients,
}

impl CacheKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKey::Tags => "catalog-tags",
            CacheKey::Ingredients => "catalog-ingredients",
        }
    }
}

// Cache - wrappers

#[derive(Serialize, Deserialize, FromRedisValue, ToRedisArgs, Clone)]
pub struct CachedTags {
    pub rows: Vec<Tag>,
}

#[derive(Serialize, Deserialize, FromRedisValue, ToRedisArgs, Clone)]
pub struct CachedIngredients {
    pub rows: Vec<Ingredient>,
}

// Cache - read-through listings

/// Serves the tag catalog from redis when possible. A cache failure is
/// logged and the read degrades to the database.
pub async fn list_tags_cached(
    pool: &Pool<Postgres>,
    cache: &mut MultiplexedConnection,
) -> Result<Vec<Tag>, Error> {
    match get_cache_value::<_, CachedTags>(CacheKey::Tags.as_str(), cache).await {
        Ok(Some(cached)) => return Ok(cached.rows),
        Ok(None) => {}
        Err(e) => {
            log::error!("> Failed to read cached tags: {e:?}");
        }
    }

    let rows = list_tags(pool).await?;

    if let Err(e) = set_cache_value(
        CacheKey::Tags.as_str(),
        CachedTags { rows: rows.clone() },
        cache,
    )
    .await
    {
        log::error!("> Failed to cache tags: {e:?}");
    }

    Ok(rows)
}

/// Redis-backed twin of [`list_ingredients`], same degradation rules as
/// [`list_tags_cached`].
pub async fn list_ingredients_cached(
    pool: &Pool<Postgres>,
    cache: &mut MultiplexedConnection,
) -> Result<Vec<Ingredient>, Error> {
    match get_cache_value::<_, CachedIngredients>(CacheKey::Ingredients.as_str(), cache).await {
        Ok(Some(cached)) => return Ok(cached.rows),
        Ok(None) => {}
        Err(e) => {
            log::error!("> Failed to read cached ingredients: {e:?}");
        }
    }

    let rows = list_ingredients(pool).await?;

    if let Err(e) = set_cache_value(
        CacheKey::Ingredients.as_str(),
        CachedIngredients { rows: rows.clone() },
        cache,
    )
    .await
    {
        log::error!("> Failed to cache ingredients: {e:?}");
    }

    Ok(rows)
}

/// Called after any catalog write. Failure is logged; the entry expires
/// into a stale read at worst.
pub async fn invalidate_catalog_cache(key: CacheKey, cache: &mut MultiplexedConnection) {
    if let Err(e) = delete_cache_value(key.as_str(), cache).await {
        log::error!("> Failed to invalidate {}: {e:?}", key.as_str());
    }
}

// Cache - raw handlers

pub async fn set_cache_value<K: ToRedisArgs + Send + Sync, V: ToRedisArgs + Send + Sync>(
    key: K,
    value: V,
    cache: &mut MultiplexedConnection,
) -> Result<(), Error> {
    let _: () = cache
        .set(key, value)
        .await
        .map_err(|e| Error::from(CacheError::from(e)))?;

    Ok(())
}

pub async fn delete_cache_value<K: ToRedisArgs + Send + Sync>(
    key: K,
    cache: &mut MultiplexedConnection,
) -> Result<(), Error> {
    let _: () = cache
        .del(key)
        .await
        .map_err(|e| Error::from(CacheError::from(e)))?;

    Ok(())
}

pub async fn get_cache_value<K: ToRedisArgs + Send + Sync, V: FromRedisValue>(
    key: K,
    cache: &mut MultiplexedConnection,
) -> Result<Option<V>, Error> {
    let value: Option<V> = cache
        .get(key)
        .await
        .map_err(|e| Error::from(CacheError::from(e)))?;

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_keys_do_not_collide() {
        assert_eq!(CacheKey::Tags.as_str(), "catalog-tags");
        assert_eq!(CacheKey::Ingredients.as_str(), "catalog-ingredients");
        assert_ne!(CacheKey::Tags.as_str(), CacheKey::Ingredients.as_str());
    }
}
