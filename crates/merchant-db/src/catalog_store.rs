//! Reference data and player roster persistence.
//!
//! Items, cities, rounds, exchange rates and players are written once when
//! an empty database is seeded and only read afterwards.

use sqlx::PgPool;

use merchant_types::{City, CityName, ExchangeRate, Item, ItemName, PlayerCode};

use crate::error::{DbError, round_from_db, round_to_db};

/// Reference data as stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    /// All items.
    pub items: Vec<Item>,
    /// All cities.
    pub cities: Vec<City>,
    /// All round numbers, ascending.
    pub rounds: Vec<u32>,
    /// All exchange rates.
    pub rates: Vec<ExchangeRate>,
}

/// Operations on the reference tables and `players`.
#[derive(Debug, Clone, Copy)]
pub struct CatalogStore<'a> {
    pool: &'a PgPool,
}

impl<'a> CatalogStore<'a> {
    /// Create a new catalog store bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Whether any reference data has been stored.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn is_seeded(&self) -> Result<bool, DbError> {
        let (seeded,): (bool,) = sqlx::query_as("SELECT EXISTS (SELECT 1 FROM rounds)")
            .fetch_one(self.pool)
            .await?;
        Ok(seeded)
    }

    /// Insert all reference data in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Conflict`] if any row already exists, or
    /// [`DbError::Postgres`] for other failures. Nothing is written on
    /// failure.
    pub async fn insert_catalog(&self, catalog: &Catalog) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;

        for item in &catalog.items {
            sqlx::query("INSERT INTO items (name, ending_price) VALUES ($1, $2)")
                .bind(item.name.as_str())
                .bind(item.ending_price)
                .execute(&mut *tx)
                .await
                .map_err(DbError::from_insert)?;
        }
        for city in &catalog.cities {
            sqlx::query("INSERT INTO cities (name) VALUES ($1)")
                .bind(city.name.as_str())
                .execute(&mut *tx)
                .await
                .map_err(DbError::from_insert)?;
        }
        for round in &catalog.rounds {
            sqlx::query("INSERT INTO rounds (number) VALUES ($1)")
                .bind(round_to_db(*round)?)
                .execute(&mut *tx)
                .await
                .map_err(DbError::from_insert)?;
        }
        for rate in &catalog.rates {
            sqlx::query(
                r"INSERT INTO exchange_rates (city, round, item, buy_price, sell_price)
                  VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(rate.city.as_str())
            .bind(round_to_db(rate.round)?)
            .bind(rate.item.as_str())
            .bind(rate.buy_price)
            .bind(rate.sell_price)
            .execute(&mut *tx)
            .await
            .map_err(DbError::from_insert)?;
        }

        tx.commit().await?;
        tracing::info!(
            items = catalog.items.len(),
            cities = catalog.cities.len(),
            rounds = catalog.rounds.len(),
            rates = catalog.rates.len(),
            "Stored reference data"
        );
        Ok(())
    }

    /// Load all reference data.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if a query fails, or
    /// [`DbError::Corrupt`] for an unrepresentable round.
    pub async fn load_catalog(&self) -> Result<Catalog, DbError> {
        let items = sqlx::query_as::<_, (String, i64)>(
            "SELECT name, ending_price FROM items ORDER BY name",
        )
        .fetch_all(self.pool)
        .await?
        .into_iter()
        .map(|(name, ending_price)| Item {
            name: ItemName::new(name),
            ending_price,
        })
        .collect();

        let cities = sqlx::query_as::<_, (String,)>("SELECT name FROM cities ORDER BY name")
            .fetch_all(self.pool)
            .await?
            .into_iter()
            .map(|(name,)| City {
                name: CityName::new(name),
            })
            .collect();

        let rounds = sqlx::query_as::<_, (i32,)>("SELECT number FROM rounds ORDER BY number")
            .fetch_all(self.pool)
            .await?
            .into_iter()
            .map(|(number,)| round_from_db("rounds", number))
            .collect::<Result<Vec<_>, _>>()?;

        let rates = sqlx::query_as::<_, RateRow>(
            r"SELECT city, round, item, buy_price, sell_price
              FROM exchange_rates
              ORDER BY city, round, item",
        )
        .fetch_all(self.pool)
        .await?
        .into_iter()
        .map(RateRow::into_rate)
        .collect::<Result<Vec<_>, _>>()?;

        Ok(Catalog {
            items,
            cities,
            rounds,
            rates,
        })
    }

    /// Insert player codes, ignoring codes that already exist.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the insert fails.
    pub async fn insert_players(&self, players: &[PlayerCode]) -> Result<(), DbError> {
        let codes: Vec<String> = players.iter().map(|p| p.as_str().to_owned()).collect();
        sqlx::query(
            "INSERT INTO players (code) SELECT * FROM UNNEST($1::TEXT[]) ON CONFLICT DO NOTHING",
        )
        .bind(&codes)
        .execute(self.pool)
        .await?;
        tracing::info!(count = codes.len(), "Stored players");
        Ok(())
    }

    /// Load every player code.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn load_players(&self) -> Result<Vec<PlayerCode>, DbError> {
        let rows = sqlx::query_as::<_, (String,)>("SELECT code FROM players ORDER BY code")
            .fetch_all(self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(code,)| PlayerCode::new(&code))
            .collect())
    }
}

/// A row from the `exchange_rates` table.
#[derive(Debug, Clone, sqlx::FromRow)]
struct RateRow {
    city: String,
    round: i32,
    item: String,
    buy_price: Option<i64>,
    sell_price: Option<i64>,
}

impl RateRow {
    fn into_rate(self) -> Result<ExchangeRate, DbError> {
        Ok(ExchangeRate {
            city: CityName::new(self.city),
            round: round_from_db("exchange_rates", self.round)?,
            item: ItemName::new(self.item),
            buy_price: self.buy_price,
            sell_price: self.sell_price,
        })
    }
}
