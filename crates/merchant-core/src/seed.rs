//! Seed data: the reference data and player roster of a fresh game.
//!
//! Reference data comes from `merchant-seed.yaml` (a built-in copy is
//! compiled into the crate). Player codes are generated at random: six
//! digits, unique within the game.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use rand::Rng;
use serde::Deserialize;

use merchant_types::{City, CityName, ExchangeRate, Item, ItemName, PlayerCode};

use crate::config::ConfigError;
use crate::price_book::PriceBook;
use crate::GameError;

/// The built-in seed file.
const BUILTIN_SEED: &str = include_str!("../../../merchant-seed.yaml");

/// Smallest generated player code.
const MIN_PLAYER_CODE: u32 = 100_000;

/// Largest generated player code.
const MAX_PLAYER_CODE: u32 = 999_999;

/// Parsed seed file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SeedData {
    /// Items and their ending prices.
    pub items: Vec<SeedItem>,
    /// Number of rounds (rounds are numbered `1..=rounds`).
    pub rounds: u32,
    /// Cities and their rate tables.
    pub cities: Vec<SeedCity>,
}

/// One item of the seed file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SeedItem {
    /// Item name.
    pub name: String,
    /// Liquidation price at the end of the game.
    pub ending_price: i64,
}

/// One city of the seed file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SeedCity {
    /// City name.
    pub name: String,
    /// Rate table per round.
    #[serde(default)]
    pub rates: Vec<SeedRound>,
}

/// The rates of one city in one round.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SeedRound {
    /// Round number.
    pub round: u32,
    /// Prices per item name.
    pub prices: BTreeMap<String, SeedPrice>,
}

/// A buy/sell price pair; `null` closes that side of the market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SeedPrice {
    /// Price the player pays per unit.
    #[serde(default)]
    pub buy: Option<i64>,
    /// Price the market pays per unit.
    #[serde(default)]
    pub sell: Option<i64>,
}

impl SeedData {
    /// The seed compiled into the crate.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the built-in file is malformed.
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::parse(BUILTIN_SEED)
    }

    /// Load a seed file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] or [`ConfigError::Yaml`].
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse a seed document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the document is malformed.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Items as domain records.
    pub fn items(&self) -> Vec<Item> {
        self.items
            .iter()
            .map(|item| Item {
                name: ItemName::new(item.name.as_str()),
                ending_price: item.ending_price,
            })
            .collect()
    }

    /// Cities as domain records.
    pub fn cities(&self) -> Vec<City> {
        self.cities
            .iter()
            .map(|city| City {
                name: CityName::new(city.name.as_str()),
            })
            .collect()
    }

    /// Round numbers `1..=rounds`.
    pub fn round_numbers(&self) -> Vec<u32> {
        (1..=self.rounds).collect()
    }

    /// Every exchange rate in the file.
    pub fn rates(&self) -> Vec<ExchangeRate> {
        self.cities
            .iter()
            .flat_map(|city| {
                city.rates.iter().flat_map(move |table| {
                    table.prices.iter().map(move |(item, price)| ExchangeRate {
                        city: CityName::new(city.name.as_str()),
                        round: table.round,
                        item: ItemName::new(item.as_str()),
                        buy_price: price.buy,
                        sell_price: price.sell,
                    })
                })
            })
            .collect()
    }

    /// Build a validated price book.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidConfig`] if a rate refers to an unknown
    /// city, item or round, or appears twice.
    pub fn to_price_book(&self) -> Result<PriceBook, GameError> {
        PriceBook::from_parts(self.items(), self.cities(), self.round_numbers(), self.rates())
    }
}

/// Generate `count` unique random six-digit player codes, ascending.
///
/// Codes already in `taken` are never returned. At most as many codes as
/// remain free in the six-digit range are generated.
pub fn generate_player_codes<R: Rng>(
    rng: &mut R,
    count: usize,
    taken: &BTreeSet<PlayerCode>,
) -> Vec<PlayerCode> {
    let capacity = usize::try_from(MAX_PLAYER_CODE.saturating_sub(MIN_PLAYER_CODE))
        .unwrap_or(usize::MAX)
        .saturating_add(1)
        .saturating_sub(taken.len());
    let target = count.min(capacity);

    let mut codes = BTreeSet::new();
    while codes.len() < target {
        let raw: u32 = rng.random_range(MIN_PLAYER_CODE..=MAX_PLAYER_CODE);
        let code = PlayerCode::new(&raw.to_string());
        if !taken.contains(&code) {
            codes.insert(code);
        }
    }
    tracing::debug!(count = codes.len(), "Generated player codes");
    codes.into_iter().collect()
}
