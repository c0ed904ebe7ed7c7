//! Reference data: items, cities, rounds and exchange rates.
//!
//! The [`PriceBook`] is loaded once at startup and is read-only during
//! play. Rates are keyed by `(city, round, item)`; a missing key is a
//! [`GameError::NotFound`], while a present key with an absent price side
//! means that side of the market is closed.

use std::collections::{BTreeMap, BTreeSet};

use merchant_types::{City, CityName, ExchangeRate, Item, ItemName};

use crate::GameError;

/// Rate lookup key.
type RateKey = (CityName, u32, ItemName);

/// Static reference data for one game.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PriceBook {
    /// Items by name.
    items: BTreeMap<ItemName, Item>,
    /// Cities by name.
    cities: BTreeMap<CityName, City>,
    /// Round numbers.
    rounds: BTreeSet<u32>,
    /// Exchange rates by (city, round, item).
    rates: BTreeMap<RateKey, ExchangeRate>,
}

impl PriceBook {
    /// Build a price book, checking that every rate refers to a known
    /// city, round and item and that no triple appears twice.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidConfig`] describing the first problem.
    pub fn from_parts(
        items: Vec<Item>,
        cities: Vec<City>,
        rounds: impl IntoIterator<Item = u32>,
        rates: Vec<ExchangeRate>,
    ) -> Result<Self, GameError> {
        let items: BTreeMap<ItemName, Item> = items
            .into_iter()
            .map(|item| (item.name.clone(), item))
            .collect();
        let cities: BTreeMap<CityName, City> = cities
            .into_iter()
            .map(|city| (city.name.clone(), city))
            .collect();
        let rounds: BTreeSet<u32> = rounds.into_iter().collect();

        if rounds.contains(&0) {
            return Err(GameError::InvalidConfig("round numbers start at 1".to_owned()));
        }

        let mut by_key = BTreeMap::new();
        for rate in rates {
            if !cities.contains_key(&rate.city) {
                return Err(GameError::InvalidConfig(format!(
                    "rate refers to unknown city {}",
                    rate.city
                )));
            }
            if !items.contains_key(&rate.item) {
                return Err(GameError::InvalidConfig(format!(
                    "rate refers to unknown item {}",
                    rate.item
                )));
            }
            if !rounds.contains(&rate.round) {
                return Err(GameError::InvalidConfig(format!(
                    "rate refers to unknown round {}",
                    rate.round
                )));
            }
            let key = (rate.city.clone(), rate.round, rate.item.clone());
            if by_key.insert(key, rate.clone()).is_some() {
                return Err(GameError::InvalidConfig(format!(
                    "duplicate rate for {} in {} during round {}",
                    rate.item, rate.city, rate.round
                )));
            }
        }

        Ok(Self {
            items,
            cities,
            rounds,
            rates: by_key,
        })
    }

    /// The rate for `(city, round, item)`.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::NotFound`] if the city or item is unknown or
    /// no rate exists for the triple.
    pub fn rate(&self, city: &str, round: u32, item: &str) -> Result<&ExchangeRate, GameError> {
        let city = self.city(city)?;
        let item = self.item(item)?;
        self.rates
            .get(&(city.name.clone(), round, item.name.clone()))
            .ok_or_else(|| {
                GameError::not_found("exchange rate", format!("{}/{round}/{}", city.name, item.name))
            })
    }

    /// Every rate of `city` in `round`, ordered by item name.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::NotFound`] if the city is unknown.
    pub fn city_rates(&self, city: &str, round: u32) -> Result<Vec<&ExchangeRate>, GameError> {
        let city = self.city(city)?;
        Ok(self
            .rates
            .values()
            .filter(|rate| rate.city == city.name && rate.round == round)
            .collect())
    }

    /// Look up an item by name.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::NotFound`] if the item is unknown.
    pub fn item(&self, name: &str) -> Result<&Item, GameError> {
        self.items
            .get(name)
            .ok_or_else(|| GameError::not_found("item", name))
    }

    /// Look up a city by name.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::NotFound`] if the city is unknown.
    pub fn city(&self, name: &str) -> Result<&City, GameError> {
        self.cities
            .get(name)
            .ok_or_else(|| GameError::not_found("city", name))
    }

    /// Whether `round` exists.
    pub fn has_round(&self, round: u32) -> bool {
        self.rounds.contains(&round)
    }

    /// The highest round number, if any round exists.
    pub fn last_round(&self) -> Option<u32> {
        self.rounds.last().copied()
    }

    /// All items, ordered by name.
    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    /// All cities, ordered by name.
    pub fn cities(&self) -> impl Iterator<Item = &City> {
        self.cities.values()
    }

    /// All round numbers, ascending.
    pub fn rounds(&self) -> impl Iterator<Item = u32> + '_ {
        self.rounds.iter().copied()
    }

    /// All rates, ordered by (city, round, item).
    pub fn rates(&self) -> impl Iterator<Item = &ExchangeRate> {
        self.rates.values()
    }
}
