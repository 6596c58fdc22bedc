//! Static instrument catalog: the set of tradable symbols and their
//! simulation parameters. Loaded once at startup and immutable after.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{MarketError, Result};

/// Highest supported price precision.
pub const MAX_DECIMALS: u32 = 8;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instrument {
    pub symbol: String,
    pub name: String,
    pub description: String,
    pub initial_price: f64,
    /// Annualized drift (mu), signed.
    pub avg_yield_per_year: f64,
    /// Annualized stddev of returns (sigma), non-negative.
    pub volatility: f64,
    pub decimals: u32,
}

impl Instrument {
    fn validate(&self) -> Result<()> {
        if self.symbol.trim().is_empty() {
            return Err(MarketError::Catalog("instrument with empty symbol".to_string()));
        }
        if !self.initial_price.is_finite() || self.initial_price <= 0.0 {
            return Err(MarketError::Catalog(format!(
                "{}: initial_price must be finite and > 0, got {}",
                self.symbol, self.initial_price
            )));
        }
        if !self.avg_yield_per_year.is_finite() {
            return Err(MarketError::Catalog(format!(
                "{}: avg_yield_per_year must be finite",
                self.symbol
            )));
        }
        if !self.volatility.is_finite() || self.volatility < 0.0 {
            return Err(MarketError::Catalog(format!(
                "{}: volatility must be finite and >= 0, got {}",
                self.symbol, self.volatility
            )));
        }
        if self.decimals > MAX_DECIMALS {
            return Err(MarketError::Catalog(format!(
                "{}: decimals must be <= {}, got {}",
                self.symbol, MAX_DECIMALS, self.decimals
            )));
        }
        Ok(())
    }
}

/// Immutable symbol -> instrument map with deterministic iteration order.
#[derive(Debug, Clone)]
pub struct InstrumentCatalog {
    instruments: BTreeMap<String, Instrument>,
}

impl InstrumentCatalog {
    pub fn from_instruments(instruments: Vec<Instrument>) -> Result<Self> {
        if instruments.is_empty() {
            return Err(MarketError::Catalog("catalog has no instruments".to_string()));
        }
        let mut map = BTreeMap::new();
        for inst in instruments {
            inst.validate()?;
            if map.insert(inst.symbol.clone(), inst.clone()).is_some() {
                return Err(MarketError::Catalog(format!(
                    "duplicate symbol: {}",
                    inst.symbol
                )));
            }
        }
        Ok(Self { instruments: map })
    }

    /// The game's stock listing.
    pub fn builtin() -> Self {
        let instruments = vec![
            Instrument {
                symbol: "ACME".to_string(),
                name: "Acme Industrial".to_string(),
                description: "Heavy machinery and city infrastructure contracts.".to_string(),
                initial_price: 125.0,
                avg_yield_per_year: 0.05,
                volatility: 0.25,
                decimals: 2,
            },
            Instrument {
                symbol: "BYTE".to_string(),
                name: "ByteWorks Software".to_string(),
                description: "Apps, games and the city's payment rails.".to_string(),
                initial_price: 310.0,
                avg_yield_per_year: 0.12,
                volatility: 0.55,
                decimals: 2,
            },
            Instrument {
                symbol: "BREW".to_string(),
                name: "Bean & Barrel".to_string(),
                description: "Coffee houses on every corner downtown.".to_string(),
                initial_price: 42.5,
                avg_yield_per_year: 0.07,
                volatility: 0.30,
                decimals: 2,
            },
            Instrument {
                symbol: "NIMB".to_string(),
                name: "Nimbus Airlines".to_string(),
                description: "Regional carrier connecting the city to the coast.".to_string(),
                initial_price: 18.75,
                avg_yield_per_year: 0.02,
                volatility: 0.45,
                decimals: 2,
            },
            Instrument {
                symbol: "TERA".to_string(),
                name: "TerraBuild".to_string(),
                description: "Residential towers and the new harbor district.".to_string(),
                initial_price: 67.0,
                avg_yield_per_year: 0.04,
                volatility: 0.20,
                decimals: 2,
            },
            Instrument {
                symbol: "LUNA".to_string(),
                name: "Luna Entertainment".to_string(),
                description: "Casinos, clubs and the boardwalk ferris wheel.".to_string(),
                initial_price: 8.2,
                avg_yield_per_year: 0.09,
                volatility: 0.70,
                decimals: 2,
            },
        ];
        // Builtin table is known-good
        Self::from_instruments(instruments).expect("builtin catalog must validate")
    }

    /// Load a catalog from a JSON array of instruments.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let instruments: Vec<Instrument> = serde_json::from_str(&raw)?;
        Self::from_instruments(instruments)
    }

    pub fn get(&self, symbol: &str) -> Option<&Instrument> {
        self.instruments.get(symbol)
    }

    pub fn require(&self, symbol: &str) -> Result<&Instrument> {
        self.instruments
            .get(symbol)
            .ok_or_else(|| MarketError::UnknownSymbol(symbol.to_string()))
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.instruments.keys().map(|s| s.as_str())
    }

    pub fn instruments(&self) -> impl Iterator<Item = &Instrument> {
        self.instruments.values()
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }

    /// SHA-256 over the serialized catalog, logged at startup so runs can
    /// be correlated with the exact instrument set.
    pub fn fingerprint(&self) -> String {
        let instruments: Vec<&Instrument> = self.instruments.values().collect();
        let json = serde_json::to_string(&instruments).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        hex::encode(hasher.finalize())
    }
}
