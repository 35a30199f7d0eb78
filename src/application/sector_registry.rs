//! Sector CRUD (spec.md §4.2).

use crate::domain::errors::{EngineError, EngineResult, NotFoundError};
use crate::domain::sector::Sector;
use crate::infrastructure::persistence::{DocumentName, PersistenceStore};
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Default, Clone)]
pub struct SectorPatch {
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub balance: Option<f64>,
    pub volatility: Option<f64>,
}

pub struct SectorRegistry {
    store: Arc<PersistenceStore>,
}

impl SectorRegistry {
    pub fn new(store: Arc<PersistenceStore>) -> Self {
        Self { store }
    }

    pub async fn create_sector(&self, name: String, symbol: Option<String>) -> EngineResult<Sector> {
        let sector = Sector::new(name, symbol, Utc::now());
        let created = sector.clone();
        self.store
            .atomic_update(DocumentName::Sectors, move |mut sectors: Vec<Sector>| {
                sectors.push(created.clone());
                sectors
            })
            .await
            .map_err(EngineError::from)?;
        info!(sector_id = %sector.id, symbol = %sector.symbol, "created sector");
        Ok(sector)
    }

    pub async fn update_sector(&self, id: uuid::Uuid, patch: SectorPatch) -> EngineResult<Sector> {
        let sectors = self
            .store
            .atomic_update(DocumentName::Sectors, move |mut sectors: Vec<Sector>| {
                if let Some(sector) = sectors.iter_mut().find(|s| s.id == id) {
                    if let Some(name) = patch.name.clone() {
                        sector.name = name;
                    }
                    if let Some(symbol) = patch.symbol.clone() {
                        sector.symbol = symbol;
                    }
                    if let Some(balance) = patch.balance {
                        sector.balance = balance;
                    }
                    if let Some(volatility) = patch.volatility {
                        sector.volatility = volatility;
                    }
                    sector.clamp_invariants();
                }
                sectors
            })
            .await
            .map_err(EngineError::from)?;

        sectors
            .into_iter()
            .find(|s| s.id == id)
            .ok_or(NotFoundError::Sector(id).into())
    }

    pub async fn get(&self, id: uuid::Uuid) -> EngineResult<Sector> {
        let sectors: Vec<Sector> = self.store.read(DocumentName::Sectors).await.map_err(EngineError::from)?;
        sectors.into_iter().find(|s| s.id == id).ok_or(NotFoundError::Sector(id).into())
    }

    pub async fn list(&self) -> EngineResult<Vec<Sector>> {
        self.store.read(DocumentName::Sectors).await.map_err(EngineError::from)
    }

    pub async fn save(&self, updated: Sector) -> EngineResult<()> {
        self.store
            .atomic_update(DocumentName::Sectors, move |mut sectors: Vec<Sector>| {
                if let Some(slot) = sectors.iter_mut().find(|s| s.id == updated.id) {
                    *slot = updated;
                } else {
                    sectors.push(updated);
                }
                sectors
            })
            .await
            .map_err(EngineError::from)?;
        Ok(())
    }
}
