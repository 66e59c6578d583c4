//! Imaging protocol data model (spec §3) and the repository contract the
//! core consumes (spec §6: "a protocol repository with CRUD, composite-key
//! lookup, and a soft-delete policy").
//!
//! The persistence backend itself is an external collaborator (spec §1,
//! §9 Open Question 1) — this module defines only the trait and an
//! in-memory implementation suitable for embedding/tests.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Automatic exposure control mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AecMode {
    Manual,
    Auto,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Protocol {
    pub protocol_id: String,
    pub body_part: String,
    pub projection: String,
    pub kvp: f64,
    pub ma: f64,
    pub exposure_ms: f64,
    pub aec_mode: AecMode,
    pub aec_chambers: Vec<u8>,
    pub focus_size: String,
    pub grid_used: bool,
    pub procedure_codes: Vec<String>,
    pub device_model: String,
    pub is_active: bool,
}

impl Protocol {
    /// Upper-cased composite identity key `(BODY_PART, PROJECTION, DEVICE_MODEL)`.
    pub fn composite_key(&self) -> ProtocolKey {
        ProtocolKey::new(&self.body_part, &self.projection, &self.device_model)
    }

    /// `mAs = kvp * ma * ms / 1000` — kept explicit as the safety-enforceable field.
    pub fn mas(&self) -> f64 {
        self.kvp * self.ma * self.exposure_ms / 1000.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProtocolKey(String, String, String);

impl std::fmt::Display for ProtocolKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.0, self.1, self.2)
    }
}

impl ProtocolKey {
    pub fn new(body_part: &str, projection: &str, device_model: &str) -> Self {
        Self(
            body_part.to_uppercase(),
            projection.to_uppercase(),
            device_model.to_uppercase(),
        )
    }
}

/// CRUD + composite-key lookup + soft delete, implemented by an external
/// persistence backend. The core depends only on this trait.
pub trait ProtocolRepository: Send + Sync {
    fn create(&self, protocol: Protocol) -> Result<(), String>;
    fn find_by_key(&self, key: &ProtocolKey) -> Option<Protocol>;
    fn update(&self, protocol: Protocol) -> Result<(), String>;
    /// Soft delete: marks `is_active = false` rather than removing the row.
    fn soft_delete(&self, key: &ProtocolKey) -> Result<(), String>;
    fn list_active(&self) -> Vec<Protocol>;
}

/// In-process repository used for embedding and tests. A SQLite-backed
/// implementation is an external collaborator's responsibility.
#[derive(Default)]
pub struct InMemoryProtocolRepository {
    store: RwLock<HashMap<ProtocolKey, Protocol>>,
}

impl InMemoryProtocolRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProtocolRepository for InMemoryProtocolRepository {
    fn create(&self, protocol: Protocol) -> Result<(), String> {
        let key = protocol.composite_key();
        let mut store = self.store.write();
        if store.contains_key(&key) {
            return Err(format!("protocol with key {:?} already exists", key));
        }
        store.insert(key, protocol);
        Ok(())
    }

    fn find_by_key(&self, key: &ProtocolKey) -> Option<Protocol> {
        self.store.read().get(key).cloned()
    }

    fn update(&self, protocol: Protocol) -> Result<(), String> {
        let key = protocol.composite_key();
        let mut store = self.store.write();
        if !store.contains_key(&key) {
            return Err(format!("protocol with key {:?} does not exist", key));
        }
        store.insert(key, protocol);
        Ok(())
    }

    fn soft_delete(&self, key: &ProtocolKey) -> Result<(), String> {
        let mut store = self.store.write();
        match store.get_mut(key) {
            Some(p) => {
                p.is_active = false;
                Ok(())
            }
            None => Err(format!("protocol with key {:?} does not exist", key)),
        }
    }

    fn list_active(&self) -> Vec<Protocol> {
        self.store
            .read()
            .values()
            .filter(|p| p.is_active)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Protocol {
        Protocol {
            protocol_id: "P1".into(),
            body_part: "chest".into(),
            projection: "ap".into(),
            kvp: 80.0,
            ma: 200.0,
            exposure_ms: 100.0,
            aec_mode: AecMode::Auto,
            aec_chambers: vec![1, 2],
            focus_size: "Small".into(),
            grid_used: true,
            procedure_codes: vec!["CODE1".into()],
            device_model: "dr-2000".into(),
            is_active: true,
        }
    }

    #[test]
    fn composite_key_is_upper_cased() {
        let key = sample().composite_key();
        assert_eq!(key, ProtocolKey::new("CHEST", "AP", "DR-2000"));
    }

    #[test]
    fn mas_is_derived_correctly() {
        assert!((sample().mas() - 1600.0).abs() < 1e-9);
    }

    #[test]
    fn soft_delete_keeps_row_but_marks_inactive() {
        let repo = InMemoryProtocolRepository::new();
        let p = sample();
        let key = p.composite_key();
        repo.create(p).unwrap();
        repo.soft_delete(&key).unwrap();
        assert!(repo.find_by_key(&key).is_some());
        assert!(!repo.find_by_key(&key).unwrap().is_active);
        assert!(repo.list_active().is_empty());
    }
}
