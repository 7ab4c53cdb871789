//! Role catalogs and role selection.
//!
//! A catalog is an immutable list of perspectives a worker can take. The
//! dispatcher asks a [`RoleSelector`] for one role per worker; duplicates
//! across a batch are expected.

use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// General-purpose advisory council.
pub const COUNCIL_ROLES: [&str; 8] = [
    "Systems Engineer",
    "Risk Lawyer",
    "White-Hat Hacker",
    "Economist",
    "Demanding End User",
    "UX/UI Specialist",
    "AI Ethicist",
    "Startup CEO",
];

/// Manufacturing leadership, for operational dilemmas.
pub const FACTORY_ROLES: [&str; 8] = [
    "Chief Financial Officer",
    "Factory Manager",
    "QC Manager",
    "Sales Director",
    "Process Engineer",
    "Supply Chain Specialist",
    "Commercial Lawyer",
    "Risk Analyst",
];

/// Built-in catalog names, as written in config files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogName {
    #[default]
    Council,
    Factory,
}

impl std::fmt::Display for CatalogName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Council => write!(f, "council"),
            Self::Factory => write!(f, "factory"),
        }
    }
}

/// Immutable, cheaply clonable list of role labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleCatalog {
    roles: Arc<[String]>,
}

impl RoleCatalog {
    /// Rejects an empty catalog and blank role labels.
    pub fn new(roles: Vec<String>) -> Result<Self, ConfigError> {
        if roles.is_empty() {
            return Err(ConfigError::invalid("roles", "catalog must not be empty"));
        }
        if let Some(pos) = roles.iter().position(|r| r.trim().is_empty()) {
            return Err(ConfigError::invalid(
                "roles",
                format!("role #{} is blank", pos + 1),
            ));
        }
        Ok(Self {
            roles: roles.into(),
        })
    }

    pub fn builtin(name: CatalogName) -> Self {
        let roles: &[&str] = match name {
            CatalogName::Council => &COUNCIL_ROLES,
            CatalogName::Factory => &FACTORY_ROLES,
        };
        Self {
            roles: roles.iter().map(|r| r.to_string()).collect(),
        }
    }

    pub fn council() -> Self {
        Self::builtin(CatalogName::Council)
    }

    pub fn factory() -> Self {
        Self::builtin(CatalogName::Factory)
    }

    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.roles.get(index).map(String::as_str)
    }
}

impl Default for RoleCatalog {
    fn default() -> Self {
        Self::council()
    }
}

/// Picks the role for the worker at `index` of a batch.
pub trait RoleSelector: Send + Sync {
    fn select(&self, catalog: &RoleCatalog, index: usize) -> String;
}

/// Uniform sampling with replacement.
pub struct RandomRoleSelector {
    rng: Mutex<StdRng>,
}

impl RandomRoleSelector {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_rng(&mut rand::rng())),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for RandomRoleSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl RoleSelector for RandomRoleSelector {
    fn select(&self, catalog: &RoleCatalog, _index: usize) -> String {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let pick = rng.random_range(0..catalog.len());
        catalog.roles()[pick].clone()
    }
}

/// Walks the catalog in order, wrapping around.
#[derive(Debug, Default, Clone, Copy)]
pub struct CyclingRoleSelector;

impl RoleSelector for CyclingRoleSelector {
    fn select(&self, catalog: &RoleCatalog, index: usize) -> String {
        catalog.roles()[index % catalog.len()].clone()
    }
}
