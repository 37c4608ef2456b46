//! Process-wide registry of database connections by alias.
//!
//! Models name the alias of the database they live in (`"default"` unless configured); the
//! registry maps that alias to a [`Database`] handle shared by every model using it.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use crate::driver::Database;
use crate::errors::{OdmError, Result};

pub const DEFAULT_ALIAS: &str = "default";

static CONNECTIONS: LazyLock<RwLock<HashMap<String, Arc<dyn Database>>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

/// Registers `db` under `alias`, returning the handle it replaced.
pub fn register(alias: impl Into<String>, db: Arc<dyn Database>) -> Option<Arc<dyn Database>> {
    let alias = alias.into();
    log::info!("registered database `{}` as `{alias}`", db.name());
    CONNECTIONS.write().insert(alias, db)
}

/// # Errors
/// `ConnectionNotFound` when nothing is registered under `alias`.
pub fn get(alias: &str) -> Result<Arc<dyn Database>> {
    CONNECTIONS.read().get(alias).cloned().ok_or_else(|| OdmError::ConnectionNotFound(alias.to_string()))
}

pub fn unregister(alias: &str) -> Option<Arc<dyn Database>> {
    CONNECTIONS.write().remove(alias)
}

#[must_use]
pub fn aliases() -> Vec<String> {
    let mut out: Vec<String> = CONNECTIONS.read().keys().cloned().collect();
    out.sort();
    out
}
