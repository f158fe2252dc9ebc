//! SQLite implementation of the storage contract, split into one submodule
//! per entity.

mod atomic;
mod dead_letter;
mod exceptions;
mod items;
mod jobs;
mod leases;
mod templates;

use crate::db::DbPool;
use crate::storage::Storage;

pub struct SqliteStorage {
    pool: DbPool,
}

impl SqliteStorage {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub(crate) fn pool(&self) -> &DbPool {
        &self.pool
    }
}

impl Storage for SqliteStorage {}
