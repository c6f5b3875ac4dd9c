//! In-memory reference host engine
//!
//! Tables of JSON rows behind a `RwLock`, an audit-log table, and
//! transactions that work on a private snapshot which replaces the committed
//! state only when the transaction succeeds. Every mutation emits the
//! `MutationHooks` events a relational host would.
//!
//! Transactions are serialized by a writer lock and do not nest: inside a
//! transaction closure, use the `Transaction` handle, never the database.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard};

use chrono::Utc;
use serde_json::Value;
use tracing::debug;

use super::hooks::{
    InsertEvent, MutationHooks, OperationEvent, OperationKind, RemoveEvent, UpdateEvent,
};
use super::unit::UnitOfWork;
use super::{AuditLogStore, Persistence};
use crate::audit::query::LogQuery;
use crate::error::{TrailError, TrailResult};
use crate::models::{Criteria, EntityDescriptor, Row};

fn lock_error(e: impl std::fmt::Display) -> TrailError {
    TrailError::Storage(format!("Failed to acquire lock: {}", e))
}

#[derive(Debug, Clone, Default)]
struct State {
    tables: HashMap<String, Vec<Row>>,
    logs: Vec<Row>,
    last_log_id: u64,
}

impl State {
    fn table(&self, entity_type: &str) -> &[Row] {
        self.tables
            .get(entity_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn table_mut(&mut self, entity_type: &str) -> &mut Vec<Row> {
        self.tables.entry(entity_type.to_string()).or_default()
    }

    fn select(&self, entity_type: &str, criteria: &Criteria, columns: Option<&[String]>) -> Vec<Row> {
        self.table(entity_type)
            .iter()
            .filter(|row| criteria.matches(row))
            .map(|row| project(row, columns))
            .collect()
    }

    fn append_log(&mut self, mut row: Row) -> Row {
        self.last_log_id += 1;
        row.insert("id".into(), Value::from(self.last_log_id));
        if !row.contains_key("created_at") {
            row.insert("created_at".into(), Value::from(Utc::now().to_rfc3339()));
        }
        self.logs.push(row.clone());
        row
    }
}

fn project(row: &Row, columns: Option<&[String]>) -> Row {
    match columns {
        Some(columns) => row
            .iter()
            .filter(|(key, _)| columns.contains(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
        None => row.clone(),
    }
}

fn overlay(base: &Row, changes: &Row) -> Row {
    let mut merged = base.clone();
    for (key, value) in changes {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// In-memory database with transactional units of work
#[derive(Default)]
pub struct MemoryDatabase {
    schemas: RwLock<HashMap<String, EntityDescriptor>>,
    state: RwLock<State>,
    hooks: RwLock<Vec<Arc<dyn MutationHooks>>>,
    writer: Mutex<()>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an entity type (table)
    pub fn register(&self, entity: EntityDescriptor) -> TrailResult<()> {
        let mut schemas = self.schemas.write().map_err(lock_error)?;
        schemas.insert(entity.name.clone(), entity);
        Ok(())
    }

    /// Register hooks for every later transaction
    pub fn subscribe(&self, hooks: Arc<dyn MutationHooks>) -> TrailResult<()> {
        self.hooks.write().map_err(lock_error)?.push(hooks);
        Ok(())
    }

    fn read_state(&self) -> TrailResult<RwLockReadGuard<'_, State>> {
        self.state.read().map_err(lock_error)
    }

    /// Run `f` in a transaction
    ///
    /// Changes (audit rows included) are committed when `f` returns `Ok` and
    /// discarded when it returns `Err`.
    pub fn transaction<R>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> TrailResult<R>,
    ) -> TrailResult<R> {
        let writer = self.writer.lock().map_err(lock_error)?;
        let snapshot = self.read_state()?.clone();
        let hooks = self.hooks.read().map_err(lock_error)?.clone();

        let tx = Transaction {
            db: self,
            state: RefCell::new(snapshot),
            hooks,
            unit: UnitOfWork::new(),
            _writer: writer,
        };
        let unit = tx.unit.id();

        match f(&tx) {
            Ok(value) => {
                let Transaction { state, _writer, .. } = tx;
                *self.state.write().map_err(lock_error)? = state.into_inner();
                debug!(%unit, "transaction committed");
                Ok(value)
            }
            Err(e) => {
                debug!(%unit, error = %e, "transaction rolled back");
                Err(e)
            }
        }
    }

    /// Committed rows of `entity_type`
    pub fn rows(&self, entity_type: &str) -> TrailResult<Vec<Row>> {
        Ok(self.read_state()?.table(entity_type).to_vec())
    }

    /// Committed audit rows, oldest first
    pub fn audit_rows(&self) -> TrailResult<Vec<Row>> {
        Ok(self.read_state()?.logs.clone())
    }

    pub fn insert(&self, entity_type: &str, rows: Vec<Row>) -> TrailResult<Vec<Row>> {
        self.transaction(|tx| tx.insert(entity_type, rows))
    }

    pub fn update(&self, entity_type: &str, criteria: &Criteria, values: Row) -> TrailResult<usize> {
        self.transaction(|tx| tx.update(entity_type, criteria, values))
    }

    pub fn delete(&self, entity_type: &str, criteria: &Criteria) -> TrailResult<usize> {
        self.transaction(|tx| tx.delete(entity_type, criteria))
    }

    pub fn save(&self, entity_type: &str, row: Row) -> TrailResult<Row> {
        self.transaction(|tx| tx.save(entity_type, row))
    }

    pub fn remove(&self, entity_type: &str, row: &Row) -> TrailResult<()> {
        self.transaction(|tx| tx.remove(entity_type, row))
    }

    pub fn upsert(&self, entity_type: &str, rows: Vec<Row>) -> TrailResult<Vec<Row>> {
        self.transaction(|tx| tx.upsert(entity_type, rows))
    }
}

impl AuditLogStore for MemoryDatabase {
    /// Runs as its own transaction so a concurrent commit cannot drop the row.
    /// Deadlocks if called from inside a transaction closure; use the handle.
    fn append_log(&self, row: Row) -> TrailResult<Row> {
        self.transaction(|tx| tx.append_log(row))
    }

    fn find_logs(&self, query: &LogQuery) -> TrailResult<(Vec<Row>, u64)> {
        Ok(query.apply(self.read_state()?.logs.iter().cloned()))
    }
}

impl Persistence for MemoryDatabase {
    fn describe(&self, entity_type: &str) -> Option<EntityDescriptor> {
        self.schemas.read().ok()?.get(entity_type).cloned()
    }

    fn find(
        &self,
        entity: &EntityDescriptor,
        criteria: &Criteria,
        select: Option<&[String]>,
    ) -> TrailResult<Vec<Row>> {
        Ok(self.read_state()?.select(&entity.name, criteria, select))
    }
}

/// Brackets a criteria-based operation; `after_operation` fires on drop
struct OperationScope<'a> {
    hooks: &'a [Arc<dyn MutationHooks>],
    event: OperationEvent<'a>,
}

impl Drop for OperationScope<'_> {
    fn drop(&mut self) {
        for hook in self.hooks {
            hook.after_operation(&self.event);
        }
    }
}

/// One unit of work on a `MemoryDatabase`
pub struct Transaction<'db> {
    db: &'db MemoryDatabase,
    state: RefCell<State>,
    hooks: Vec<Arc<dyn MutationHooks>>,
    unit: UnitOfWork,
    _writer: std::sync::MutexGuard<'db, ()>,
}

impl<'db> Transaction<'db> {
    fn descriptor(&self, entity_type: &str) -> TrailResult<EntityDescriptor> {
        self.db
            .describe(entity_type)
            .ok_or_else(|| TrailError::unknown_entity(entity_type))
    }

    fn begin<'a>(
        &'a self,
        kind: OperationKind,
        entity: &'a EntityDescriptor,
        criteria: Option<&'a Criteria>,
    ) -> OperationScope<'a> {
        let event = OperationEvent {
            kind,
            entity,
            criteria,
            manager: self,
        };
        for hook in &self.hooks {
            hook.before_operation(&event);
        }
        OperationScope {
            hooks: &self.hooks,
            event,
        }
    }

    fn fire(&self, mut f: impl FnMut(&dyn MutationHooks) -> TrailResult<()>) -> TrailResult<()> {
        for hook in &self.hooks {
            f(hook.as_ref())?;
        }
        Ok(())
    }

    fn find_one(&self, entity: &EntityDescriptor, criteria: &Criteria) -> Option<Row> {
        self.state
            .borrow()
            .table(&entity.name)
            .iter()
            .find(|row| criteria.matches(row))
            .cloned()
    }

    fn existing(&self, entity: &EntityDescriptor, row: &Row) -> Option<(Criteria, Row)> {
        let keys = entity.key_values(row)?;
        let criteria = Criteria::from_row(&keys);
        let found = self.find_one(entity, &criteria)?;
        Some((criteria, found))
    }

    /// Store a new row: generate a missing integer id, fill absent columns
    /// with `null`, reject duplicate keys
    fn insert_row(&self, entity: &EntityDescriptor, mut row: Row) -> TrailResult<Row> {
        let mut state = self.state.borrow_mut();
        let table = state.table_mut(&entity.name);

        if entity.primary_keys.len() == 1 {
            let pk = entity.primary_column();
            if row.get(pk).map_or(true, Value::is_null) {
                let next = table
                    .iter()
                    .filter_map(|r| r.get(pk).and_then(Value::as_i64))
                    .max()
                    .unwrap_or(0)
                    + 1;
                row.insert(pk.to_string(), Value::from(next));
            }
        }

        for column in &entity.columns {
            row.entry(column.clone()).or_insert(Value::Null);
        }

        let keys = entity.key_values(&row).ok_or_else(|| {
            TrailError::Validation(format!("{} row is missing its primary key", entity.name))
        })?;
        let criteria = Criteria::from_row(&keys);
        if table.iter().any(|r| criteria.matches(r)) {
            return Err(TrailError::Storage(format!(
                "duplicate key {} for {}",
                Value::Object(keys),
                entity.name
            )));
        }

        table.push(row.clone());
        Ok(row)
    }

    fn replace_row(&self, entity: &EntityDescriptor, criteria: &Criteria, row: Row) {
        let mut state = self.state.borrow_mut();
        if let Some(slot) = state
            .table_mut(&entity.name)
            .iter_mut()
            .find(|r| criteria.matches(r))
        {
            *slot = row;
        }
    }

    fn delete_rows(&self, entity: &EntityDescriptor, criteria: &Criteria) -> usize {
        let mut state = self.state.borrow_mut();
        let table = state.table_mut(&entity.name);
        let before = table.len();
        table.retain(|r| !criteria.matches(r));
        before - table.len()
    }

    fn update_existing(&self, entity: &EntityDescriptor, criteria: &Criteria, stored: &Row, changes: &Row) -> TrailResult<Row> {
        let merged = overlay(stored, changes);
        let event = UpdateEvent {
            entity,
            row: Some(&merged),
            database_row: Some(stored),
            manager: self,
        };
        self.fire(|h| h.before_update(&event))?;
        self.replace_row(entity, criteria, merged.clone());
        self.fire(|h| h.after_update(&event))?;
        Ok(merged)
    }

    /// Insert new rows; fails on a duplicate key
    pub fn insert(&self, entity_type: &str, rows: Vec<Row>) -> TrailResult<Vec<Row>> {
        let entity = self.descriptor(entity_type)?;
        let _scope = self.begin(OperationKind::Insert, &entity, None);

        let inserted = rows
            .into_iter()
            .map(|row| self.insert_row(&entity, row))
            .collect::<TrailResult<Vec<_>>>()?;

        for row in &inserted {
            let event = InsertEvent {
                entity: &entity,
                row,
                manager: self,
            };
            self.fire(|h| h.after_insert(&event))?;
        }
        Ok(inserted)
    }

    /// Apply `values` to every row matching `criteria`
    pub fn update(&self, entity_type: &str, criteria: &Criteria, values: Row) -> TrailResult<usize> {
        let entity = self.descriptor(entity_type)?;
        let _scope = self.begin(OperationKind::Update, &entity, Some(criteria));

        let event = UpdateEvent {
            entity: &entity,
            row: Some(&values),
            database_row: None,
            manager: self,
        };
        self.fire(|h| h.before_update(&event))?;

        let affected = {
            let mut state = self.state.borrow_mut();
            let mut count = 0;
            for row in state.table_mut(&entity.name).iter_mut() {
                if criteria.matches(row) {
                    row.extend(values.iter().map(|(k, v)| (k.clone(), v.clone())));
                    count += 1;
                }
            }
            count
        };

        self.fire(|h| h.after_update(&event))?;
        Ok(affected)
    }

    /// Delete every row matching `criteria`
    pub fn delete(&self, entity_type: &str, criteria: &Criteria) -> TrailResult<usize> {
        let entity = self.descriptor(entity_type)?;
        let _scope = self.begin(OperationKind::Delete, &entity, Some(criteria));

        let event = RemoveEvent {
            entity: &entity,
            row: None,
            database_row: None,
            entity_id: None,
            manager: self,
        };
        self.fire(|h| h.before_remove(&event))?;
        let affected = self.delete_rows(&entity, criteria);
        self.fire(|h| h.after_remove(&event))?;
        Ok(affected)
    }

    /// Insert `row`, or merge it into the stored row with the same key
    pub fn save(&self, entity_type: &str, row: Row) -> TrailResult<Row> {
        let entity = self.descriptor(entity_type)?;

        match self.existing(&entity, &row) {
            Some((criteria, stored)) => self.update_existing(&entity, &criteria, &stored, &row),
            None => {
                let row = self.insert_row(&entity, row)?;
                let event = InsertEvent {
                    entity: &entity,
                    row: &row,
                    manager: self,
                };
                self.fire(|h| h.after_insert(&event))?;
                Ok(row)
            }
        }
    }

    /// Remove one stored row, identified by its primary key
    pub fn remove(&self, entity_type: &str, row: &Row) -> TrailResult<()> {
        let entity = self.descriptor(entity_type)?;
        let keys = entity.key_values(row).ok_or_else(|| {
            TrailError::Validation(format!("{} row is missing its primary key", entity.name))
        })?;
        let criteria = Criteria::from_row(&keys);
        let stored = self.find_one(&entity, &criteria).ok_or_else(|| TrailError::NotFound {
            entity_type: entity.name.clone(),
            identifier: Value::Object(keys.clone()).to_string(),
        })?;

        let entity_id = if keys.len() == 1 {
            keys.values().next().cloned()
        } else {
            Some(Value::Object(keys))
        };

        let event = RemoveEvent {
            entity: &entity,
            row: Some(row),
            database_row: Some(&stored),
            entity_id: entity_id.as_ref(),
            manager: self,
        };
        self.fire(|h| h.before_remove(&event))?;
        self.delete_rows(&entity, &criteria);
        self.fire(|h| h.after_remove(&event))?;
        Ok(())
    }

    /// Insert rows whose key is new, overwrite the others
    pub fn upsert(&self, entity_type: &str, rows: Vec<Row>) -> TrailResult<Vec<Row>> {
        let entity = self.descriptor(entity_type)?;
        let _scope = self.begin(OperationKind::Upsert, &entity, None);

        let mut written = Vec::with_capacity(rows.len());
        for row in rows {
            let stored = match self.existing(&entity, &row) {
                Some((criteria, stored)) => self.update_existing(&entity, &criteria, &stored, &row)?,
                None => {
                    let row = self.insert_row(&entity, row)?;
                    let event = InsertEvent {
                        entity: &entity,
                        row: &row,
                        manager: self,
                    };
                    self.fire(|h| h.after_insert(&event))?;
                    row
                }
            };
            written.push(stored);
        }
        Ok(written)
    }

    /// First row matching `criteria` in this transaction's view
    pub fn find_by(&self, entity_type: &str, criteria: &Criteria) -> TrailResult<Option<Row>> {
        let entity = self.descriptor(entity_type)?;
        Ok(self.find_one(&entity, criteria))
    }
}

impl AuditLogStore for Transaction<'_> {
    fn append_log(&self, row: Row) -> TrailResult<Row> {
        Ok(self.state.borrow_mut().append_log(row))
    }

    fn find_logs(&self, query: &LogQuery) -> TrailResult<(Vec<Row>, u64)> {
        Ok(query.apply(self.state.borrow().logs.iter().cloned()))
    }
}

impl Persistence for Transaction<'_> {
    fn describe(&self, entity_type: &str) -> Option<EntityDescriptor> {
        self.db.describe(entity_type)
    }

    fn find(
        &self,
        entity: &EntityDescriptor,
        criteria: &Criteria,
        select: Option<&[String]>,
    ) -> TrailResult<Vec<Row>> {
        Ok(self.state.borrow().select(&entity.name, criteria, select))
    }

    fn unit(&self) -> Option<&UnitOfWork> {
        Some(&self.unit)
    }
}
