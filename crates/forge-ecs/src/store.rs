//! The fixed-capacity columnar component store.
//!
//! [`ComponentStore`] is a two-dimensional slab of `f32` values indexed by
//! `(row, internal column)`. Row capacity is `max_entities`; column capacity
//! is `max_components`. Absence of a value is represented by `f32::NAN`
//! rather than by removing an entry, which keeps every read a flat array
//! index with no branch on "does this row/column exist".
//!
//! Concurrency follows a many-readers/single-writer policy: the entire
//! slab sits behind one [`RwLock`]. A read takes a shared lock for
//! its whole duration; a write (including a batched `attach_many`) takes an
//! exclusive lock for its whole duration, so there is exactly one critical
//! section per operation.

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use crate::entity::{ComponentId, EntityId};
use crate::error::StoreError;

struct Inner {
    /// Entity id -> row index, for currently-live entities.
    row_of: HashMap<EntityId, u32>,
    /// Row index -> entity id, `None` for a free or never-allocated row.
    entity_of_row: Vec<Option<EntityId>>,
    /// Rows returned by `delete_entity`, FIFO, reused before a fresh row.
    free_rows: VecDeque<u32>,
    /// Rows ever handed out (free or not); bounds how far `entity_of_row`
    /// has been grown.
    rows_allocated: u32,
    /// Component id -> dense internal column index.
    cid_to_col: HashMap<ComponentId, u32>,
    /// One `Vec<f32>` of length `max_entities` per allocated column,
    /// lazily created on first attach of that component id. All cells of a
    /// freshly created column are pre-filled with `NAN`.
    columns: Vec<Option<Vec<f32>>>,
}

impl Inner {
    fn new(max_entities: usize, max_components: usize) -> Self {
        Self {
            row_of: HashMap::new(),
            entity_of_row: vec![None; max_entities],
            free_rows: VecDeque::new(),
            rows_allocated: 0,
            cid_to_col: HashMap::new(),
            columns: (0..max_components).map(|_| None).collect(),
        }
    }

    fn reset(&mut self, max_entities: usize, max_components: usize) {
        *self = Self::new(max_entities, max_components);
    }

    /// Resolve `cid` to an internal column index, allocating one (and the
    /// backing `Vec<f32>`) if this is the first time `cid` has been seen.
    fn column_for(
        &mut self,
        cid: ComponentId,
        max_entities: usize,
        max_components: usize,
    ) -> Result<u32, StoreError> {
        if let Some(&col) = self.cid_to_col.get(&cid) {
            return Ok(col);
        }
        let col = self.cid_to_col.len() as u32;
        if col as usize >= max_components {
            return Err(StoreError::OutOfComponentSpace { max_components });
        }
        self.cid_to_col.insert(cid, col);
        self.columns[col as usize] = Some(vec![f32::NAN; max_entities]);
        Ok(col)
    }

    /// Allocate a row for `id` if it doesn't already have one. Returns the
    /// row index either way.
    fn ensure_row(&mut self, id: EntityId, max_entities: usize) -> Result<u32, StoreError> {
        if let Some(&row) = self.row_of.get(&id) {
            return Ok(row);
        }
        let row = if let Some(row) = self.free_rows.pop_front() {
            row
        } else if (self.rows_allocated as usize) < max_entities {
            let row = self.rows_allocated;
            self.rows_allocated += 1;
            row
        } else {
            return Err(StoreError::OutOfMemory { max_entities });
        };
        self.row_of.insert(id, row);
        self.entity_of_row[row as usize] = Some(id);
        Ok(row)
    }
}

/// A fixed-capacity, columnar store of `f32` component values keyed by
/// `(entity, component)`.
///
/// All operations tolerate a missing entity or component unless otherwise
/// noted on the method.
pub struct ComponentStore {
    max_entities: usize,
    max_components: usize,
    inner: RwLock<Inner>,
}

impl ComponentStore {
    /// Create a store with the given row and column capacities.
    pub fn new(max_entities: usize, max_components: usize) -> Self {
        Self {
            max_entities,
            max_components,
            inner: RwLock::new(Inner::new(max_entities, max_components)),
        }
    }

    /// Row capacity (`maxEntities`).
    pub fn max_entities(&self) -> usize {
        self.max_entities
    }

    /// Column capacity (`maxComponents`).
    pub fn max_components(&self) -> usize {
        self.max_components
    }

    /// Allocate a row for `id`.
    ///
    /// Idempotent: calling this again for an already-live `id` is a no-op.
    ///
    /// # Errors
    ///
    /// [`StoreError::OutOfMemory`] if every row is in use and none is
    /// reclaimable.
    pub fn create_entity(&self, id: EntityId) -> Result<(), StoreError> {
        let mut inner = self.inner.write().expect("component store lock poisoned");
        inner.ensure_row(id, self.max_entities)?;
        Ok(())
    }

    /// Release the row occupied by `id`.
    ///
    /// The row is immediately overwritten with `NAN` in every allocated
    /// column so a reused row never leaks a stale value, then returned to
    /// the free-row queue for reuse. Idempotent: deleting an entity that
    /// does not exist is a no-op.
    pub fn delete_entity(&self, id: EntityId) {
        let mut inner = self.inner.write().expect("component store lock poisoned");
        let Some(row) = inner.row_of.remove(&id) else {
            return;
        };
        inner.entity_of_row[row as usize] = None;
        for column in inner.columns.iter_mut().flatten() {
            column[row as usize] = f32::NAN;
        }
        inner.free_rows.push_back(row);
    }

    /// Write `v` into `(id, cid)`, creating the entity and/or the
    /// component column as needed.
    ///
    /// # Errors
    ///
    /// [`StoreError::OutOfMemory`] if `id` is new and no row is available.
    /// [`StoreError::OutOfComponentSpace`] if `cid` is new and the column
    /// cap has been reached.
    pub fn attach(&self, id: EntityId, cid: ComponentId, v: f32) -> Result<(), StoreError> {
        let mut inner = self.inner.write().expect("component store lock poisoned");
        let row = inner.ensure_row(id, self.max_entities)?;
        let col = inner.column_for(cid, self.max_entities, self.max_components)?;
        inner.columns[col as usize].as_mut().unwrap()[row as usize] = v;
        Ok(())
    }

    /// Batched form of [`attach`](Self::attach): every `(cid, value)` pair
    /// is applied within a single write lock.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidArgument`] if `cids.len() != vals.len()`.
    /// Otherwise as [`attach`](Self::attach).
    pub fn attach_many(
        &self,
        id: EntityId,
        cids: &[ComponentId],
        vals: &[f32],
    ) -> Result<(), StoreError> {
        if cids.len() != vals.len() {
            return Err(StoreError::InvalidArgument {
                detail: format!(
                    "attach_many: cids.len() ({}) != vals.len() ({})",
                    cids.len(),
                    vals.len()
                ),
            });
        }
        let mut inner = self.inner.write().expect("component store lock poisoned");
        let row = inner.ensure_row(id, self.max_entities)?;
        for (&cid, &v) in cids.iter().zip(vals.iter()) {
            let col = inner.column_for(cid, self.max_entities, self.max_components)?;
            inner.columns[col as usize].as_mut().unwrap()[row as usize] = v;
        }
        Ok(())
    }

    /// Write the `NAN` sentinel into `(id, cid)`. A no-op if the entity or
    /// component does not exist.
    pub fn remove(&self, id: EntityId, cid: ComponentId) {
        let mut inner = self.inner.write().expect("component store lock poisoned");
        let Some(&row) = inner.row_of.get(&id) else {
            return;
        };
        if let Some(&col) = inner.cid_to_col.get(&cid) {
            inner.columns[col as usize].as_mut().unwrap()[row as usize] = f32::NAN;
        }
    }

    /// Read the value at `(id, cid)`, or `NAN` if the entity or component
    /// does not exist.
    pub fn get(&self, id: EntityId, cid: ComponentId) -> f32 {
        let inner = self.inner.read().expect("component store lock poisoned");
        let Some(&row) = inner.row_of.get(&id) else {
            return f32::NAN;
        };
        match inner.cid_to_col.get(&cid) {
            Some(&col) => inner.columns[col as usize].as_ref().unwrap()[row as usize],
            None => f32::NAN,
        }
    }

    /// Batched read: fills `out_buf` with the value for each `cids[i]`, in
    /// order, within a single read lock.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidArgument`] if `out_buf.len() != cids.len()`.
    pub fn get_many(
        &self,
        id: EntityId,
        cids: &[ComponentId],
        out_buf: &mut [f32],
    ) -> Result<(), StoreError> {
        if out_buf.len() != cids.len() {
            return Err(StoreError::InvalidArgument {
                detail: format!(
                    "get_many: out_buf.len() ({}) != cids.len() ({})",
                    out_buf.len(),
                    cids.len()
                ),
            });
        }
        let inner = self.inner.read().expect("component store lock poisoned");
        let Some(&row) = inner.row_of.get(&id) else {
            // Entity does not exist: leave the caller's buffer untouched.
            return Ok(());
        };
        for (slot, &cid) in out_buf.iter_mut().zip(cids.iter()) {
            if let Some(&col) = inner.cid_to_col.get(&cid) {
                *slot = inner.columns[col as usize].as_ref().unwrap()[row as usize];
            }
        }
        Ok(())
    }

    /// `true` iff the entity exists and its value for `cid` is not `NAN`.
    pub fn has(&self, id: EntityId, cid: ComponentId) -> bool {
        !self.get(id, cid).is_nan()
    }

    /// All entities that have a non-`NAN` value for every one of `cids`.
    ///
    /// Iterates row-by-row so that an entity missing any one of the
    /// requested components is rejected as soon as that column is checked.
    pub fn query_all(&self, cids: &[ComponentId]) -> Vec<EntityId> {
        let inner = self.inner.read().expect("component store lock poisoned");
        let cols: Vec<Option<u32>> = cids
            .iter()
            .map(|cid| inner.cid_to_col.get(cid).copied())
            .collect();
        // Any requested cid that has never been attached can have no
        // matching entities at all.
        if cols.iter().any(|c| c.is_none()) {
            return Vec::new();
        }
        let cols: Vec<u32> = cols.into_iter().map(|c| c.unwrap()).collect();

        let mut matches = Vec::new();
        for row in 0..inner.rows_allocated {
            let Some(id) = inner.entity_of_row[row as usize] else {
                continue;
            };
            let all_present = cols
                .iter()
                .all(|&col| !inner.columns[col as usize].as_ref().unwrap()[row as usize].is_nan());
            if all_present {
                matches.push(id);
            }
        }
        matches
    }

    /// Every currently live entity, in ascending id order.
    pub fn all_entities(&self) -> Vec<EntityId> {
        let inner = self.inner.read().expect("component store lock poisoned");
        let mut ids: Vec<EntityId> = inner.row_of.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Number of currently live entities.
    pub fn entity_count(&self) -> usize {
        let inner = self.inner.read().expect("component store lock poisoned");
        inner.row_of.len()
    }

    /// Number of rows currently on the free list, awaiting reuse.
    pub fn free_row_count(&self) -> usize {
        let inner = self.inner.read().expect("component store lock poisoned");
        inner.free_rows.len()
    }

    /// Clear all entities, components, and columns. The store returns to
    /// the state it was in right after [`new`](Self::new) with the same
    /// capacities. This is a write operation and invalidates any column
    /// index a caller may have cached.
    pub fn reset(&self) {
        let mut inner = self.inner.write().expect("component store lock poisoned");
        inner.reset(self.max_entities, self.max_components);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
