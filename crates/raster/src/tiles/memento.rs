//! Linear undo history of per-tile diffs
//!
//! Each memento owns a record of the tiles modified while it was the most
//! recent applied memento: their state before the first modification, and,
//! once rolled back, their state right before the rollback. Rollback and
//! rollforward move a cursor through the records. Any mutation while the
//! cursor is not at the end drops the records past it (redo invalidation).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, warn};

use super::{TileCoord, TileData, TiledDataManager};
use crate::error::RasterError;

type TileState = Option<Arc<TileData>>;

/// Undo/redo token returned by [`TiledDataManager::get_memento`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Memento {
    manager_id: u64,
    id: u64,
}

impl Memento {
    /// Id of the manager that issued this memento
    pub fn manager_id(&self) -> u64 {
        self.manager_id
    }

    /// Epoch of this memento, increasing per manager
    pub fn id(&self) -> u64 {
        self.id
    }
}

#[derive(Debug)]
struct Record {
    id: u64,
    before: HashMap<TileCoord, TileState>,
    after: HashMap<TileCoord, TileState>,
}

#[derive(Debug, Default)]
pub(super) struct History {
    records: Vec<Record>,
    /// Number of records currently applied
    applied: usize,
    next_id: u64,
    invalidated: HashSet<u64>,
}

impl History {
    /// Drop every record past the cursor
    fn truncate_redo(&mut self) {
        if self.applied < self.records.len() {
            for record in self.records.drain(self.applied..) {
                self.invalidated.insert(record.id);
            }
            debug!("History: redo invalidated, {} mementos remain", self.records.len());
        }
    }

    /// Called before a tile changes outside of rollback/rollforward
    pub(super) fn record_before(&mut self, coord: TileCoord, current: TileState) {
        self.truncate_redo();
        if let Some(record) = self.applied.checked_sub(1).and_then(|i| self.records.get_mut(i)) {
            record.before.entry(coord).or_insert(current);
        }
    }

    fn position(&self, memento: Memento) -> Option<usize> {
        self.records.iter().position(|r| r.id == memento.id)
    }
}

impl TiledDataManager {
    /// Open a new undo record. Changes made from now on are undone by
    /// [`rollback`](Self::rollback) of the returned memento.
    pub fn get_memento(&mut self) -> Memento {
        let history = &mut self.history;
        history.truncate_redo();
        history.next_id += 1;
        let id = history.next_id;
        history.records.push(Record {
            id,
            before: HashMap::new(),
            after: HashMap::new(),
        });
        history.applied = history.records.len();
        debug!("TiledDataManager({}): memento {} created", self.id, id);
        Memento {
            manager_id: self.id,
            id,
        }
    }

    fn check_owner(&self, memento: Memento) -> Result<(), RasterError> {
        if memento.manager_id != self.id {
            warn!(
                "TiledDataManager({}): memento {} belongs to manager {}",
                self.id, memento.id, memento.manager_id
            );
            return Err(RasterError::ForeignMemento { memento: memento.id });
        }
        Ok(())
    }

    /// Restore the state at the time `memento` was created.
    ///
    /// Only the most recent applied memento can be rolled back; rolling back
    /// the memento that was just rolled back is a no-op.
    pub fn rollback(&mut self, memento: Memento) -> Result<(), RasterError> {
        self.check_owner(memento)?;
        let Some(index) = self.history.position(memento) else {
            warn!("TiledDataManager({}): rollback of unknown memento {}", self.id, memento.id);
            return Err(RasterError::MementoOutOfSequence { memento: memento.id });
        };
        if self.history.applied == index {
            return Ok(());
        }
        if self.history.applied != index + 1 {
            warn!("TiledDataManager({}): rollback of memento {} out of sequence", self.id, memento.id);
            return Err(RasterError::MementoOutOfSequence { memento: memento.id });
        }

        let before: Vec<(TileCoord, TileState)> = self.history.records[index]
            .before
            .iter()
            .map(|(coord, state)| (*coord, state.clone()))
            .collect();
        let after: HashMap<TileCoord, TileState> = before
            .iter()
            .map(|(coord, _)| (*coord, self.shared_tile(*coord)))
            .collect();
        self.put_tiles(before);
        self.history.records[index].after = after;
        self.history.applied = index;
        debug!(
            "TiledDataManager({}): rolled back memento {} ({} tiles)",
            self.id,
            memento.id,
            self.history.records[index].after.len()
        );
        Ok(())
    }

    /// Re-apply the changes undone by rolling back `memento`.
    ///
    /// Fails with [`RasterError::RedoInvalidated`] when the data was edited
    /// after the rollback. Rolling forward an applied memento that is the
    /// most recent one is a no-op.
    pub fn rollforward(&mut self, memento: Memento) -> Result<(), RasterError> {
        self.check_owner(memento)?;
        let Some(index) = self.history.position(memento) else {
            if self.history.invalidated.contains(&memento.id) {
                warn!("TiledDataManager({}): redo of memento {} was invalidated", self.id, memento.id);
                return Err(RasterError::RedoInvalidated { memento: memento.id });
            }
            return Err(RasterError::MementoOutOfSequence { memento: memento.id });
        };
        if self.history.applied == index + 1 {
            return Ok(());
        }
        if self.history.applied != index {
            warn!("TiledDataManager({}): rollforward of memento {} out of sequence", self.id, memento.id);
            return Err(RasterError::MementoOutOfSequence { memento: memento.id });
        }

        let after: Vec<(TileCoord, TileState)> = self.history.records[index]
            .after
            .iter()
            .map(|(coord, state)| (*coord, state.clone()))
            .collect();
        self.put_tiles(after);
        self.history.applied = index + 1;
        debug!("TiledDataManager({}): rolled forward memento {}", self.id, memento.id);
        Ok(())
    }

    /// Whether a memento is in the live history and currently applied
    pub fn is_applied(&self, memento: Memento) -> bool {
        memento.manager_id == self.id
            && self
                .history
                .position(memento)
                .is_some_and(|index| index < self.history.applied)
    }

    /// Forget all undo records. Outstanding mementos become unknown.
    pub fn purge_history(&mut self) {
        let history = &mut self.history;
        history.invalidated.extend(history.records.iter().map(|r| r.id));
        history.records.clear();
        history.applied = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;

    fn snapshot(dm: &TiledDataManager, rect: Rect) -> Vec<u8> {
        let mut buf = vec![0u8; rect.area() as usize * dm.pixel_size()];
        dm.read_bytes(&mut buf, rect).unwrap();
        buf
    }

    #[test]
    fn test_rollback_and_rollforward_are_inverse() {
        let mut dm = TiledDataManager::new(1, &[0], 8).unwrap();
        let area = Rect::new(-10, -10, 40, 40);
        dm.write_bytes(&[1; 9], Rect::new(0, 0, 3, 3)).unwrap();
        let initial = snapshot(&dm, area);

        let m = dm.get_memento();
        dm.write_bytes(&[2; 4], Rect::new(1, 1, 2, 2)).unwrap();
        dm.write_bytes(&[3; 4], Rect::new(20, -5, 2, 2)).unwrap();
        let edited = snapshot(&dm, area);
        let edited_extent = dm.extent();

        dm.rollback(m).unwrap();
        assert_eq!(snapshot(&dm, area), initial);
        assert_eq!(dm.extent(), Some(Rect::new(0, 0, 8, 8)));
        assert!(!dm.is_applied(m));

        dm.rollforward(m).unwrap();
        assert_eq!(snapshot(&dm, area), edited);
        assert_eq!(dm.extent(), edited_extent);
        assert!(dm.is_applied(m));
    }

    #[test]
    fn test_large_rollback_rescans_extent_once() {
        let mut dm = TiledDataManager::new(1, &[0], 8).unwrap();
        let m = dm.get_memento();
        dm.write_bytes(&[4; 80 * 40], Rect::new(0, 0, 80, 40)).unwrap();
        assert_eq!(dm.tile_count(), 50);

        dm.rollback(m).unwrap();
        assert_eq!(dm.tile_count(), 0);
        assert_eq!(dm.extent(), None);
        assert_eq!(dm.extent_scans, 1);

        dm.rollforward(m).unwrap();
        assert_eq!(dm.extent(), Some(Rect::new(0, 0, 80, 40)));
        assert_eq!(dm.extent_scans, 1);
    }

    #[test]
    fn test_repeated_calls_are_idempotent() {
        let mut dm = TiledDataManager::new(1, &[0], 8).unwrap();
        let m = dm.get_memento();
        dm.write_bytes(&[5], Rect::new(0, 0, 1, 1)).unwrap();

        dm.rollforward(m).unwrap();
        assert_eq!(dm.pixel(0, 0), &[5]);
        dm.rollback(m).unwrap();
        dm.rollback(m).unwrap();
        assert_eq!(dm.pixel(0, 0), &[0]);
        dm.rollforward(m).unwrap();
        dm.rollforward(m).unwrap();
        assert_eq!(dm.pixel(0, 0), &[5]);
    }

    #[test]
    fn test_new_edit_after_rollback_invalidates_redo() {
        let mut dm = TiledDataManager::new(1, &[0], 8).unwrap();
        let m = dm.get_memento();
        dm.write_bytes(&[5], Rect::new(0, 0, 1, 1)).unwrap();
        dm.rollback(m).unwrap();

        dm.write_bytes(&[6], Rect::new(0, 0, 1, 1)).unwrap();
        assert!(matches!(dm.rollforward(m), Err(RasterError::RedoInvalidated { .. })));
        assert_eq!(dm.pixel(0, 0), &[6]);
    }

    #[test]
    fn test_nested_mementos_unwind_in_order() {
        let mut dm = TiledDataManager::new(1, &[0], 8).unwrap();
        let first = dm.get_memento();
        dm.write_bytes(&[1], Rect::new(0, 0, 1, 1)).unwrap();
        let second = dm.get_memento();
        dm.write_bytes(&[2], Rect::new(0, 0, 1, 1)).unwrap();

        assert!(matches!(dm.rollback(first), Err(RasterError::MementoOutOfSequence { .. })));
        dm.rollback(second).unwrap();
        assert_eq!(dm.pixel(0, 0), &[1]);
        dm.rollback(first).unwrap();
        assert_eq!(dm.pixel(0, 0), &[0]);
        assert_eq!(dm.tile_count(), 0);

        assert!(matches!(dm.rollforward(second), Err(RasterError::MementoOutOfSequence { .. })));
        dm.rollforward(first).unwrap();
        dm.rollforward(second).unwrap();
        assert_eq!(dm.pixel(0, 0), &[2]);
    }

    #[test]
    fn test_foreign_memento_is_rejected() {
        let mut a = TiledDataManager::new(1, &[0], 8).unwrap();
        let mut b = TiledDataManager::new(1, &[0], 8).unwrap();
        let m = a.get_memento();
        assert!(matches!(b.rollback(m), Err(RasterError::ForeignMemento { .. })));
    }

    #[test]
    fn test_history_keeps_old_tiles_alive() {
        let mut dm = TiledDataManager::new(1, &[0], 8).unwrap();
        dm.write_bytes(&[4; 64], Rect::new(0, 0, 8, 8)).unwrap();
        let m = dm.get_memento();
        dm.clear();
        assert_eq!(dm.tile_count(), 0);

        dm.rollback(m).unwrap();
        assert_eq!(dm.tile_count(), 1);
        assert_eq!(dm.pixel(7, 7), &[4]);
        dm.rollforward(m).unwrap();
        assert_eq!(dm.tile_count(), 0);
    }

    #[test]
    fn test_purge_history() {
        let mut dm = TiledDataManager::new(1, &[0], 8).unwrap();
        let m = dm.get_memento();
        dm.write_bytes(&[1], Rect::new(0, 0, 1, 1)).unwrap();
        dm.purge_history();
        assert!(dm.rollback(m).is_err());
        assert_eq!(dm.pixel(0, 0), &[1]);
    }
}
