//! Coalescing queue of field changes waiting to be flushed
//!
//! Only the latest change per `(record, field)` is kept, so a field written
//! many times between flushes costs one backend write.

use crate::backend::FieldOp;
use dashmap::DashMap;
use tiledata_common::RecordId;

#[derive(Default)]
pub(crate) struct PendingWrites {
    /// `None` marks a pending delete
    ops: DashMap<(RecordId, String), Option<String>>,
}

impl PendingWrites {
    pub(crate) fn put(&self, record: RecordId, field: impl Into<String>, value: impl Into<String>) {
        self.ops.insert((record, field.into()), Some(value.into()));
    }

    pub(crate) fn delete(&self, record: RecordId, field: impl Into<String>) {
        self.ops.insert((record, field.into()), None);
    }

    pub(crate) fn len(&self) -> usize {
        self.ops.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Take every queued change
    pub(crate) fn drain(&self) -> Vec<FieldOp> {
        let keys: Vec<(RecordId, String)> = self.ops.iter().map(|e| e.key().clone()).collect();
        keys.into_iter()
            .filter_map(|key| self.ops.remove(&key))
            .map(|((record, field), value)| FieldOp::from_change(record, field, value))
            .collect()
    }

    /// Take the queued changes of a single record
    pub(crate) fn drain_record(&self, record: RecordId) -> Vec<FieldOp> {
        let keys: Vec<(RecordId, String)> = self
            .ops
            .iter()
            .filter(|e| e.key().0 == record)
            .map(|e| e.key().clone())
            .collect();
        keys.into_iter()
            .filter_map(|key| self.ops.remove(&key))
            .map(|((record, field), value)| FieldOp::from_change(record, field, value))
            .collect()
    }

    /// Put back changes from a failed flush unless a newer change superseded them
    pub(crate) fn requeue(&self, ops: Vec<FieldOp>) {
        for op in ops {
            let (record, field, value) = op.into_change();
            self.ops.entry((record, field)).or_insert(value);
        }
    }

    /// Drop every queued change of a record
    pub(crate) fn discard_record(&self, record: RecordId) {
        self.ops.retain(|key, _| key.0 != record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coalesces_per_field() {
        let pending = PendingWrites::default();
        let id = RecordId::new();

        pending.put(id, "a", "1");
        pending.put(id, "a", "2");
        pending.delete(id, "b");
        assert_eq!(pending.len(), 2);

        let mut ops = pending.drain();
        ops.sort_by(|x, y| x.field().cmp(y.field()));
        assert_eq!(
            ops,
            vec![
                FieldOp::Put {
                    record: id,
                    field: "a".into(),
                    value: "2".into()
                },
                FieldOp::Delete {
                    record: id,
                    field: "b".into()
                },
            ]
        );
        assert!(pending.is_empty());
    }

    #[test]
    fn test_requeue_does_not_clobber_newer_change() {
        let pending = PendingWrites::default();
        let id = RecordId::new();

        pending.put(id, "a", "old");
        let ops = pending.drain();
        pending.put(id, "a", "new");
        pending.requeue(ops);

        let ops = pending.drain();
        assert_eq!(ops.len(), 1);
        assert_eq!(
            ops[0],
            FieldOp::Put {
                record: id,
                field: "a".into(),
                value: "new".into()
            }
        );
    }

    #[test]
    fn test_per_record_operations() {
        let pending = PendingWrites::default();
        let keep = RecordId::new();
        let drop_me = RecordId::new();

        pending.put(keep, "a", "1");
        pending.put(drop_me, "a", "1");
        pending.put(drop_me, "b", "1");

        assert_eq!(pending.drain_record(drop_me).len(), 2);
        pending.put(drop_me, "c", "1");
        pending.discard_record(drop_me);

        let ops = pending.drain();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].record(), keep);
    }
}
