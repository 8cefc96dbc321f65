use anyhow::Result;

use super::hash_tree::HashTree;
use crate::hash::{POSITION_BYTES, Position};
use crate::tree::{Nibble, Print, stitch};

const POSITION_NIBBLES: usize = POSITION_BYTES * 2;

/// One anti-entropy pass copying diverging entries from `source` into
/// `destination`.
///
/// Entries only move when the source copy wins under last-writer-wins, so
/// running a pass in each direction converges both sides. With a range set,
/// only top-level keys whose first 16 bytes fall in `[from, to)` are touched.
pub struct TreeSync<'a> {
    source: &'a dyn HashTree,
    destination: &'a dyn HashTree,
    range: Option<(Position, Position)>,
    destroy: bool,
    puts: usize,
    dels: usize,
}

impl<'a> TreeSync<'a> {
    pub fn new(source: &'a dyn HashTree, destination: &'a dyn HashTree) -> Self {
        Self {
            source,
            destination,
            range: None,
            destroy: false,
            puts: 0,
            dels: 0,
        }
    }

    /// Restricts the pass to keys positioned in `[from, to)`, wrapping.
    pub fn range(mut self, from: Position, to: Position) -> Self {
        self.range = Some((from, to));
        self
    }

    /// Deletes every reconciled entry from the source once the destination
    /// holds it at least as new.
    pub fn destroy(mut self) -> Self {
        self.destroy = true;
        self
    }

    pub fn put_count(&self) -> usize {
        self.puts
    }

    pub fn del_count(&self) -> usize {
        self.dels
    }

    pub async fn run(&mut self) -> Result<()> {
        if !self.destroy && self.source.hash().await? == self.destination.hash().await? {
            return Ok(());
        }

        let mut pending: Vec<(Option<Vec<u8>>, Vec<Nibble>)> = vec![(None, Vec::new())];
        while let Some((scope, key)) = pending.pop() {
            let scope_ref = scope.as_deref();
            let Some(source_print) = self.source.finger(scope_ref, &key).await? else {
                continue;
            };
            let destination_print = self.destination.finger(scope_ref, &key).await?;
            let in_range = scope.is_some() || self.covers(&key);

            if in_range && source_print.has_entry() {
                self.reconcile(scope_ref, &key, &source_print, destination_print.as_ref())
                    .await?;
            }

            let tree_differs = destination_print
                .as_ref()
                .is_none_or(|d| d.tree_hash != source_print.tree_hash);
            if scope.is_none() && in_range && source_print.sub_tree && (self.destroy || tree_differs) {
                pending.push((Some(stitch(&key)), Vec::new()));
            }

            for slot in (0..16).rev() {
                let Some(child) = source_print.child(slot) else {
                    continue;
                };
                let differs = self.destroy
                    || destination_print
                        .as_ref()
                        .and_then(|d| d.child(slot))
                        .is_none_or(|d| d.key != child.key || d.sum != child.sum);
                if differs && (scope.is_some() || self.may_contain(&child.key)) {
                    pending.push((scope.clone(), child.key.clone()));
                }
            }
        }
        Ok(())
    }

    async fn reconcile(
        &mut self,
        scope: Option<&[u8]>,
        key: &[Nibble],
        source_print: &Print,
        destination_print: Option<&Print>,
    ) -> Result<()> {
        let delivered = if source_print.supersedes(destination_print) {
            let Some(stamp) = self.source.get_timestamp(scope, key).await? else {
                return Ok(());
            };
            let expected = destination_print
                .filter(|d| d.has_entry())
                .map(|d| d.timestamp);
            let written = self
                .destination
                .put_timestamp(scope, key, stamp.value, expected, stamp.timestamp)
                .await?;
            if written {
                self.puts += 1;
            }
            written
        } else {
            true
        };

        if self.destroy
            && delivered
            && self
                .source
                .del_timestamp(scope, key, source_print.timestamp)
                .await?
        {
            self.dels += 1;
        }
        Ok(())
    }

    fn covers(&self, key: &[Nibble]) -> bool {
        match &self.range {
            Some((from, to)) => Position::from_prefix(&stitch(key)).within(from, to),
            None => true,
        }
    }

    /// Whether any key below `prefix` can have a position inside the range.
    fn may_contain(&self, prefix: &[Nibble]) -> bool {
        let Some((from, to)) = &self.range else {
            return true;
        };
        if prefix.len() >= POSITION_NIBBLES {
            return self.covers(prefix);
        }

        let mut low = prefix.to_vec();
        low.resize(POSITION_NIBBLES, 0);
        let mut high = prefix.to_vec();
        high.resize(POSITION_NIBBLES, 0x0f);
        let low = Position::from_prefix(&stitch(&low));
        let high = Position::from_prefix(&stitch(&high));

        match from.cmp(to) {
            std::cmp::Ordering::Less => low < *to && high >= *from,
            std::cmp::Ordering::Greater => high >= *from || low < *to,
            std::cmp::Ordering::Equal => true,
        }
    }
}
