//! Relationship id renumbering for story parts
//!
//! A story's relationships are given fresh `rIdN` ids when it is written: ids
//! referenced by its content come first, in document order, then the remaining
//! relationships of the part, then the structural relationships the encoder adds.
//! Ids that content references but the table lacks (broken references) are never
//! handed out, so a dangling reference cannot start pointing at another target.

use std::collections::{BTreeMap, BTreeSet};

use super::types::{Relationship, RelationshipTable, RelationshipType, TargetMode};

/// Old id to new id mapping plus the renumbered table
#[derive(Debug, Default)]
pub struct RelationshipMapper {
    ids: BTreeMap<String, String>,
    table: RelationshipTable,
    reserved: BTreeSet<String>,
    next: u32,
}

impl RelationshipMapper {
    /// Renumbers `table`
    ///
    /// `referenced` lists relationship ids in the order content uses them.
    /// `structural` relationships are appended last with fresh ids.
    pub fn build(
        table: &RelationshipTable,
        referenced: &[String],
        structural: &[(RelationshipType, String)],
    ) -> Self {
        let mut mapper = RelationshipMapper {
            reserved: referenced
                .iter()
                .filter(|id| table.get(id).is_none())
                .cloned()
                .collect(),
            ..Default::default()
        };

        for id in referenced {
            if let Some(rel) = table.get(id) {
                mapper.assign(rel);
            }
        }

        let mut remaining: Vec<&Relationship> = table.iter().filter(|rel| !mapper.ids.contains_key(&rel.id)).collect();
        remaining.sort_by(|a, b| natural_key(&a.id).cmp(&natural_key(&b.id)));
        for rel in remaining {
            mapper.assign(rel);
        }

        for (rel_type, target) in structural {
            let id = mapper.fresh_id();
            mapper.table.insert(Relationship {
                id,
                rel_type: rel_type.clone(),
                target: target.clone(),
                mode: TargetMode::Internal,
            });
        }
        mapper
    }

    fn assign(&mut self, rel: &Relationship) {
        if self.ids.contains_key(&rel.id) {
            return;
        }
        let id = self.fresh_id();
        self.ids.insert(rel.id.clone(), id.clone());
        self.table.insert(Relationship { id, ..rel.clone() });
    }

    fn fresh_id(&mut self) -> String {
        loop {
            self.next += 1;
            let id = format!("rId{}", self.next);
            if !self.reserved.contains(&id) {
                return id;
            }
        }
    }

    /// New id of an old relationship id; `None` for ids not in the table
    pub fn get(&self, old: &str) -> Option<&str> {
        self.ids.get(old).map(String::as_str)
    }

    pub fn table(&self) -> &RelationshipTable {
        &self.table
    }
}

/// Sort key putting `rId2` before `rId10`; ids without a number sort last by text
fn natural_key(id: &str) -> (u64, &str) {
    let number = id
        .strip_prefix("rId")
        .and_then(|n| n.parse::<u64>().ok())
        .unwrap_or(u64::MAX);
    (number, id)
}
