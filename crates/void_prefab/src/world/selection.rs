//! Selection helpers shared by the structural operations

use super::PrefabWorld;
use crate::error::{PrefabError, Result};
use crate::id::EntityId;
use crate::instance::InstanceHandle;
use std::collections::{BTreeSet, VecDeque};

impl PrefabWorld {
    /// The instance whose document holds every entity in `ids`
    ///
    /// A container counts as part of its instance's parent.
    pub fn entities_belong_to_same_instance(&self, ids: &[EntityId]) -> Result<InstanceHandle> {
        let mut common = None;
        for &id in ids {
            let owner = self.entity_owner(id)?;
            let frame = self
                .entity_frame(owner)
                .ok_or_else(|| PrefabError::Validation(format!("{} is the root container", id)))?;
            match common {
                None => common = Some(frame),
                Some(existing) if existing == frame => {}
                Some(existing) => {
                    return Err(PrefabError::Validation(format!(
                        "{} belongs to '{}', not '{}'",
                        id,
                        self.tree.absolute_alias_path(frame),
                        self.tree.absolute_alias_path(existing)
                    )));
                }
            }
        }
        common.ok_or_else(|| PrefabError::Validation("no entities given".to_string()))
    }

    /// Collect `ids` and their live descendants into entities owned by
    /// `owner` and the nested instances of `owner` they reach
    ///
    /// Entities are returned breadth-first; instances in the order found.
    pub fn retrieve_and_sort_prefab_entities_and_instances(
        &self,
        ids: &[EntityId],
        owner: InstanceHandle,
    ) -> Result<(Vec<EntityId>, Vec<InstanceHandle>)> {
        if ids.is_empty() {
            return Err(PrefabError::Validation("no entities given".to_string()));
        }

        let mut entities = Vec::new();
        let mut instances = Vec::new();
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<EntityId> = ids.iter().copied().collect();

        while let Some(id) = queue.pop_front() {
            if !seen.insert(id) {
                continue;
            }
            let entity_owner = self.entity_owner(id)?;
            if entity_owner.instance == owner && !entity_owner.is_container() {
                entities.push(id);
                queue.extend(self.children_of(id));
                continue;
            }

            // Anything else must sit inside one of owner's nested instances
            let nested = if entity_owner.instance == owner {
                None
            } else {
                self.tree.child_towards(owner, entity_owner.instance)
            };
            let Some(nested) = nested else {
                return Err(PrefabError::Validation(format!(
                    "{} does not belong to '{}'",
                    id,
                    self.tree.absolute_alias_path(owner)
                )));
            };
            if !instances.contains(&nested) {
                instances.push(nested);
            }
            // Entities parented below a nested container still belong to owner
            // when they live in owner's document
            let container = self.container_entity_id(nested)?;
            if container == id {
                queue.extend(
                    self.children_of(id)
                        .into_iter()
                        .filter(|child| self.owning_instance(*child) == Some(owner)),
                );
            }
        }
        Ok((entities, instances))
    }

    /// Members of `ids` with no ancestor in `ids`, in input order
    pub(crate) fn top_level_entities(&self, ids: &[EntityId]) -> Vec<EntityId> {
        ids.iter()
            .copied()
            .filter(|id| !self.entity_ancestors(*id).iter().any(|a| ids.contains(a)))
            .collect()
    }
}
