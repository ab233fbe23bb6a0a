//! Inheritance resolution: ids, tables, strategies and discriminators.

use super::members::Members;
use super::SchemaBuilder;
use crate::error::MetadataError;
use crate::metadata::{EntityDef, InheritanceStrategy};
use crate::schema::entity::{Discriminator, EntityId, EntityKind, EntitySchema, TableName};
use std::collections::{HashMap, HashSet};
use tracing::debug;

impl<'a> SchemaBuilder<'a> {
    pub(super) fn resolve_hierarchy(&mut self) -> Result<(), MetadataError> {
        for def in &self.registry.entities {
            self.check_ancestry(def)?;
        }

        let concrete: Vec<&'a EntityDef> = self
            .registry
            .entities
            .iter()
            .filter(|d| !d.is_abstract)
            .collect();

        for def in &concrete {
            let id = EntityId(self.entities.len());
            self.ids.insert(def.name.clone(), id);
            self.entities.push(placeholder(id, &def.name));
        }
        self.members = concrete.iter().map(|_| Members::default()).collect();

        let mut discriminators: HashMap<(EntityId, String), String> = HashMap::new();
        for def in concrete {
            let id = self.ids[&def.name];
            let root = self.hierarchy_root(def)?;
            let root_id = self.ids[&root.name];
            let strategy = self.strategy_of(def, root)?;

            let parent = match strategy {
                Some(InheritanceStrategy::SingleTable | InheritanceStrategy::ClassTable) => self
                    .concrete_parent(def)?
                    .map(|p| self.ids[&p.name]),
                _ => None,
            };

            let root_table = self.table_name_of(root);
            let table = if strategy == Some(InheritanceStrategy::SingleTable) && root_id != id {
                if def.table_name.is_some() && def.table_name != root.table_name {
                    return Err(MetadataError::InvalidInheritance {
                        entity: def.name.clone(),
                        reason: "a single-table child cannot declare its own table".to_string(),
                    });
                }
                root_table
            } else {
                TableName::new(
                    def.schema.clone().or_else(|| root_table.schema.clone()),
                    self.naming.table_name(&def.name, def.table_name.as_deref()),
                )
            };

            let tables = match strategy {
                Some(InheritanceStrategy::SingleTable) => vec![root_id],
                Some(InheritanceStrategy::ClassTable) => self.concrete_chain(def)?,
                _ => vec![id],
            };

            let discriminator = match strategy {
                Some(InheritanceStrategy::SingleTable | InheritanceStrategy::ClassTable) => {
                    let column = root
                        .inheritance
                        .as_ref()
                        .and_then(|i| i.discriminator.as_ref())
                        .map(|d| d.name.clone())
                        .unwrap_or_else(|| self.options.discriminator_column.clone());
                    let value = def
                        .discriminator_value
                        .clone()
                        .unwrap_or_else(|| self.naming.discriminator_value(&def.name));
                    if let Some(first) =
                        discriminators.insert((root_id, value.clone()), def.name.clone())
                    {
                        return Err(MetadataError::DuplicateDiscriminator {
                            value,
                            first,
                            second: def.name.clone(),
                        });
                    }
                    Some(Discriminator { column, value })
                }
                _ => None,
            };

            let entity = &mut self.entities[id.0];
            entity.table = table;
            entity.tables = tables;
            entity.parent = parent;
            entity.inheritance = strategy;
            entity.discriminator = discriminator;
            if let Some(parent) = parent {
                self.entities[parent.0].children.push(id);
            }
            debug!(entity = %def.name, ?strategy, "hierarchy resolved");
        }
        Ok(())
    }

    /// Declarations contributing members to `def`, top-down, with the entity
    /// whose table stores them and the concrete entity that declared them.
    pub(super) fn chain_members(
        &self,
        def: &'a EntityDef,
    ) -> Result<Vec<(&'a EntityDef, EntityId, EntityId)>, MetadataError> {
        let id = self.ids[&def.name];
        let strategy = self.entities[id.0].inheritance;
        let root = self.entities[id.0].tables[0];

        let mut chain = Vec::new();
        let mut last_concrete = id;
        let mut current = Some(def);
        while let Some(decl) = current {
            if !decl.is_abstract {
                last_concrete = self.ids[&decl.name];
            }
            let owner = match strategy {
                Some(InheritanceStrategy::SingleTable) => root,
                Some(InheritanceStrategy::ClassTable) => last_concrete,
                _ => id,
            };
            chain.push((decl, owner, last_concrete));
            current = match &decl.parent {
                Some(parent) => Some(self.def(parent)?),
                None => None,
            };
        }
        chain.reverse();
        Ok(chain)
    }

    fn check_ancestry(&self, def: &'a EntityDef) -> Result<(), MetadataError> {
        let mut seen = HashSet::from([def.name.as_str()]);
        let mut current = def;
        while let Some(parent) = &current.parent {
            let parent_def = self.def(parent)?;
            if !seen.insert(parent_def.name.as_str()) {
                return Err(MetadataError::InvalidInheritance {
                    entity: def.name.clone(),
                    reason: "inheritance cycle".to_string(),
                });
            }
            current = parent_def;
        }
        if def.is_abstract {
            if let Some(inheritance) = &def.inheritance {
                if inheritance.strategy != InheritanceStrategy::ConcreteTable {
                    return Err(MetadataError::InvalidInheritance {
                        entity: def.name.clone(),
                        reason: "an abstract entity cannot root a shared-table hierarchy"
                            .to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Topmost concrete entity of `def`'s ancestry, `def` included.
    fn hierarchy_root(&self, def: &'a EntityDef) -> Result<&'a EntityDef, MetadataError> {
        let mut root = def;
        let mut current = def;
        while let Some(parent) = &current.parent {
            current = self.def(parent)?;
            if !current.is_abstract {
                root = current;
            }
        }
        Ok(root)
    }

    fn concrete_parent(&self, def: &'a EntityDef) -> Result<Option<&'a EntityDef>, MetadataError> {
        let mut current = def;
        while let Some(parent) = &current.parent {
            current = self.def(parent)?;
            if !current.is_abstract {
                return Ok(Some(current));
            }
        }
        Ok(None)
    }

    /// Concrete entities from the root down to `def`.
    fn concrete_chain(&self, def: &'a EntityDef) -> Result<Vec<EntityId>, MetadataError> {
        let mut chain = vec![self.ids[&def.name]];
        let mut current = def;
        while let Some(parent) = self.concrete_parent(current)? {
            chain.push(self.ids[&parent.name]);
            current = parent;
        }
        chain.reverse();
        Ok(chain)
    }

    fn strategy_of(
        &self,
        def: &'a EntityDef,
        root: &'a EntityDef,
    ) -> Result<Option<InheritanceStrategy>, MetadataError> {
        if root.name != def.name && def.inheritance.is_some() {
            return Err(MetadataError::InvalidInheritance {
                entity: def.name.clone(),
                reason: format!("only the hierarchy root '{}' declares inheritance", root.name),
            });
        }
        if let Some(inheritance) = &root.inheritance {
            return Ok(Some(inheritance.strategy));
        }
        if root.name != def.name {
            return Err(MetadataError::InvalidInheritance {
                entity: root.name.clone(),
                reason: "entity is extended but declares no inheritance strategy".to_string(),
            });
        }

        let mut current = def;
        while let Some(parent) = &current.parent {
            current = self.def(parent)?;
            if current.inheritance.is_some() {
                return Ok(Some(InheritanceStrategy::ConcreteTable));
            }
        }
        Ok(None)
    }

    fn table_name_of(&self, def: &EntityDef) -> TableName {
        TableName::new(
            def.schema.clone(),
            self.naming.table_name(&def.name, def.table_name.as_deref()),
        )
    }
}

fn placeholder(id: EntityId, name: &str) -> EntitySchema {
    EntitySchema {
        id,
        name: name.to_string(),
        kind: EntityKind::Regular,
        table: TableName::new(None, name),
        tables: vec![id],
        primary_key_name: String::new(),
        columns: Vec::new(),
        relations: Vec::new(),
        embeddeds: Vec::new(),
        foreign_keys: Vec::new(),
        indices: Vec::new(),
        uniques: Vec::new(),
        checks: Vec::new(),
        exclusions: Vec::new(),
        parent: None,
        children: Vec::new(),
        inheritance: None,
        discriminator: None,
        tree: None,
    }
}

/// Empty schema for a generated junction or closure entity.
pub(super) fn generated_entity(name: &str, kind: EntityKind, table: TableName) -> EntitySchema {
    let mut schema = placeholder(EntityId(0), name);
    schema.kind = kind;
    schema.table = table;
    schema
}
