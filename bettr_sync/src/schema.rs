//! Table schemas derived from model descriptors
//!
//! A [`ModelDescriptor`] is the declarative definition of a model. Registering
//! it produces an immutable [`TableSchema`] holding the table name, the single
//! primary-key column, the ordered column set and the declared relationships.

use crate::error::SchemaError;
use bettr_common::{ColumnType, Key, Row};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Convert a CamelCase type identifier to a snake_case table name.
///
/// An underscore goes between an ASCII lowercase letter or digit and a
/// following ASCII uppercase letter, then the whole string is lowercased:
/// `TeamGameLog` -> `team_game_log`, `Game2Log` -> `game2_log`,
/// `HTTPServer` -> `httpserver`.
pub fn table_name(type_name: &str) -> String {
    let mut out = String::with_capacity(type_name.len() + 4);
    let mut prev: Option<char> = None;

    for c in type_name.chars() {
        if c.is_ascii_uppercase() {
            if let Some(p) = prev {
                if p.is_ascii_lowercase() || p.is_ascii_digit() {
                    out.push('_');
                }
            }
        }
        out.extend(c.to_lowercase());
        prev = Some(c);
    }

    out
}

/// A column declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
    pub primary_key: bool,
    pub nullable: bool,
}

impl ColumnDef {
    /// A nullable, non-key column
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            primary_key: false,
            nullable: true,
        }
    }

    /// Mark as the primary key (implies not null)
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    /// Mark as not null
    pub fn required(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// A reference from one table to another
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    /// Attribute name of the relationship on the model
    pub name: String,
    /// Table name of the related model
    pub target: String,
    /// Local column holding the related table's key, if any
    pub foreign_key: Option<String>,
}

impl Relationship {
    /// `target` may be given as a model type name (`Team`) or a table name (`team`)
    pub fn new(name: impl Into<String>, target: &str) -> Self {
        Self {
            name: name.into(),
            target: table_name(target),
            foreign_key: None,
        }
    }

    pub fn via(mut self, column: impl Into<String>) -> Self {
        self.foreign_key = Some(column.into());
        self
    }
}

/// Declarative model definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDescriptor {
    pub type_name: String,
    pub columns: Vec<ColumnDef>,
    pub relationships: Vec<Relationship>,
}

impl ModelDescriptor {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            columns: Vec::new(),
            relationships: Vec::new(),
        }
    }

    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    pub fn relationship(mut self, relationship: Relationship) -> Self {
        self.relationships.push(relationship);
        self
    }

    /// Table name this model maps to
    pub fn table_name(&self) -> String {
        table_name(&self.type_name)
    }
}

/// Resolved, immutable identity of a table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    name: String,
    model: String,
    primary_key: String,
    columns: Vec<ColumnDef>,
    relationships: Vec<Relationship>,
    positions: HashMap<String, usize>,
}

impl TableSchema {
    /// Resolve a model descriptor, checking its declarations
    pub fn from_model(model: &ModelDescriptor) -> Result<Self, SchemaError> {
        let model_name = model.type_name.as_str();
        if !is_valid_name(model_name) {
            return Err(SchemaError::InvalidName {
                model: model_name.to_string(),
                name: model_name.to_string(),
            });
        }

        let mut positions = HashMap::with_capacity(model.columns.len());
        for (i, column) in model.columns.iter().enumerate() {
            if !is_valid_name(&column.name) {
                return Err(SchemaError::InvalidName {
                    model: model_name.to_string(),
                    name: column.name.clone(),
                });
            }
            if positions.insert(column.name.clone(), i).is_some() {
                return Err(SchemaError::DuplicateColumn {
                    model: model_name.to_string(),
                    column: column.name.clone(),
                });
            }
        }

        let keys: Vec<&ColumnDef> = model.columns.iter().filter(|c| c.primary_key).collect();
        let key = match keys.as_slice() {
            [] => {
                return Err(SchemaError::MissingPrimaryKey {
                    model: model_name.to_string(),
                })
            }
            [key] => *key,
            _ => {
                return Err(SchemaError::AmbiguousPrimaryKey {
                    model: model_name.to_string(),
                    columns: keys.iter().map(|c| c.name.clone()).collect(),
                })
            }
        };
        if !key.column_type.is_key_type() || key.nullable {
            return Err(SchemaError::UnsupportedKeyType {
                model: model_name.to_string(),
                column: key.name.clone(),
            });
        }

        for rel in &model.relationships {
            if !is_valid_name(&rel.name) || !is_valid_name(&rel.target) {
                return Err(SchemaError::InvalidName {
                    model: model_name.to_string(),
                    name: rel.name.clone(),
                });
            }
            if let Some(fk) = &rel.foreign_key {
                if !positions.contains_key(fk) {
                    return Err(SchemaError::UnknownRelationshipColumn {
                        model: model_name.to_string(),
                        relationship: rel.name.clone(),
                        column: fk.clone(),
                    });
                }
            }
        }

        Ok(Self {
            name: model.table_name(),
            model: model_name.to_string(),
            primary_key: key.name.clone(),
            columns: model.columns.clone(),
            relationships: model.relationships.clone(),
            positions,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type name of the model this table was derived from
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.positions.get(name).map(|&i| &self.columns[i])
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.positions.contains_key(name)
    }

    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    /// Primary-key value of a row, if present and of a key type
    pub fn key_of(&self, row: &Row) -> Option<Key> {
        row.get(&self.primary_key).and_then(|v| v.as_key())
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.trim().is_empty() && !name.chars().any(char::is_control)
}

/// Registered table schemas, keyed by table name
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: RwLock<HashMap<String, Arc<TableSchema>>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model, returning its schema.
    ///
    /// Registering the same definition again returns the cached schema.
    /// A different definition for an already registered table is a conflict.
    pub fn register(&self, model: &ModelDescriptor) -> Result<Arc<TableSchema>, SchemaError> {
        // Fast path: already registered, nothing to resolve
        if let Some(existing) = self.lookup(&model.table_name()) {
            return if existing.columns == model.columns
                && existing.relationships == model.relationships
                && existing.model == model.type_name
            {
                Ok(existing)
            } else {
                Err(SchemaError::Conflict {
                    table: existing.name.clone(),
                })
            };
        }

        let schema = TableSchema::from_model(model)?;
        let mut schemas = self.schemas.write().unwrap_or_else(PoisonError::into_inner);

        // Another thread may have registered it while we resolved
        if let Some(existing) = schemas.get(&schema.name) {
            return if **existing == schema {
                Ok(Arc::clone(existing))
            } else {
                Err(SchemaError::Conflict {
                    table: schema.name.clone(),
                })
            };
        }

        log::info!(
            "Registered schema {} (primary key: {}, {} columns, {} relationships)",
            schema.name,
            schema.primary_key,
            schema.columns.len(),
            schema.relationships.len()
        );
        let schema = Arc::new(schema);
        schemas.insert(schema.name.clone(), Arc::clone(&schema));
        Ok(schema)
    }

    /// Look up a registered schema by table name
    pub fn get(&self, table: &str) -> Result<Arc<TableSchema>, SchemaError> {
        self.lookup(table).ok_or_else(|| SchemaError::NotFound {
            table: table.to_string(),
        })
    }

    /// Registered table names, sorted
    pub fn tables(&self) -> Vec<String> {
        let schemas = self.schemas.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = schemas.keys().cloned().collect();
        names.sort();
        names
    }

    fn lookup(&self, table: &str) -> Option<Arc<TableSchema>> {
        self.schemas
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(table)
            .cloned()
    }
}
