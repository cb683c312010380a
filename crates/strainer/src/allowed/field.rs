//! Allow-listed field selection.
//!
//! Root columns may be listed bare (`name`) or qualified with the root
//! table (`users.name`). Related columns are only allowed when listed
//! qualified with their group (`posts.title`).

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::QueryResult;
use crate::request::FieldMap;
use crate::scope::QueryScope;

/// Requested fields intersected with the allow-list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSelection {
    pub root: Vec<String>,
    pub relations: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct FieldRegistry {
    fields: Vec<String>,
}

impl FieldRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, field: impl Into<String>) {
        self.fields.push(field.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    fn allows_root(&self, root_table: &str, column: &str) -> bool {
        self.fields.iter().any(|f| {
            let qualified = f.strip_prefix(root_table).and_then(|r| r.strip_prefix('.'));
            f == column || qualified == Some(column)
        })
    }

    fn allows_related(&self, group: &str, column: &str) -> bool {
        self.fields
            .iter()
            .any(|f| f.rsplit_once('.') == Some((group, column)))
    }

    /// Intersect requested fields with the allow-list.
    ///
    /// Root fields come from the un-qualified list, or from the group named
    /// after the root table when that list is empty.
    pub fn select(&self, requested: &FieldMap, root_table: &str) -> FieldSelection {
        let root_requested = if requested.root.is_empty() {
            requested.tables.get(root_table).cloned().unwrap_or_default()
        } else {
            requested.root.clone()
        };

        let mut selection = FieldSelection::default();
        for column in root_requested {
            if self.allows_root(root_table, &column) && !selection.root.contains(&column) {
                selection.root.push(column);
            }
        }

        for (group, columns) in &requested.tables {
            if group == root_table {
                continue;
            }
            let mut allowed: Vec<String> = Vec::new();
            for column in columns {
                if self.allows_related(group, column) && !allowed.contains(column) {
                    allowed.push(column.clone());
                }
            }
            if !allowed.is_empty() {
                selection.relations.insert(group.clone(), allowed);
            }
        }
        selection
    }

    /// Restrict the root selection and the column lists of related loads.
    ///
    /// Fields that are not allowed, and groups that do not name a relation,
    /// are dropped.
    pub fn apply(&self, requested: &FieldMap, scope: &mut dyn QueryScope) -> QueryResult<()> {
        if requested.is_empty() {
            return Ok(());
        }
        let root_table = scope.table().to_string();
        let selection = self.select(requested, &root_table);

        if !selection.root.is_empty() {
            let columns = selection
                .root
                .iter()
                .map(|c| scope.qualify_column(c))
                .collect();
            debug!(fields = ?selection.root, "restricting root columns");
            scope.select_columns(columns)?;
        }

        for (group, columns) in selection.relations {
            let first = group.split('.').next().unwrap_or(&group);
            if !scope.has_relation(first) {
                debug!(group = %group, "field group is not a relation; dropped");
                continue;
            }
            scope.eager_load(&group, Some(columns))?;
        }
        Ok(())
    }
}

impl<S: Into<String>> FromIterator<S> for FieldRegistry {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(Into::into).collect(),
        }
    }
}
