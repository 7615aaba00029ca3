//! Column projection over record layouts.
//!
//! A `ProjectionSpec` is an ordered, de-duplicated list of dotted field
//! paths. Projecting a schema prunes it to the requested fields while keeping
//! the source field order.

use std::collections::BTreeMap;

use crate::error::SchemaError;
use crate::schema::{FieldSchema, FieldType, RecordSchema};

/// Ordered set of dotted field paths selecting the fields to materialize.
///
/// An empty spec selects every field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectionSpec {
    paths: Vec<String>,
}

impl ProjectionSpec {
    /// The identity projection.
    pub fn all() -> Self {
        Self::default()
    }

    /// Build a projection from paths, dropping repeats (first occurrence wins).
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for path in paths {
            let path = path.into();
            let path = path.trim();
            if !path.is_empty() && !unique.iter().any(|p| p == path) {
                unique.push(path.to_string());
            }
        }
        Self { paths: unique }
    }

    /// Parse a comma-separated column list such as `"id, home.city"`.
    pub fn parse(list: &str) -> Self {
        Self::new(list.split(','))
    }

    /// The selected paths in request order.
    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    /// Whether this spec selects every field.
    pub fn is_all(&self) -> bool {
        self.paths.is_empty()
    }

    /// The comma-separated form accepted by [`ProjectionSpec::parse`].
    pub fn to_list_string(&self) -> String {
        self.paths.join(",")
    }
}

impl std::fmt::Display for ProjectionSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_all() {
            write!(f, "*")
        } else {
            write!(f, "{}", self.paths.join(", "))
        }
    }
}

/// Tree of requested path segments.
#[derive(Debug, Default)]
struct PathTree {
    /// The node itself was requested, selecting its whole subtree
    whole: bool,
    children: BTreeMap<String, PathTree>,
}

impl PathTree {
    fn from_paths<'a>(paths: impl IntoIterator<Item = &'a str>) -> Self {
        let mut root = PathTree::default();
        for path in paths {
            let mut node = &mut root;
            for segment in path.split('.') {
                node = node.children.entry(segment.to_string()).or_default();
            }
            node.whole = true;
        }
        root
    }
}

/// Project `schema` onto the fields named by `spec`.
///
/// The result preserves the relative order of `schema`, regardless of the
/// order of paths in `spec`. A path that descends into a record selects only
/// the named children of that record; a path that names a record selects it
/// whole. Paths may descend into the item record of a list.
///
/// # Errors
/// `SchemaError::UnknownField` for the first path that does not match.
pub fn project(schema: &RecordSchema, spec: &ProjectionSpec) -> Result<RecordSchema, SchemaError> {
    if spec.is_all() {
        return Ok(schema.clone());
    }
    for path in spec.paths() {
        check_path(schema, path)?;
    }
    let tree = PathTree::from_paths(spec.paths().iter().map(String::as_str));
    let mut projected = prune_record(schema, &tree);
    projected.name = schema.name.clone();
    Ok(projected)
}

/// Project onto the union of several path lists.
///
/// Used to compute the fields a decoder must materialize when both a
/// projection and a filter reference the schema.
pub fn project_union<'a>(
    schema: &RecordSchema,
    paths: impl IntoIterator<Item = &'a str>,
) -> Result<RecordSchema, SchemaError> {
    let paths: Vec<&str> = paths.into_iter().collect();
    for path in &paths {
        check_path(schema, path)?;
    }
    let tree = PathTree::from_paths(paths);
    let mut projected = prune_record(schema, &tree);
    projected.name = schema.name.clone();
    Ok(projected)
}

fn check_path(schema: &RecordSchema, path: &str) -> Result<(), SchemaError> {
    if path.split('.').any(str::is_empty) || schema.lookup(path).is_none() {
        return Err(SchemaError::UnknownField(path.to_string()));
    }
    Ok(())
}

fn prune_record(record: &RecordSchema, tree: &PathTree) -> RecordSchema {
    let fields = record
        .fields
        .iter()
        .filter_map(|field| {
            let node = tree.children.get(&field.name)?;
            if node.whole || node.children.is_empty() {
                return Some(field.clone());
            }
            Some(FieldSchema::new(
                field.name.clone(),
                prune_type(&field.field_type, node),
            ))
        })
        .collect();
    RecordSchema::new(fields)
}

fn prune_type(field_type: &FieldType, node: &PathTree) -> FieldType {
    match field_type {
        FieldType::Record(inner) => FieldType::Record(prune_record(inner, node)),
        FieldType::List(items) => FieldType::List(Box::new(prune_type(items, node))),
        scalar => scalar.clone(),
    }
}
