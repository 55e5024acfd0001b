use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::metadata::{RecordDescriptor, UnsupportedShapeError};
use crate::statement::query_builder::{
    build_key_join, build_returning, build_set_clause, build_values_source, column_list,
    qualified, qualified_column_list, quote_identifier, ORDINAL_COLUMN, SOURCE_ALIAS,
    TARGET_ALIAS,
};

/// The kind of bulk write to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Insert,
    Update,
    Upsert,
    Delete,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Insert => "insert",
            OperationKind::Update => "update",
            OperationKind::Upsert => "upsert",
            OperationKind::Delete => "delete",
        }
    }

    pub fn needs_key(&self) -> bool {
        !matches!(self, OperationKind::Insert)
    }

    pub fn accepts_filter(&self) -> bool {
        matches!(self, OperationKind::Update | OperationKind::Delete)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The SQL skeleton for one batch size plus the column maps needed to bind
/// parameters and read output rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementTemplate {
    pub kind: OperationKind,
    pub sql: String,
    pub batch_size: usize,
    /// Descriptor column indices in per-record parameter order.
    pub bound_columns: Vec<usize>,
    /// Descriptor column indices following the ordinal and action in every output row.
    pub output_columns: Vec<usize>,
    pub returns_rows: bool,
}

impl StatementTemplate {
    pub fn parameters_per_record(&self) -> usize {
        self.bound_columns.len()
    }

    /// Number of parameters bound for the records of one batch.
    pub fn record_parameters(&self) -> usize {
        self.batch_size * self.bound_columns.len()
    }
}

/// Columns bound for every record of an operation, in parameter order.
pub fn bound_columns(
    descriptor: &RecordDescriptor,
    kind: OperationKind,
) -> Result<Vec<usize>, UnsupportedShapeError> {
    let keys = descriptor.require_key(kind)?;

    let columns = match kind {
        OperationKind::Insert => descriptor.insertable_columns().to_vec(),
        OperationKind::Update => {
            if descriptor.updatable_columns().is_empty() {
                return Err(UnsupportedShapeError::NothingToUpdate {
                    entity: descriptor.entity.clone(),
                    operation: kind,
                });
            }
            keys.iter().chain(descriptor.updatable_columns()).copied().collect()
        }
        OperationKind::Upsert => {
            let mut columns = keys.to_vec();
            columns.extend(
                descriptor.insertable_columns().iter().filter(|i| !keys.contains(i)).copied(),
            );
            columns
        }
        OperationKind::Delete => keys.to_vec(),
    };

    Ok(columns)
}

/// Builds the MERGE statement for a batch of `batch_size` records.
///
/// `filter` is an already rendered predicate over the target alias whose
/// parameters are numbered after the batch's record parameters.
pub fn build_template(
    descriptor: &RecordDescriptor,
    kind: OperationKind,
    batch_size: usize,
    filter: Option<&str>,
) -> Result<StatementTemplate, UnsupportedShapeError> {
    if filter.is_some() && !kind.accepts_filter() {
        return Err(UnsupportedShapeError::FilterNotSupported {
            entity: descriptor.entity.clone(),
            operation: kind,
        });
    }

    let bound = bound_columns(descriptor, kind)?;
    let keys = descriptor.key_columns();

    let on_clause = match kind {
        // nothing in the target can match, every source row takes the insert branch
        OperationKind::Insert => "FALSE".to_string(),
        _ => build_key_join(descriptor, TARGET_ALIAS, SOURCE_ALIAS, keys),
    };

    let matched = match filter {
        Some(filter) => format!("WHEN MATCHED AND ({})", filter),
        None => "WHEN MATCHED".to_string(),
    };

    let mut actions = Vec::new();
    match kind {
        OperationKind::Insert => actions.push(build_insert_action(descriptor)),
        OperationKind::Update => {
            actions.push(format!("{} THEN\n    {}", matched, build_update_action(descriptor)))
        }
        OperationKind::Upsert => {
            actions.push(format!("{} THEN\n    {}", matched, build_update_action(descriptor)));
            actions.push(build_insert_action(descriptor));
        }
        OperationKind::Delete => actions.push(format!("{} THEN\n    DELETE", matched)),
    }

    let output_columns = descriptor.output_columns(kind);
    let returns_rows = match kind {
        OperationKind::Upsert => true,
        OperationKind::Delete => false,
        OperationKind::Insert | OperationKind::Update => !output_columns.is_empty(),
    };

    let returning = if returns_rows {
        let mut items =
            vec![qualified(SOURCE_ALIAS, ORDINAL_COLUMN), "merge_action()".to_string()];
        items.extend(output_columns.iter().map(|&i| qualified(TARGET_ALIAS, &descriptor.columns[i].name)));
        build_returning(&items)
    } else {
        String::new()
    };

    let sql = format!(
        "MERGE INTO {} AS {}\nUSING {}\nON {}\n{}{}",
        descriptor.table,
        TARGET_ALIAS,
        build_values_source(descriptor, &bound, batch_size),
        on_clause,
        actions.join("\n"),
        returning
    );

    Ok(StatementTemplate {
        kind,
        sql,
        batch_size,
        bound_columns: bound,
        output_columns: if returns_rows { output_columns } else { Vec::new() },
        returns_rows,
    })
}

fn build_insert_action(descriptor: &RecordDescriptor) -> String {
    let insertable = descriptor.insertable_columns();

    if insertable.is_empty() {
        "WHEN NOT MATCHED THEN\n    INSERT DEFAULT VALUES".to_string()
    } else {
        format!(
            "WHEN NOT MATCHED THEN\n    INSERT ({}) VALUES ({})",
            column_list(descriptor, insertable),
            qualified_column_list(descriptor, SOURCE_ALIAS, insertable)
        )
    }
}

fn build_update_action(descriptor: &RecordDescriptor) -> String {
    let updatable = descriptor.updatable_columns();

    if updatable.is_empty() {
        // only keys are writable, a self assignment keeps the row reported by RETURNING
        let key = &descriptor.columns[descriptor.key_columns()[0]].name;
        return format!("UPDATE SET {} = {}", quote_identifier(key), qualified(TARGET_ALIAS, key));
    }

    let set_clauses: Vec<String> =
        updatable.iter().map(|&i| build_set_clause(&descriptor.columns[i].name)).collect();

    format!("UPDATE SET {}", set_clauses.join(", "))
}

type TemplateKey = (TypeId, OperationKind, usize);

static TEMPLATES: Lazy<RwLock<HashMap<TemplateKey, Arc<StatementTemplate>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Unfiltered templates for full batches are fixed per (type, kind, capacity)
/// and reused. A shorter trailing batch gets a fresh template, so the cache
/// holds at most one entry per capacity.
pub fn cached_template(
    type_id: TypeId,
    descriptor: &RecordDescriptor,
    kind: OperationKind,
    batch_size: usize,
    capacity: usize,
) -> Result<Arc<StatementTemplate>, UnsupportedShapeError> {
    if batch_size != capacity {
        return Ok(Arc::new(build_template(descriptor, kind, batch_size, None)?));
    }

    let key = (type_id, kind, capacity);

    if let Some(template) =
        TEMPLATES.read().unwrap_or_else(|poisoned| poisoned.into_inner()).get(&key)
    {
        return Ok(Arc::clone(template));
    }

    let template = Arc::new(build_template(descriptor, kind, batch_size, None)?);

    let mut templates = TEMPLATES.write().unwrap_or_else(|poisoned| poisoned.into_inner());
    Ok(Arc::clone(templates.entry(key).or_insert(template)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::sql_value::SqlType;
    use crate::metadata::resolve;
    use crate::test_support::{Keyless, Member, Order, Tag};

    #[test]
    fn test_insert_template() {
        let descriptor = resolve::<Order>().unwrap();
        let template = build_template(&descriptor, OperationKind::Insert, 2, None).unwrap();

        assert_eq!(
            template.sql,
            "MERGE INTO \"public\".\"orders\" AS t\n\
             USING (VALUES\n    (0, $1::TEXT, $2::INTEGER),\n    (1, $3::TEXT, $4::INTEGER)\n) AS s (\"__ordinal\", \"customer\", \"quantity\")\n\
             ON FALSE\n\
             WHEN NOT MATCHED THEN\n    INSERT (\"customer\", \"quantity\") VALUES (s.\"customer\", s.\"quantity\")\n\
             RETURNING s.\"__ordinal\", merge_action(), t.\"id\", t.\"total\""
        );
        assert_eq!(template.bound_columns, vec![1, 2]);
        assert_eq!(template.output_columns, vec![0, 3]);
        assert!(template.returns_rows);
        assert_eq!(template.record_parameters(), 4);
    }

    #[test]
    fn test_update_template_composite_key() {
        let descriptor = resolve::<Member>().unwrap();
        let template = build_template(&descriptor, OperationKind::Update, 1, None).unwrap();

        assert_eq!(
            template.sql,
            "MERGE INTO \"public\".\"members\" AS t\n\
             USING (VALUES\n    (0, $1::BIGINT, $2::TEXT, $3::TEXT)\n) AS s (\"__ordinal\", \"team_id\", \"code\", \"name\")\n\
             ON t.\"team_id\" = s.\"team_id\" AND t.\"code\" = s.\"code\"\n\
             WHEN MATCHED THEN\n    UPDATE SET \"name\" = s.\"name\""
        );
        assert!(!template.returns_rows);
        assert!(template.output_columns.is_empty());
    }

    #[test]
    fn test_update_echoes_computed_columns() {
        let descriptor = resolve::<Order>().unwrap();
        let template = build_template(&descriptor, OperationKind::Update, 1, None).unwrap();

        assert_eq!(template.bound_columns, vec![0, 1, 2]);
        assert!(template.sql.contains("UPDATE SET \"customer\" = s.\"customer\", \"quantity\" = s.\"quantity\""));
        assert!(template.sql.ends_with("RETURNING s.\"__ordinal\", merge_action(), t.\"total\""));
        assert_eq!(template.output_columns, vec![3]);
    }

    #[test]
    fn test_upsert_template_has_both_branches() {
        let descriptor = resolve::<Order>().unwrap();
        let template = build_template(&descriptor, OperationKind::Upsert, 1, None).unwrap();

        assert_eq!(template.bound_columns, vec![0, 1, 2]);
        assert!(template.sql.contains("ON t.\"id\" = s.\"id\""));
        assert!(template.sql.contains("WHEN MATCHED THEN\n    UPDATE SET"));
        assert!(template.sql.contains(
            "WHEN NOT MATCHED THEN\n    INSERT (\"customer\", \"quantity\") VALUES (s.\"customer\", s.\"quantity\")"
        ));
        assert!(template.sql.ends_with("RETURNING s.\"__ordinal\", merge_action(), t.\"id\", t.\"total\""));
    }

    #[test]
    fn test_upsert_without_outputs_still_reports_branches() {
        let descriptor = resolve::<Member>().unwrap();
        let template = build_template(&descriptor, OperationKind::Upsert, 1, None).unwrap();

        assert!(template.returns_rows);
        assert!(template.output_columns.is_empty());
        assert!(template.sql.ends_with("RETURNING s.\"__ordinal\", merge_action()"));
    }

    #[test]
    fn test_upsert_with_only_keys_self_assigns() {
        let descriptor = resolve::<Tag>().unwrap();
        let template = build_template(&descriptor, OperationKind::Upsert, 1, None).unwrap();

        assert!(template.sql.contains("UPDATE SET \"label\" = t.\"label\""));
    }

    #[test]
    fn test_delete_template_with_filter() {
        let descriptor = resolve::<Member>().unwrap();
        let template = build_template(
            &descriptor,
            OperationKind::Delete,
            2,
            Some("t.\"name\" = $5::TEXT"),
        )
        .unwrap();

        assert_eq!(template.bound_columns, vec![0, 1]);
        assert!(template.sql.contains("WHEN MATCHED AND (t.\"name\" = $5::TEXT) THEN\n    DELETE"));
        assert!(!template.returns_rows);
        assert!(!template.sql.contains("RETURNING"));
    }

    #[test]
    fn test_filter_rejected_for_insert_and_upsert() {
        let descriptor = resolve::<Member>().unwrap();

        for kind in [OperationKind::Insert, OperationKind::Upsert] {
            let err = build_template(&descriptor, kind, 1, Some("TRUE")).unwrap_err();
            assert!(matches!(err, UnsupportedShapeError::FilterNotSupported { .. }));
        }
    }

    #[test]
    fn test_update_without_updatable_columns() {
        let descriptor = resolve::<Tag>().unwrap();
        let err = build_template(&descriptor, OperationKind::Update, 1, None).unwrap_err();
        assert!(matches!(err, UnsupportedShapeError::NothingToUpdate { .. }));
    }

    #[test]
    fn test_keyless_insert_only() {
        let descriptor = resolve::<Keyless>().unwrap();
        assert!(build_template(&descriptor, OperationKind::Insert, 1, None).is_ok());

        for kind in [OperationKind::Update, OperationKind::Upsert, OperationKind::Delete] {
            let err = build_template(&descriptor, kind, 1, None).unwrap_err();
            assert!(matches!(err, UnsupportedShapeError::MissingKey { .. }));
        }
    }

    #[test]
    fn test_cached_template_is_shared() {
        let descriptor = resolve::<Order>().unwrap();
        let first =
            cached_template(TypeId::of::<Order>(), &descriptor, OperationKind::Insert, 3, 3).unwrap();
        let second =
            cached_template(TypeId::of::<Order>(), &descriptor, OperationKind::Insert, 3, 3).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let other =
            cached_template(TypeId::of::<Order>(), &descriptor, OperationKind::Insert, 4, 4).unwrap();
        assert!(!Arc::ptr_eq(&first, &other));
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Note {
        body: String,
    }

    crate::impl_entity!(Note, "public.notes", {
        body: SqlType::Text => column,
    });

    #[test]
    fn test_trailing_batches_are_not_cached() {
        let descriptor = resolve::<Note>().unwrap();
        let type_id = TypeId::of::<Note>();

        for size in 1..=50 {
            let template =
                cached_template(type_id, &descriptor, OperationKind::Insert, size, 50).unwrap();
            assert_eq!(template.batch_size, size);
        }

        let first = cached_template(type_id, &descriptor, OperationKind::Insert, 7, 50).unwrap();
        let second = cached_template(type_id, &descriptor, OperationKind::Insert, 7, 50).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));

        let cached: Vec<usize> = TEMPLATES
            .read()
            .unwrap()
            .keys()
            .filter(|(id, _, _)| *id == type_id)
            .map(|(_, _, capacity)| *capacity)
            .collect();
        assert_eq!(cached, vec![50]);
    }
}
