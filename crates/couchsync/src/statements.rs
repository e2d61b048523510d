//! 🏗️ Statement Builder — rows in, SQL out.
//!
//! 🎬 COLD OPEN — INT. A KITCHEN WHERE EVERY RECIPE IS "LIST THE COLUMNS, COUNT THE QUESTION MARKS"
//!
//! Give this module a row and it hands back an `INSERT`, `UPDATE` or `DELETE` with `?`
//! placeholders and the values to bind, in order. It reads the table name and column list
//! from [`TableRow`] metadata and never looks at anything else. Values never touch the SQL
//! text, so an apostrophe or a backslash in a customer's name is just data, whatever mode
//! the server happens to be in.
//!
//! 🧠 Knowledge graph:
//! - Depends on: `rows` (metadata + values), `decider::OperationKind` (what to plan)
//! - Used by: `supervisors::apply_engine` (executes the planned statements in one transaction)
//!
//! 🦆

use std::fmt;

use crate::backends::SqlArg;
use crate::decider::OperationKind;
use crate::rows::{
    ChildRow, ComboItemRow, DiscountRow, LineItemRow, NormalizedOrder, OC_TIME_FORMAT, OcTime,
    OrderRow, SqlValue, TableRow,
};

/// 🔑 The column every table shares with its parent.
pub const ORDER_KEY: &str = "orderId";

/// 📜 One statement: text with `?` placeholders, plus what goes in them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub sql: String,
    pub args: Vec<SqlArg>,
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -- {} arg(s)", self.sql, self.args.len())
    }
}

/// 🎯 Turn a column value into a bind. Unset timestamps bind as `NULL`.
pub fn bind_value(value: SqlValue) -> SqlArg {
    match value {
        SqlValue::Int(n) => SqlArg::Int(n),
        SqlValue::Text(s) => SqlArg::Text(s),
        SqlValue::Time(t) => match t.instant() {
            Some(instant) => SqlArg::Text(instant.format(OC_TIME_FORMAT).to_string()),
            None => SqlArg::Null,
        },
    }
}

/// 💀 The builder refused. These are programming errors, not data errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StatementError {
    #[error("key field '{field}' is not a column of table '{table}'")]
    UnknownKeyField { table: &'static str, field: String },

    #[error("refusing to build a keyless statement against table '{table}': it would touch every row")]
    NoKeyFields { table: &'static str },
}

/// 📥 `INSERT INTO <table> (<every column>) VALUES (?, ...)`.
pub fn build_insert<T: TableRow>(row: &T) -> Statement {
    let the_values = row.values();
    let the_marks = vec!["?"; the_values.len()].join(",");
    Statement {
        sql: format!(
            "INSERT INTO {} ({}) VALUES ({})",
            T::TABLE,
            T::COLUMNS.join(","),
            the_marks
        ),
        args: the_values.into_iter().map(bind_value).collect(),
    }
}

/// ✏️ `UPDATE <table> SET c1=?,... WHERE k1=? AND ...`, keys drawn from `key_row`.
pub fn build_update<T: TableRow>(
    row: &T,
    key_row: &T,
    key_fields: &[&str],
) -> Result<Statement, StatementError> {
    let (the_predicate, the_key_args) = key_predicate(key_row, key_fields)?;
    let (the_assignments, mut the_args) = assignments(row);
    the_args.extend(the_key_args);
    Ok(Statement {
        sql: format!("UPDATE {} SET {} WHERE {}", T::TABLE, the_assignments, the_predicate),
        args: the_args,
    })
}

/// 🗑️ `DELETE FROM <table> WHERE k1=? AND ...`, keys drawn from `key_row`.
pub fn build_delete<T: TableRow>(
    key_row: &T,
    key_fields: &[&str],
) -> Result<Statement, StatementError> {
    let (the_predicate, the_args) = key_predicate(key_row, key_fields)?;
    Ok(Statement {
        sql: format!("DELETE FROM {} WHERE {}", T::TABLE, the_predicate),
        args: the_args,
    })
}

/// ✏️🪪 Overwrite one existing child row, found by its surrogate id.
pub fn build_child_update<T: ChildRow>(row: &T, id: i64) -> Statement {
    let (the_assignments, mut the_args) = assignments(row);
    the_args.push(SqlArg::Int(id));
    Statement {
        sql: format!(
            "UPDATE {} SET {} WHERE {} = ?",
            T::TABLE,
            the_assignments,
            T::SURROGATE_KEY
        ),
        args: the_args,
    }
}

/// 🗑️🪪 Remove one existing child row, found by its surrogate id.
pub fn build_child_delete<T: ChildRow>(id: i64) -> Statement {
    Statement {
        sql: format!("DELETE FROM {} WHERE {} = ?", T::TABLE, T::SURROGATE_KEY),
        args: vec![SqlArg::Int(id)],
    }
}

fn assignments<T: TableRow>(row: &T) -> (String, Vec<SqlArg>) {
    let the_columns = row.columns();
    let the_sets: Vec<String> = the_columns.iter().map(|(column, _)| format!("{column}=?")).collect();
    let the_args = the_columns.into_iter().map(|(_, value)| bind_value(value)).collect();
    (the_sets.join(","), the_args)
}

fn key_predicate<T: TableRow>(
    key_row: &T,
    key_fields: &[&str],
) -> Result<(String, Vec<SqlArg>), StatementError> {
    if key_fields.is_empty() {
        return Err(StatementError::NoKeyFields { table: T::TABLE });
    }
    let the_columns = key_row.columns();
    let mut the_clauses = Vec::with_capacity(key_fields.len());
    let mut the_args = Vec::with_capacity(key_fields.len());
    for &field in key_fields {
        let (column, value) = the_columns
            .iter()
            .find(|(column, _)| *column == field)
            .ok_or_else(|| StatementError::UnknownKeyField {
                table: T::TABLE,
                field: field.to_string(),
            })?;
        // -- `x = NULL` is never true. an unset timestamp key means "is null".
        match value {
            SqlValue::Time(t) if !t.is_set() => the_clauses.push(format!("{column} IS NULL")),
            _ => {
                the_clauses.push(format!("{column}=?"));
                the_args.push(bind_value(value.clone()));
            }
        }
    }
    Ok((the_clauses.join(" AND "), the_args))
}

/// 🪪 A child row already in the sink: its surrogate id and the `createTime` it was born with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildSlot {
    pub id: i64,
    pub create_time: OcTime,
}

/// 👪 The children an order already has, per table, oldest id first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExistingChildren {
    pub line_items: Vec<ChildSlot>,
    pub combo_items: Vec<ChildSlot>,
    pub discounts: Vec<ChildSlot>,
}

/// 📋 Every statement one change needs, in execution order.
///
/// - Insert: parent, then discounts, line items, combo items.
/// - Update: parent `UPDATE` keyed on `orderId`. Then, per child table, the document's
///   children are lined up with `existing` by position: the first N overwrite the existing
///   rows in place (same id, original `createTime`), any extra are inserted, and any
///   leftover existing rows are deleted. Re-applying an unchanged document rewrites every
///   row with the values it already has.
/// - Delete: every table, keyed on `orderId`.
pub fn plan_statements(
    kind: OperationKind,
    normalized: &NormalizedOrder,
    existing: &ExistingChildren,
) -> Result<Vec<Statement>, StatementError> {
    let the_order_id = normalized.order_id().to_string();
    let mut the_plan = Vec::with_capacity(normalized.row_count() + 4);
    let the_key = OrderRow {
        order_id: the_order_id.clone(),
        ..Default::default()
    };

    match kind {
        OperationKind::Insert => {
            the_plan.push(build_insert(&normalized.order));
            the_plan.extend(normalized.discounts.iter().map(build_insert));
            the_plan.extend(normalized.line_items.iter().map(build_insert));
            the_plan.extend(normalized.combo_items.iter().map(build_insert));
        }
        OperationKind::Update => {
            the_plan.push(build_update(&normalized.order, &the_key, &[ORDER_KEY])?);
            reconcile(&mut the_plan, &normalized.discounts, &existing.discounts);
            reconcile(&mut the_plan, &normalized.line_items, &existing.line_items);
            reconcile(&mut the_plan, &normalized.combo_items, &existing.combo_items);
        }
        OperationKind::Delete => {
            the_plan.push(build_delete(&the_key, &[ORDER_KEY])?);
            push_child_deletes(&mut the_plan, &the_order_id)?;
        }
    }

    Ok(the_plan)
}

fn reconcile<T: ChildRow>(plan: &mut Vec<Statement>, rows: &[T], slots: &[ChildSlot]) {
    for (index, row) in rows.iter().enumerate() {
        match slots.get(index) {
            Some(slot) => plan.push(build_child_update(&row.with_create_time(slot.create_time), slot.id)),
            None => plan.push(build_insert(row)),
        }
    }
    plan.extend(slots.iter().skip(rows.len()).map(|slot| build_child_delete::<T>(slot.id)));
}

fn push_child_deletes(plan: &mut Vec<Statement>, order_id: &str) -> Result<(), StatementError> {
    let the_line_key = LineItemRow {
        order_id: order_id.to_string(),
        ..Default::default()
    };
    let the_discount_key = DiscountRow {
        order_id: order_id.to_string(),
        ..Default::default()
    };
    let the_combo_key = ComboItemRow {
        order_id: order_id.to_string(),
        ..Default::default()
    };
    plan.push(build_delete(&the_line_key, &[ORDER_KEY])?);
    plan.push(build_delete(&the_discount_key, &[ORDER_KEY])?);
    plan.push(build_delete(&the_combo_key, &[ORDER_KEY])?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn the_tiny_order() -> NormalizedOrder {
        NormalizedOrder {
            order: OrderRow {
                order_id: "ord1".into(),
                total_amount: 500,
                ..Default::default()
            },
            line_items: vec![LineItemRow {
                order_id: "ord1".into(),
                product_id: "p1".into(),
                ..Default::default()
            }],
            combo_items: vec![],
            discounts: vec![DiscountRow {
                order_id: "ord1".into(),
                discount_id: 3,
                ..Default::default()
            }],
        }
    }

    fn the_birthday() -> OcTime {
        OcTime::parse("2019-03-07 12:00:00").expect("💀 fixture time")
    }

    #[test]
    fn the_one_where_values_bind_by_shape() {
        assert_eq!(bind_value(SqlValue::Int(-42)), SqlArg::Int(-42));
        assert_eq!(bind_value(SqlValue::Text("O'Brien".into())), SqlArg::Text("O'Brien".into()));
        assert_eq!(
            bind_value(SqlValue::Time(the_birthday())),
            SqlArg::Text("2019-03-07 12:00:00".into())
        );
        assert_eq!(bind_value(SqlValue::Time(OcTime::UNSET)), SqlArg::Null);
    }

    #[test]
    fn the_one_where_insert_lists_every_column_in_order() {
        let the_row = DiscountRow {
            order_id: "ord1".into(),
            discount_id: 3,
            discount_name: r"half off \o/ it's".into(),
            ..Default::default()
        };
        let the_statement = build_insert(&the_row);
        assert_eq!(
            the_statement.sql,
            "INSERT INTO order_discount (orderId,discountId,discountPrice,discountNum,discountName,\
             discountType,discountAmount,createTime,updateTime,salesArea,maketingCosts,productId,\
             discountExt,maketingCostsId) VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?)"
        );
        assert_eq!(the_statement.args.len(), DiscountRow::COLUMNS.len());
        assert_eq!(the_statement.args[0], SqlArg::Text("ord1".into()));
        assert_eq!(the_statement.args[1], SqlArg::Int(3));
        assert_eq!(
            the_statement.args[4],
            SqlArg::Text(r"half off \o/ it's".into()),
            "💀 quotes and backslashes travel as data, untouched"
        );
        assert_eq!(the_statement.args[7], SqlArg::Null);
    }

    #[test]
    fn the_one_where_update_sets_everything_and_filters_by_key() {
        let the_row = the_tiny_order().order;
        let the_key = OrderRow {
            order_id: "ord1".into(),
            ..Default::default()
        };
        let the_statement = build_update(&the_row, &the_key, &["orderId"]).expect("💀 orderId is a real column");
        assert!(the_statement.sql.starts_with("UPDATE order_master SET orderId=?,userId=?,"));
        assert!(the_statement.sql.ends_with(" WHERE orderId=?"), "💀 got {}", the_statement.sql);
        assert_eq!(the_statement.args.len(), OrderRow::COLUMNS.len() + 1);
        assert_eq!(the_statement.args[4], SqlArg::Int(500), "💀 totalAmount is the fifth column");
        assert_eq!(the_statement.args.last(), Some(&SqlArg::Text("ord1".into())));
    }

    #[test]
    fn the_one_where_multiple_keys_are_anded_together() {
        let the_key = LineItemRow {
            order_id: "ord1".into(),
            product_id: "p9".into(),
            ..Default::default()
        };
        let the_statement =
            build_delete(&the_key, &["orderId", "productId", "addTime"]).expect("💀 all three are columns");
        assert_eq!(
            the_statement.sql,
            "DELETE FROM order_detail WHERE orderId=? AND productId=? AND addTime IS NULL"
        );
        assert_eq!(
            the_statement.args,
            vec![SqlArg::Text("ord1".into()), SqlArg::Text("p9".into())]
        );
    }

    #[test]
    fn the_one_where_made_up_keys_are_a_construction_error() {
        let the_key = OrderRow::default();
        assert_eq!(
            build_delete(&the_key, &["order_id"]),
            Err(StatementError::UnknownKeyField {
                table: "order_master",
                field: "order_id".into()
            })
        );
        assert_eq!(
            build_update(&the_key, &the_key, &[]),
            Err(StatementError::NoKeyFields {
                table: "order_master"
            })
        );
    }

    #[test]
    fn the_one_where_insert_plans_parent_first_then_discounts_details_meals() {
        let the_plan = plan_statements(OperationKind::Insert, &the_tiny_order(), &ExistingChildren::default())
            .expect("💀 insert plans never fail");
        assert_eq!(the_plan.len(), 3);
        assert!(the_plan[0].sql.starts_with("INSERT INTO order_master "));
        assert!(the_plan[1].sql.starts_with("INSERT INTO order_discount "));
        assert!(the_plan[2].sql.starts_with("INSERT INTO order_detail "));
    }

    #[test]
    fn the_one_where_update_overwrites_children_in_place_and_keeps_their_birthday() {
        let the_existing = ExistingChildren {
            discounts: vec![ChildSlot {
                id: 11,
                create_time: the_birthday(),
            }],
            line_items: vec![],
            combo_items: vec![
                ChildSlot {
                    id: 21,
                    create_time: the_birthday(),
                },
                ChildSlot {
                    id: 22,
                    create_time: the_birthday(),
                },
            ],
        };
        let the_order = the_tiny_order();
        let the_plan =
            plan_statements(OperationKind::Update, &the_order, &the_existing).expect("💀 update plan");

        assert_eq!(the_plan.len(), 5);
        assert!(the_plan[0].sql.starts_with("UPDATE order_master SET "));

        // -- 🏷️ the one discount lands on row 11, with row 11's original createTime
        let the_restamped = the_order.discounts[0].with_create_time(the_birthday());
        assert_eq!(the_plan[1], build_child_update(&the_restamped, 11));
        assert!(the_plan[1].sql.ends_with(" WHERE id = ?"));
        assert_eq!(the_plan[1].args.last(), Some(&SqlArg::Int(11)));
        assert!(the_plan[1].args.contains(&SqlArg::Text("2019-03-07 12:00:00".into())));

        // -- 🍔 no detail rows yet, so the line item is a fresh insert
        assert!(the_plan[2].sql.starts_with("INSERT INTO order_detail "));

        // -- 🍟 the document has no combo items any more, so both old rows go
        assert_eq!(the_plan[3], build_child_delete::<ComboItemRow>(21));
        assert_eq!(the_plan[4], build_child_delete::<ComboItemRow>(22));
        assert_eq!(the_plan[4].sql, "DELETE FROM order_meal_detail WHERE id = ?");
    }

    #[test]
    fn the_one_where_delete_clears_all_four_tables() {
        let the_plan = plan_statements(OperationKind::Delete, &the_tiny_order(), &ExistingChildren::default())
            .expect("💀 delete plan");
        let the_sql: Vec<&str> = the_plan.iter().map(|s| s.sql.as_str()).collect();
        assert_eq!(
            the_sql,
            vec![
                "DELETE FROM order_master WHERE orderId=?",
                "DELETE FROM order_detail WHERE orderId=?",
                "DELETE FROM order_discount WHERE orderId=?",
                "DELETE FROM order_meal_detail WHERE orderId=?",
            ]
        );
        assert!(the_plan.iter().all(|s| s.args == vec![SqlArg::Text("ord1".into())]));
    }
}
