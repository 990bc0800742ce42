use std::str::FromStr;

use rust_decimal::Decimal;
use sqlparser::ast::{
    self, AssignmentTarget, BinaryOperator, Expr, FromTable, ObjectNamePart, SetExpr, Statement,
    TableFactor, TableObject, Value, ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::model::*;

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertAgency {
        id: Ulid,
        name: String,
    },
    InsertUser {
        id: Ulid,
        name: String,
    },
    InsertCar {
        id: Ulid,
        agency_id: Ulid,
        daily_rate: Decimal,
        current_mileage: u64,
        plate: Option<String>,
    },
    UpdateCar {
        id: Ulid,
        patch: CarPatch,
    },
    DeleteCar {
        id: Ulid,
    },
    InsertRental(NewRental),
    UpdateRental {
        id: Ulid,
        patch: RentalPatch,
    },
    DeleteRental {
        id: Ulid,
    },
    SelectRental {
        id: Ulid,
    },
    SelectRentals {
        filter: RentalFilter,
    },
    SelectCars {
        id: Option<Ulid>,
    },
    SelectAgencies,
    SelectConflicts {
        car_id: Ulid,
        start: Ms,
        end: Ms,
    },
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    let Some(stmt) = stmts.first() else {
        return Err(SqlError::Empty);
    };

    match stmt {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Update {
            table,
            assignments,
            selection,
            ..
        } => parse_update(&table_factor_name(&table.relation)?, assignments, selection),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let values = extract_insert_values(insert)?;
    let arity = |min: usize| {
        if values.len() < min {
            Err(SqlError::WrongArity(table_label(&table), min, values.len()))
        } else {
            Ok(())
        }
    };

    match table.as_str() {
        "agencies" => {
            arity(2)?;
            Ok(Command::InsertAgency {
                id: parse_ulid(&values[0])?,
                name: parse_string(&values[1])?,
            })
        }
        "users" => {
            arity(2)?;
            Ok(Command::InsertUser {
                id: parse_ulid(&values[0])?,
                name: parse_string(&values[1])?,
            })
        }
        "cars" => {
            arity(4)?;
            Ok(Command::InsertCar {
                id: parse_ulid(&values[0])?,
                agency_id: parse_ulid(&values[1])?,
                daily_rate: parse_decimal(&values[2])?,
                current_mileage: parse_u64(&values[3])?,
                plate: optional(&values, 4, parse_string)?,
            })
        }
        "rentals" => {
            arity(6)?;
            Ok(Command::InsertRental(NewRental {
                id: parse_ulid(&values[0])?,
                user_id: parse_ulid(&values[1])?,
                car_id: parse_ulid(&values[2])?,
                start_date: parse_i64(&values[3])?,
                end_date: parse_i64(&values[4])?,
                pickup_agency_id: parse_ulid(&values[5])?,
                return_agency_id: optional(&values, 6, parse_ulid)?,
                start_mileage: optional(&values, 7, parse_u64)?,
            }))
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_update(
    table: &str,
    assignments: &[ast::Assignment],
    selection: &Option<Expr>,
) -> Result<Command, SqlError> {
    let id = extract_where_id(selection)?;
    let mut columns = Vec::with_capacity(assignments.len());
    for a in assignments {
        let col = match &a.target {
            AssignmentTarget::ColumnName(name) => object_name_last(name),
            AssignmentTarget::Tuple(_) => None,
        }
        .ok_or_else(|| SqlError::Unsupported("tuple assignment".into()))?;
        columns.push((col, &a.value));
    }

    match table {
        "cars" => {
            let mut patch = CarPatch::default();
            for (col, value) in columns {
                match col.as_str() {
                    "status" => patch.status = Some(parse_enum(value)?),
                    "daily_rate" => patch.daily_rate = Some(parse_decimal(value)?),
                    "current_mileage" => patch.current_mileage = Some(parse_u64(value)?),
                    "agency_id" => patch.agency_id = Some(parse_ulid(value)?),
                    _ => return Err(SqlError::UnknownColumn(col)),
                }
            }
            Ok(Command::UpdateCar { id, patch })
        }
        "rentals" => {
            let mut patch = RentalPatch::default();
            for (col, value) in columns {
                match col.as_str() {
                    "status" => patch.status = Some(parse_enum(value)?),
                    "start_date" => patch.start_date = Some(parse_i64(value)?),
                    "end_date" => patch.end_date = Some(parse_i64(value)?),
                    "return_agency_id" => patch.return_agency_id = Some(parse_ulid(value)?),
                    "start_mileage" => patch.start_mileage = Some(parse_u64(value)?),
                    "end_mileage" => patch.end_mileage = Some(parse_u64(value)?),
                    "real_return_date" => patch.real_return_date = Some(parse_i64(value)?),
                    _ => return Err(SqlError::UnknownColumn(col)),
                }
            }
            Ok(Command::UpdateRental { id, patch })
        }
        _ => Err(SqlError::UnknownTable(table.to_string())),
    }
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    let id = extract_where_id(&delete.selection)?;

    match table.as_str() {
        "cars" => Ok(Command::DeleteCar { id }),
        "rentals" => Ok(Command::DeleteRental { id }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };
    let Some(from) = select.from.first() else {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    };
    let table = table_factor_name(&from.relation)?;

    let mut preds = Vec::new();
    if let Some(selection) = &select.selection {
        collect_predicates(selection, &mut preds)?;
    }

    match table.as_str() {
        "rentals" => {
            let mut filter = RentalFilter::default();
            for (col, op, value) in preds {
                require_eq(&col, &op)?;
                match col.as_str() {
                    "id" => return Ok(Command::SelectRental { id: parse_ulid(value)? }),
                    "car_id" => filter.car_id = Some(parse_ulid(value)?),
                    "user_id" => filter.user_id = Some(parse_ulid(value)?),
                    "status" => filter.status = Some(parse_enum(value)?),
                    _ => return Err(SqlError::UnknownColumn(col)),
                }
            }
            Ok(Command::SelectRentals { filter })
        }
        "cars" => {
            let mut id = None;
            for (col, op, value) in preds {
                require_eq(&col, &op)?;
                match col.as_str() {
                    "id" => id = Some(parse_ulid(value)?),
                    _ => return Err(SqlError::UnknownColumn(col)),
                }
            }
            Ok(Command::SelectCars { id })
        }
        "agencies" => Ok(Command::SelectAgencies),
        "conflicts" => {
            let (mut car_id, mut start, mut end) = (None, None, None);
            for (col, op, value) in preds {
                match (col.as_str(), op) {
                    ("car_id", BinaryOperator::Eq) => car_id = Some(parse_ulid(value)?),
                    ("start_date", BinaryOperator::GtEq) => start = Some(parse_i64(value)?),
                    ("end_date", BinaryOperator::LtEq) => end = Some(parse_i64(value)?),
                    _ => return Err(SqlError::UnknownColumn(col)),
                }
            }
            Ok(Command::SelectConflicts {
                car_id: car_id.ok_or(SqlError::MissingFilter("car_id"))?,
                start: start.ok_or(SqlError::MissingFilter("start_date"))?,
                end: end.ok_or(SqlError::MissingFilter("end_date"))?,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// Flatten `a AND b AND ...` into `(column, op, value)` triples.
fn collect_predicates<'a>(
    expr: &'a Expr,
    out: &mut Vec<(String, BinaryOperator, &'a Expr)>,
) -> Result<(), SqlError> {
    match expr {
        Expr::BinaryOp {
            left,
            op: BinaryOperator::And,
            right,
        } => {
            collect_predicates(left, out)?;
            collect_predicates(right, out)
        }
        Expr::BinaryOp { left, op, right } => {
            let col = expr_column_name(left)
                .ok_or_else(|| SqlError::Unsupported(format!("predicate {expr}")))?;
            out.push((col, op.clone(), right.as_ref()));
            Ok(())
        }
        Expr::Nested(inner) => collect_predicates(inner, out),
        _ => Err(SqlError::Unsupported(format!("predicate {expr}"))),
    }
}

fn require_eq(col: &str, op: &BinaryOperator) -> Result<(), SqlError> {
    if *op == BinaryOperator::Eq {
        Ok(())
    } else {
        Err(SqlError::Unsupported(format!("operator {op} on {col}")))
    }
}

// ── Helpers ───────────────────────────────────────────────────

fn table_label(table: &str) -> &'static str {
    match table {
        "agencies" => "agencies",
        "users" => "users",
        "cars" => "cars",
        "rentals" => "rentals",
        _ => "table",
    }
}

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    match tables_with_joins.first() {
        Some(first) => table_factor_name(&first.relation),
        None => Err(SqlError::Parse("DELETE without table".into())),
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

/// The single VALUES row of an INSERT.
fn extract_insert_values(insert: &ast::Insert) -> Result<&[Expr], SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => match values.rows.as_slice() {
            [] => Err(SqlError::Parse("empty VALUES".into())),
            [row] => Ok(row.as_slice()),
            _ => Err(SqlError::Unsupported("multi-row INSERT".into())),
        },
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn extract_where_id(selection: &Option<Expr>) -> Result<Ulid, SqlError> {
    match selection {
        Some(Expr::BinaryOp {
            left,
            op: BinaryOperator::Eq,
            right,
        }) if expr_column_name(left).as_deref() == Some("id") => parse_ulid(right),
        _ => Err(SqlError::MissingFilter("id")),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

fn is_null(expr: &Expr) -> bool {
    matches!(extract_value(expr), Some(Value::Null))
}

/// Positional column `idx`, absent or NULL → None.
fn optional<T>(
    values: &[Expr],
    idx: usize,
    parse: fn(&Expr) -> Result<T, SqlError>,
) -> Result<Option<T>, SqlError> {
    match values.get(idx) {
        None => Ok(None),
        Some(v) if is_null(v) => Ok(None),
        Some(v) => parse(v).map(Some),
    }
}

/// Literal text of a string or number.
fn literal(expr: &Expr) -> Result<&str, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s) | Value::Number(s, _)) => Ok(s.as_str()),
        Some(value) => Err(SqlError::Parse(format!("expected literal, got {value}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

fn parse_ulid(expr: &Expr) -> Result<Ulid, SqlError> {
    let s = literal(expr)?;
    Ulid::from_string(s).map_err(|e| SqlError::Parse(format!("bad ULID {s}: {e}")))
}

fn parse_string(expr: &Expr) -> Result<String, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => Ok(s.clone()),
        _ => Err(SqlError::Parse(format!("expected string, got {expr}"))),
    }
}

fn parse_i64(expr: &Expr) -> Result<i64, SqlError> {
    if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        return Ok(-parse_i64(expr)?);
    }
    let s = literal(expr)?;
    s.parse().map_err(|e| SqlError::Parse(format!("bad integer {s}: {e}")))
}

fn parse_u64(expr: &Expr) -> Result<u64, SqlError> {
    let v = parse_i64(expr)?;
    u64::try_from(v).map_err(|_| SqlError::Parse(format!("{v} must not be negative")))
}

fn parse_decimal(expr: &Expr) -> Result<Decimal, SqlError> {
    let s = literal(expr)?;
    Decimal::from_str(s).map_err(|e| SqlError::Parse(format!("bad amount {s}: {e}")))
}

fn parse_enum<T: FromStr<Err = String>>(expr: &Expr) -> Result<T, SqlError> {
    literal(expr)?.parse().map_err(SqlError::Parse)
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    UnknownColumn(String),
    WrongArity(&'static str, usize, usize),
    MissingFilter(&'static str),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::UnknownColumn(c) => write!(f, "unknown column: {c}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected at least {expected} values, got {got}")
            }
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
        }
    }
}

impl std::error::Error for SqlError {}

#[cfg(test)]
mod tests {
    use super::*;

    const A: &str = "01ARZ3NDEKTSV4RRFFQ69G5FAV";
    const B: &str = "01BX5ZZKBKACTAV9WEVGEMMVRZ";

    fn ulid(s: &str) -> Ulid {
        Ulid::from_string(s).unwrap()
    }

    #[test]
    fn parse_insert_agency_and_user() {
        let cmd = parse_sql(&format!("INSERT INTO agencies (id, name) VALUES ('{A}', 'Airport')")).unwrap();
        assert_eq!(cmd, Command::InsertAgency { id: ulid(A), name: "Airport".into() });
        let cmd = parse_sql(&format!("INSERT INTO users VALUES ('{B}', 'Ada')")).unwrap();
        assert_eq!(cmd, Command::InsertUser { id: ulid(B), name: "Ada".into() });
    }

    #[test]
    fn parse_insert_car() {
        let sql = format!(
            "INSERT INTO cars (id, agency_id, daily_rate, current_mileage, plate) VALUES ('{A}', '{B}', 49.90, 12000, 'AB-123')"
        );
        match parse_sql(&sql).unwrap() {
            Command::InsertCar { id, agency_id, daily_rate, current_mileage, plate } => {
                assert_eq!(id, ulid(A));
                assert_eq!(agency_id, ulid(B));
                assert_eq!(daily_rate, Decimal::new(4990, 2));
                assert_eq!(current_mileage, 12000);
                assert_eq!(plate.as_deref(), Some("AB-123"));
            }
            cmd => panic!("expected InsertCar, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_car_rate_as_string() {
        let sql = format!("INSERT INTO cars VALUES ('{A}', '{B}', '90', 0)");
        match parse_sql(&sql).unwrap() {
            Command::InsertCar { daily_rate, plate, .. } => {
                assert_eq!(daily_rate, Decimal::new(90, 0));
                assert_eq!(plate, None);
            }
            cmd => panic!("expected InsertCar, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_rental_defaults() {
        let sql = format!(
            "INSERT INTO rentals (id, user_id, car_id, start_date, end_date, pickup_agency_id) VALUES ('{A}', '{B}', '{A}', 1000, 2000, '{B}')"
        );
        match parse_sql(&sql).unwrap() {
            Command::InsertRental(req) => {
                assert_eq!(req.start_date, 1000);
                assert_eq!(req.end_date, 2000);
                assert_eq!(req.pickup_agency_id, ulid(B));
                assert_eq!(req.return_agency_id, None);
                assert_eq!(req.start_mileage, None);
            }
            cmd => panic!("expected InsertRental, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_rental_with_return_agency_and_mileage() {
        let sql = format!(
            "INSERT INTO rentals VALUES ('{A}', '{B}', '{A}', 1000, 2000, '{B}', '{A}', 5400)"
        );
        match parse_sql(&sql).unwrap() {
            Command::InsertRental(req) => {
                assert_eq!(req.return_agency_id, Some(ulid(A)));
                assert_eq!(req.start_mileage, Some(5400));
            }
            cmd => panic!("expected InsertRental, got {cmd:?}"),
        }
        let sql = format!(
            "INSERT INTO rentals VALUES ('{A}', '{B}', '{A}', 1000, 2000, '{B}', NULL, 5400)"
        );
        match parse_sql(&sql).unwrap() {
            Command::InsertRental(req) => assert_eq!(req.return_agency_id, None),
            cmd => panic!("expected InsertRental, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_rental_too_few_values() {
        let sql = format!("INSERT INTO rentals VALUES ('{A}', '{B}', '{A}', 1000, 2000)");
        assert!(matches!(parse_sql(&sql), Err(SqlError::WrongArity("rentals", 6, 5))));
    }

    #[test]
    fn parse_update_rental_status() {
        let sql = format!(
            "UPDATE rentals SET status = 'COMPLETED', end_mileage = 12120, real_return_date = 5000 WHERE id = '{A}'"
        );
        let cmd = parse_sql(&sql).unwrap();
        let expected = RentalPatch {
            status: Some(RentalStatus::Completed),
            end_mileage: Some(12120),
            real_return_date: Some(5000),
            ..Default::default()
        };
        assert_eq!(cmd, Command::UpdateRental { id: ulid(A), patch: expected });
    }

    #[test]
    fn parse_update_rental_window() {
        let sql = format!("UPDATE rentals SET start_date = 10, end_date = 20 WHERE id = '{A}'");
        match parse_sql(&sql).unwrap() {
            Command::UpdateRental { patch, .. } => {
                assert_eq!(patch.start_date, Some(10));
                assert_eq!(patch.end_date, Some(20));
                assert_eq!(patch.status, None);
            }
            cmd => panic!("expected UpdateRental, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_update_car() {
        let sql = format!("UPDATE cars SET status = 'maintenance', daily_rate = 55.5 WHERE id = '{A}'");
        match parse_sql(&sql).unwrap() {
            Command::UpdateCar { id, patch } => {
                assert_eq!(id, ulid(A));
                assert_eq!(patch.status, Some(CarStatus::Maintenance));
                assert_eq!(patch.daily_rate, Some(Decimal::new(555, 1)));
            }
            cmd => panic!("expected UpdateCar, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_update_rejects_unknown_column_and_missing_id() {
        let sql = format!("UPDATE rentals SET daily_rate_snapshot = 1 WHERE id = '{A}'");
        assert!(matches!(parse_sql(&sql), Err(SqlError::UnknownColumn(c)) if c == "daily_rate_snapshot"));
        let sql = "UPDATE rentals SET status = 'ACTIVE'";
        assert!(matches!(parse_sql(sql), Err(SqlError::MissingFilter("id"))));
    }

    #[test]
    fn parse_bad_status() {
        let sql = format!("UPDATE rentals SET status = 'RETURNED' WHERE id = '{A}'");
        assert!(matches!(parse_sql(&sql), Err(SqlError::Parse(_))));
    }

    #[test]
    fn parse_deletes() {
        assert_eq!(
            parse_sql(&format!("DELETE FROM rentals WHERE id = '{A}'")).unwrap(),
            Command::DeleteRental { id: ulid(A) }
        );
        assert_eq!(
            parse_sql(&format!("DELETE FROM cars WHERE id = '{B}'")).unwrap(),
            Command::DeleteCar { id: ulid(B) }
        );
    }

    #[test]
    fn parse_select_rentals() {
        assert_eq!(
            parse_sql(&format!("SELECT * FROM rentals WHERE id = '{A}'")).unwrap(),
            Command::SelectRental { id: ulid(A) }
        );
        let sql = format!("SELECT * FROM rentals WHERE car_id = '{A}' AND status = 'active'");
        let expected = RentalFilter {
            car_id: Some(ulid(A)),
            status: Some(RentalStatus::Active),
            ..Default::default()
        };
        assert_eq!(parse_sql(&sql).unwrap(), Command::SelectRentals { filter: expected });
        assert_eq!(
            parse_sql("SELECT * FROM rentals").unwrap(),
            Command::SelectRentals { filter: RentalFilter::default() }
        );
    }

    #[test]
    fn parse_select_cars_and_agencies() {
        assert_eq!(parse_sql("SELECT * FROM cars").unwrap(), Command::SelectCars { id: None });
        assert_eq!(
            parse_sql(&format!("SELECT * FROM cars WHERE id = '{A}'")).unwrap(),
            Command::SelectCars { id: Some(ulid(A)) }
        );
        assert_eq!(parse_sql("SELECT * FROM agencies").unwrap(), Command::SelectAgencies);
    }

    #[test]
    fn parse_select_conflicts() {
        let sql = format!(
            "SELECT * FROM conflicts WHERE car_id = '{A}' AND start_date >= 1000 AND end_date <= 2000"
        );
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::SelectConflicts { car_id: ulid(A), start: 1000, end: 2000 }
        );
        let sql = format!("SELECT * FROM conflicts WHERE car_id = '{A}' AND start_date >= 1000");
        assert!(matches!(parse_sql(&sql), Err(SqlError::MissingFilter("end_date"))));
    }

    #[test]
    fn parse_negative_mileage_errors() {
        let sql = format!("INSERT INTO cars VALUES ('{A}', '{B}', 10, -5)");
        assert!(matches!(parse_sql(&sql), Err(SqlError::Parse(_))));
    }

    #[test]
    fn parse_unknown_table_errors() {
        let sql = format!("INSERT INTO bookings (id) VALUES ('{A}')");
        assert!(matches!(parse_sql(&sql), Err(SqlError::UnknownTable(_))));
    }

    #[test]
    fn parse_multi_row_insert_unsupported() {
        let sql = format!("INSERT INTO agencies VALUES ('{A}', 'x'), ('{B}', 'y')");
        assert!(matches!(parse_sql(&sql), Err(SqlError::Unsupported(_))));
    }

    #[test]
    fn parse_empty_errors() {
        assert!(matches!(parse_sql(""), Err(SqlError::Empty)));
    }
}
