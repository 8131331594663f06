//! Type mapping between MySQL and PostgreSQL.

use tracing::warn;

/// Coarse classification a source column type is bucketed into before being
/// mapped to a target type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Boolean,
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Float,
    String,
    DateTime,
    Date,
    Time,
    Year,
    Binary,
    Json,
    Enum,
    Unknown,
}

/// Classify a raw MySQL type string into a [`TypeCategory`].
///
/// Substring matches run in a fixed priority order: `tinyint(1)` is boolean
/// before the generic tinyint rule fires, and `bigint` is checked before the
/// broader `int` match so it is not swallowed by it.
pub fn classify(mysql_type: &str) -> TypeCategory {
    let t = mysql_type.to_lowercase();

    if t.contains("tinyint(1)") {
        TypeCategory::Boolean
    } else if t.contains("bigint") {
        TypeCategory::BigInt
    } else if t.contains("tinyint") {
        TypeCategory::TinyInt
    } else if t.contains("smallint") || t.contains("mediumint") {
        TypeCategory::SmallInt
    } else if t.contains("int") {
        TypeCategory::Int
    } else if t.contains("float")
        || t.contains("double")
        || t.contains("decimal")
        || t.contains("numeric")
    {
        TypeCategory::Float
    } else if t.contains("datetime") || t.contains("timestamp") {
        TypeCategory::DateTime
    } else if t.contains("date") {
        TypeCategory::Date
    } else if t.contains("time") {
        TypeCategory::Time
    } else if t.contains("year") {
        TypeCategory::Year
    } else if t.contains("blob") || t.contains("binary") || t.contains("varbinary") {
        TypeCategory::Binary
    } else if t.contains("json") {
        TypeCategory::Json
    } else if t.contains("enum") || t.contains("set") {
        TypeCategory::Enum
    } else if t.contains("varchar") || t.contains("text") || t.contains("char") {
        TypeCategory::String
    } else {
        TypeCategory::Unknown
    }
}

/// Map a classified MySQL type to a PostgreSQL type string.
///
/// Unknown types fall back to TEXT with a logged warning; this never fails.
pub fn map_to_postgres(category: TypeCategory, mysql_type: &str) -> String {
    let lower = mysql_type.to_lowercase();

    match category {
        TypeCategory::Boolean => "BOOLEAN".to_string(),
        TypeCategory::TinyInt | TypeCategory::SmallInt => "SMALLINT".to_string(),
        TypeCategory::BigInt => "BIGINT".to_string(),
        TypeCategory::Int | TypeCategory::Year => "INTEGER".to_string(),
        TypeCategory::DateTime => "TIMESTAMP".to_string(),
        TypeCategory::Date => "DATE".to_string(),
        TypeCategory::Time => "TIME".to_string(),
        TypeCategory::Binary => "BYTEA".to_string(),
        TypeCategory::Json => "JSONB".to_string(),
        // No enum-from-list support assumed on the target side
        TypeCategory::Enum => "VARCHAR(255)".to_string(),
        TypeCategory::Float => {
            if lower.contains("decimal") || lower.contains("numeric") {
                match parse_precision_scale(mysql_type) {
                    Some((p, s)) => format!("NUMERIC({},{})", p, s),
                    None => "NUMERIC".to_string(),
                }
            } else if lower.contains("double") {
                "DOUBLE PRECISION".to_string()
            } else {
                "REAL".to_string()
            }
        }
        TypeCategory::String => {
            if lower.contains("char") && !lower.contains("varchar") {
                format!("CHAR({})", parse_length(mysql_type).unwrap_or(255))
            } else if lower.contains("varchar") {
                format!("VARCHAR({})", parse_length(mysql_type).unwrap_or(255))
            } else {
                "TEXT".to_string()
            }
        }
        TypeCategory::Unknown => {
            warn!("Unknown MySQL type: {}, using TEXT", mysql_type);
            "TEXT".to_string()
        }
    }
}

/// Map a raw MySQL type string straight to PostgreSQL.
pub fn mysql_to_postgres(mysql_type: &str) -> String {
    map_to_postgres(classify(mysql_type), mysql_type)
}

/// Parse `(p,s)` from a parenthesized type suffix like `decimal(10,2)`.
fn parse_precision_scale(mysql_type: &str) -> Option<(u32, u32)> {
    let start = mysql_type.find('(')?;
    let end = mysql_type[start..].find(')')? + start;
    let inner = &mysql_type[start + 1..end];
    let (p, s) = inner.split_once(',')?;
    Some((p.trim().parse().ok()?, s.trim().parse().ok()?))
}

/// Parse `(n)` from a parenthesized type suffix like `varchar(100)`.
fn parse_length(mysql_type: &str) -> Option<u32> {
    let start = mysql_type.find('(')?;
    let end = mysql_type[start..].find(')')? + start;
    mysql_type[start + 1..end].trim().parse().ok()
}
