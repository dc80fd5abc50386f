//! Row predicates for the generic collection operations

use std::fmt::Write as _;

/// Integer column shared by the item tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    /// Owning account
    AccountId,
    /// Remote item id
    ItemId,
    /// Author (statuses) or user (cached users)
    UserId,
    /// Original status id of a retweet
    RetweetId,
    /// The owner's own retweet of the row
    MyRetweetId,
    /// Favorited flag (0/1)
    IsFavorite,
    /// Gap flag (0/1)
    IsGap,
}

impl Column {
    /// SQL column name
    pub const fn name(self) -> &'static str {
        match self {
            Self::AccountId => "account_id",
            Self::ItemId => "item_id",
            Self::UserId => "user_id",
            Self::RetweetId => "retweet_id",
            Self::MyRetweetId => "my_retweet_id",
            Self::IsFavorite => "is_favorite",
            Self::IsGap => "is_gap",
        }
    }
}

/// Boolean expression over integer columns.
///
/// Rendered to a parameterised `WHERE` clause; values never end up in the SQL
/// text itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Matches every row
    All,
    /// `column = value`
    Eq(Column, i64),
    /// `column IN (values)`; an empty list matches nothing
    In(Column, Vec<i64>),
    /// `column > value`
    Gt(Column, i64),
    /// `column <= value`
    Le(Column, i64),
    /// All sub-predicates hold; empty is true
    And(Vec<Self>),
    /// Any sub-predicate holds; empty is false
    Or(Vec<Self>),
}

impl Predicate {
    /// Rows of one account
    pub const fn account(account_id: i64) -> Self {
        Self::Eq(Column::AccountId, account_id)
    }

    /// Rows of any of the given accounts
    pub fn accounts(account_ids: &[i64]) -> Self {
        Self::In(Column::AccountId, account_ids.to_vec())
    }

    /// Conjunction with another predicate
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        match self {
            Self::And(mut parts) => {
                parts.push(other);
                Self::And(parts)
            }
            first => Self::And(vec![first, other]),
        }
    }

    /// Disjunction with another predicate
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        match self {
            Self::Or(mut parts) => {
                parts.push(other);
                Self::Or(parts)
            }
            first => Self::Or(vec![first, other]),
        }
    }

    /// SQL expression and its positional parameters
    pub fn to_sql(&self) -> (String, Vec<i64>) {
        let mut sql = String::new();
        let mut params = Vec::new();
        self.render(&mut sql, &mut params);
        (sql, params)
    }

    fn render(&self, sql: &mut String, params: &mut Vec<i64>) {
        match self {
            Self::All => sql.push('1'),
            Self::Eq(column, value) => {
                let _ = write!(sql, "{} = ?", column.name());
                params.push(*value);
            }
            Self::Gt(column, value) => {
                let _ = write!(sql, "{} > ?", column.name());
                params.push(*value);
            }
            Self::Le(column, value) => {
                let _ = write!(sql, "{} <= ?", column.name());
                params.push(*value);
            }
            Self::In(_, values) if values.is_empty() => sql.push('0'),
            Self::In(column, values) => {
                let placeholders = vec!["?"; values.len()].join(", ");
                let _ = write!(sql, "{} IN ({placeholders})", column.name());
                params.extend(values);
            }
            Self::And(parts) => Self::render_joined(parts, " AND ", '1', sql, params),
            Self::Or(parts) => Self::render_joined(parts, " OR ", '0', sql, params),
        }
    }

    fn render_joined(
        parts: &[Self],
        separator: &str,
        empty: char,
        sql: &mut String,
        params: &mut Vec<i64>,
    ) {
        if parts.is_empty() {
            sql.push(empty);
            return;
        }
        sql.push('(');
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                sql.push_str(separator);
            }
            part.render(sql, params);
        }
        sql.push(')');
    }
}
