use serde_json::Value;

/// Comparison operators the filter stage understands.
///
/// These are the bracketed operators accepted on list endpoints
/// (`?duration[gte]=5`) plus the implicit equality of a bare key. `Ne` is not
/// reachable from the query string; scope constraints use it for visibility
/// filters (`secret_tour <> true`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CompareOp {
    pub fn from_suffix(op: &str) -> Option<Self> {
        match op {
            "gte" => Some(CompareOp::Gte),
            "gt" => Some(CompareOp::Gt),
            "lte" => Some(CompareOp::Lte),
            "lt" => Some(CompareOp::Lt),
            _ => None,
        }
    }

    pub fn to_sql(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
        }
    }
}

/// One field constraint produced by the filter stage.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub column: String,
    pub op: CompareOp,
    pub value: Value,
}

impl Condition {
    pub fn new(column: impl Into<String>, op: CompareOp, value: Value) -> Self {
        Self {
            column: column.into(),
            op,
            value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn to_sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub column: String,
    pub direction: SortDirection,
}

/// The fully assembled retrieval request: output of the four pipeline stages,
/// input to the SQL renderer. Pure data, no I/O until executed.
#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    pub conditions: Vec<Condition>,
    pub order: Vec<SortKey>,
    /// Empty means all columns.
    pub select: Vec<String>,
    pub limit: i64,
    pub offset: i64,
}

impl ListQuery {
    /// Merge a scope constraint (path scoping, visibility filter) ahead of the
    /// client-supplied conditions.
    pub fn scoped(mut self, condition: Condition) -> Self {
        self.conditions.insert(0, condition);
        self
    }

    /// Internal reads that need every matching row; the renderer emits no
    /// LIMIT clause for this sentinel.
    pub const NO_LIMIT: i64 = i64::MAX;

    pub fn unbounded(conditions: Vec<Condition>) -> Self {
        Self {
            conditions,
            order: vec![],
            select: vec![],
            limit: Self::NO_LIMIT,
            offset: 0,
        }
    }
}

/// Rendered SQL plus its positional parameters in `$1..$n` order.
#[derive(Debug, Clone)]
pub struct SqlQuery {
    pub sql: String,
    pub params: Vec<Value>,
}
