/// Sort direction for list endpoints.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "desc" => Self::Desc,
            _ => Self::Asc,
        }
    }

    pub fn sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Trait for column enums. Each sortable listing defines its own column enum
/// implementing this trait.
pub trait SortableColumn: Sized + Default + Clone + PartialEq {
    /// Parse column name from query string parameter.
    fn parse(s: &str) -> Option<Self>;

    /// Convert column to query string parameter value.
    fn as_str(&self) -> &'static str;

    /// SQL expression for ORDER BY clause (e.g., "t.created_at").
    fn sql_expression(&self) -> &'static str;
}

/// Trait for query params that support sorting.
pub trait Sortable {
    fn sort_by(&self) -> Option<&String>;
    fn sort_dir(&self) -> Option<&String>;

    /// Resolve sort parameters; unknown columns fall back to the default.
    fn resolve_sort<C: SortableColumn>(&self) -> ListSort<C> {
        let column = self
            .sort_by()
            .and_then(|s| C::parse(s))
            .unwrap_or_default();

        let direction = self
            .sort_dir()
            .map(|s| SortDirection::parse(s))
            .unwrap_or_default();

        ListSort { column, direction }
    }
}

#[derive(Debug, Clone)]
pub struct ListSort<C: SortableColumn> {
    pub column: C,
    pub direction: SortDirection,
}

impl<C: SortableColumn> ListSort<C> {
    pub fn new(column: C, direction: SortDirection) -> Self {
        Self { column, direction }
    }

    /// SQL ORDER BY expression (e.g., "t.created_at DESC").
    pub fn sql_order_by(&self) -> String {
        format!("{} {}", self.column.sql_expression(), self.direction.sql())
    }

    /// Query string for the current sort state.
    pub fn query_string(&self) -> String {
        format!("sort={}&dir={}", self.column.as_str(), self.direction.as_str())
    }
}

impl<C: SortableColumn> Default for ListSort<C> {
    fn default() -> Self {
        Self {
            column: C::default(),
            direction: SortDirection::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, Clone, PartialEq)]
    enum Column {
        #[default]
        Name,
        Size,
    }

    impl SortableColumn for Column {
        fn parse(s: &str) -> Option<Self> {
            match s {
                "name" => Some(Self::Name),
                "size" => Some(Self::Size),
                _ => None,
            }
        }

        fn as_str(&self) -> &'static str {
            match self {
                Self::Name => "name",
                Self::Size => "size",
            }
        }

        fn sql_expression(&self) -> &'static str {
            match self {
                Self::Name => "f.name",
                Self::Size => "f.size",
            }
        }
    }

    struct Params {
        sort: Option<String>,
        dir: Option<String>,
    }

    impl Sortable for Params {
        fn sort_by(&self) -> Option<&String> {
            self.sort.as_ref()
        }

        fn sort_dir(&self) -> Option<&String> {
            self.dir.as_ref()
        }
    }

    #[test]
    fn resolves_requested_column_and_direction() {
        let params = Params {
            sort: Some("size".into()),
            dir: Some("DESC".into()),
        };
        let sort: ListSort<Column> = params.resolve_sort();
        assert_eq!(sort.column, Column::Size);
        assert_eq!(sort.sql_order_by(), "f.size DESC");
        assert_eq!(sort.query_string(), "sort=size&dir=desc");
    }

    #[test]
    fn unknown_values_fall_back_to_defaults() {
        let params = Params {
            sort: Some("; DROP TABLE files".into()),
            dir: Some("sideways".into()),
        };
        let sort: ListSort<Column> = params.resolve_sort();
        assert_eq!(sort.column, Column::Name);
        assert_eq!(sort.direction, SortDirection::Asc);
    }
}
