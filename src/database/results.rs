/// Rows produced by a single statement of a script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSet {
    columns: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>) -> ResultSet {
        Self {
            columns,
            rows: vec![],
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn set_columns(&mut self, columns: Vec<String>) {
        self.columns = columns;
    }

    pub fn push_row(&mut self, row: Vec<Option<String>>) {
        self.rows.push(row);
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Text of a cell, `None` for NULL or when the cell does not exist.
    pub fn value(&self, row: usize, column: usize) -> Option<&str> {
        self.rows.get(row)?.get(column)?.as_deref()
    }

    /// Whether the cell exists and holds NULL.
    pub fn is_null(&self, row: usize, column: usize) -> bool {
        matches!(self.rows.get(row).and_then(|r| r.get(column)), Some(None))
    }
}

/// All result sets of one submitted script, in statement order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryResults {
    sets: Vec<ResultSet>,
}

impl QueryResults {
    pub fn push(&mut self, set: ResultSet) {
        self.sets.push(set);
    }

    pub fn result_count(&self) -> usize {
        self.sets.len()
    }

    pub fn result(&self, index: usize) -> Option<&ResultSet> {
        self.sets.get(index)
    }

    pub fn row_count(&self, result: usize) -> usize {
        self.sets.get(result).map_or(0, ResultSet::row_count)
    }

    pub fn value(&self, result: usize, row: usize, column: usize) -> Option<&str> {
        self.sets.get(result)?.value(row, column)
    }

    pub fn is_null(&self, result: usize, row: usize, column: usize) -> bool {
        self.sets
            .get(result)
            .is_some_and(|set| set.is_null(row, column))
    }
}

impl FromIterator<ResultSet> for QueryResults {
    fn from_iter<T: IntoIterator<Item = ResultSet>>(iter: T) -> Self {
        Self {
            sets: iter.into_iter().collect(),
        }
    }
}
