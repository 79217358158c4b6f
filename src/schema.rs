/// How a column's raw input is treated during normalization.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnKind {
    /// ISO `YYYY-MM-DD`, accepted as given (the entry widget owns validity).
    Date,
    /// Free text, passed through unchanged.
    Text,
    /// Must be empty or valid JSON; stored pretty-printed.
    Json,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
}

impl Column {
    pub fn new(name: &str, kind: ColumnKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
        }
    }
}

const STANDARD_COLUMNS: [(&str, ColumnKind); 8] = [
    ("Date", ColumnKind::Date),
    ("Client", ColumnKind::Text),
    ("AM", ColumnKind::Text),
    ("SF Ticket", ColumnKind::Text),
    ("Use Case", ColumnKind::Text),
    ("Notes", ColumnKind::Text),
    ("Code", ColumnKind::Json),
    ("Report ID", ColumnKind::Text),
];

const COMPACT_COLUMNS: [(&str, ColumnKind); 6] = [
    ("Date", ColumnKind::Date),
    ("Client", ColumnKind::Text),
    ("AM", ColumnKind::Text),
    ("Use Case", ColumnKind::Text),
    ("Notes", ColumnKind::Text),
    ("Code", ColumnKind::Json),
];

/// Ordered column set for one table version. The column set is configuration:
/// stores and backends never assume a particular width or field name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Schema {
    label: String,
    columns: Vec<Column>,
}

impl Schema {
    pub fn new(label: &str, columns: Vec<Column>) -> Self {
        Self {
            label: label.to_string(),
            columns,
        }
    }

    /// The full 8-column table (ticket and report id included).
    pub fn standard() -> Self {
        Self::from_defs("standard", &STANDARD_COLUMNS)
    }

    /// The early 6-column table without ticket/report columns.
    pub fn compact() -> Self {
        Self::from_defs("compact", &COMPACT_COLUMNS)
    }

    fn from_defs(label: &str, defs: &[(&str, ColumnKind)]) -> Self {
        Self {
            label: label.to_string(),
            columns: defs
                .iter()
                .map(|(name, kind)| Column::new(name, *kind))
                .collect(),
        }
    }

    pub fn label(&self) -> &str {
        self.label.as_str()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> &[Column] {
        self.columns.as_slice()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }

    /// First date column, used for the optional date-descending display sort.
    pub fn date_position(&self) -> Option<usize> {
        self.columns
            .iter()
            .position(|column| column.kind == ColumnKind::Date)
    }

    pub fn header(&self) -> Vec<String> {
        self.columns
            .iter()
            .map(|column| column.name.clone())
            .collect()
    }
}
