use crate::domain::Row;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum CaseMode {
    Sensitive,
    #[default]
    Insensitive,
}

impl CaseMode {
    pub fn toggled(self) -> Self {
        match self {
            Self::Sensitive => Self::Insensitive,
            Self::Insensitive => Self::Sensitive,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Sensitive => "[S]",
            Self::Insensitive => "[I]",
        }
    }
}

/// Splits typed text on whitespace once it contains a space. Returns the
/// committed pieces and what remains live (empty after a split).
pub fn split_live_text(live: &str) -> (Vec<String>, String) {
    if !live.contains(' ') {
        return (Vec::new(), live.to_string());
    }
    let terms = live.split_whitespace().map(str::to_string).collect();
    (terms, String::new())
}

/// Rows of `origin` matching every term and the live text, in origin order.
pub fn apply_filter(origin: &[Row], terms: &[String], live: &str, case: CaseMode) -> Vec<Row> {
    let (extra, live) = split_live_text(live);
    let needles: Vec<String> = terms
        .iter()
        .chain(extra.iter())
        .map(String::as_str)
        .chain(Some(live.as_str()))
        .filter(|term| !term.is_empty())
        .map(|term| normalize(term, case))
        .collect();

    if needles.is_empty() {
        return origin.to_vec();
    }

    origin
        .iter()
        .filter(|row| {
            let fields = searchable_fields(row, case);
            needles
                .iter()
                .all(|needle| fields.iter().any(|field| field.contains(needle.as_str())))
        })
        .cloned()
        .collect()
}

fn searchable_fields(row: &Row, case: CaseMode) -> [String; 3] {
    [
        normalize(&row.tags, case),
        normalize(&row.note, case),
        normalize(&row.start, case),
    ]
}

fn normalize(text: &str, case: CaseMode) -> String {
    match case {
        CaseMode::Sensitive => text.to_string(),
        CaseMode::Insensitive => text.to_lowercase(),
    }
}
