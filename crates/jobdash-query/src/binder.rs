use std::fmt;

use jobdash_core::SqlValue;

/// Positional Postgres placeholder (`$N`, 1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placeholder(usize);

impl Placeholder {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.0)
    }
}

/// Append-only parameter list for one statement.
///
/// `append` is the only way to obtain a placeholder, so a fragment can only
/// reference a value that is already in the list, at the index it occupies.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Binder {
    values: Vec<SqlValue>,
}

impl Binder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, value: impl Into<SqlValue>) -> Placeholder {
        self.values.push(value.into());
        Placeholder(self.values.len())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_track_list_position() {
        let mut binder = Binder::new();
        let a = binder.append(7_i64);
        let b = binder.append("Approved");
        let c = binder.append(7_i64);

        assert_eq!(a.to_string(), "$1");
        assert_eq!(b.to_string(), "$2");
        assert_eq!(c.index(), 3);
        assert_eq!(
            binder.values(),
            &[SqlValue::Int(7), SqlValue::Text("Approved".into()), SqlValue::Int(7)]
        );
    }
}
