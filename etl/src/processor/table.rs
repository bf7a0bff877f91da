use std::fmt;

/// The five star-schema tables the pipeline writes, each under its own directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputTable {
    Songs,
    Artists,
    Users,
    Time,
    Songplays,
}

impl OutputTable {
    /// Dimensions first, facts last.
    pub fn all() -> [OutputTable; 5] {
        [
            OutputTable::Songs,
            OutputTable::Artists,
            OutputTable::Time,
            OutputTable::Users,
            OutputTable::Songplays,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            OutputTable::Songs => "songs",
            OutputTable::Artists => "artists",
            OutputTable::Users => "users",
            OutputTable::Time => "time",
            OutputTable::Songplays => "songplays",
        }
    }

    /// Columns encoded in the directory layout (outermost first) instead of the files.
    pub fn partition_columns(&self) -> &'static [&'static str] {
        match self {
            OutputTable::Songs => &["year", "artist_id"],
            OutputTable::Time | OutputTable::Songplays => &["year", "month"],
            OutputTable::Users | OutputTable::Artists => &[],
        }
    }
}

impl fmt::Display for OutputTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partitioning() {
        assert_eq!(OutputTable::Songs.partition_columns(), &["year", "artist_id"]);
        assert_eq!(OutputTable::Songplays.partition_columns(), &["year", "month"]);
        assert!(OutputTable::Users.partition_columns().is_empty());
    }

    #[test]
    fn test_fact_table_written_last() {
        assert_eq!(OutputTable::all().last(), Some(&OutputTable::Songplays));
        assert_eq!(OutputTable::Time.to_string(), "time");
    }
}
