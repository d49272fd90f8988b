use super::{ConnectionError, Extras, ID};
use itertools::Itertools;
use rusqlite::{params, Connection};

/// `?, ?, ?` with `count` positional parameters, for `in (...)` clauses
pub fn placeholders(count: usize) -> String {
    std::iter::repeat("?").take(count).join(", ")
}

pub fn retrieve_key_values(
    connection: &Connection,
    query: &str,
    node: ID,
) -> Result<Extras, ConnectionError> {
    connection
        .prepare_cached(query)?
        .query_map(params![node], |row| Ok((row.get(0)?, row.get(1)?)))?
        .try_fold(Extras::new(), |mut init, result| {
            let (key, value) = result?;
            init.insert(key, value);

            Ok::<Extras, ConnectionError>(init)
        })
}

#[cfg(test)]
mod tests {
    use super::placeholders;

    #[test]
    fn placeholders_are_comma_separated() {
        assert_eq!(placeholders(0), "");
        assert_eq!(placeholders(1), "?");
        assert_eq!(placeholders(3), "?, ?, ?");
    }
}
