use crate::database::{ConnectionError, SharedConnection};
use itertools::Itertools;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubgroupReport {
    pub label: String,
    pub valid_elements: usize,
    pub selected: usize,
    pub added: usize,
    pub size: usize,
}

/// Add every node of `source` whose `element` extra is in `elements` to `destination`
///
/// The destination is created if needed; nodes already in it are left alone, so running this
/// twice, or after the allow-list grew, only ever adds.
pub fn create_subgroup(
    connection: &SharedConnection,
    elements: &[String],
    source: &str,
    destination: &str,
) -> Result<SubgroupReport, ConnectionError> {
    let source_group = connection.get_group(source)?;
    let (subgroup, _) = connection.get_or_create_group(destination)?;

    let selected = connection
        .group_nodes_with_extra_in(&source_group, "element", elements)?
        .into_iter()
        .map(|node| node.id)
        .collect_vec();
    let added = connection.add_nodes(&subgroup, &selected)?;
    let size = connection.group_size(&subgroup)?;

    info!(
        source = source,
        destination = destination,
        selected = selected.len(),
        added = added,
        "Structures from full group added to subgroup"
    );

    Ok(SubgroupReport {
        label: subgroup.label,
        valid_elements: elements.len(),
        selected: selected.len(),
        added,
        size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::fixtures::{store, structures_group};
    use std::collections::BTreeSet;

    fn elements(connection: &SharedConnection, label: &str) -> BTreeSet<String> {
        let group = connection.get_group(label).unwrap();
        connection
            .group_nodes(&group)
            .unwrap()
            .into_iter()
            .map(|node| node.extras["element"].clone())
            .collect()
    }

    #[test]
    fn selects_only_allowed_elements() {
        let connection = store();
        structures_group(&connection, "full", &[("Si", "XO"), ("Fe", "XO"), ("O", "X2O")]);

        let report = create_subgroup(
            &connection,
            &["Si".to_owned(), "O".to_owned()],
            "full",
            "full/kkr",
        )
        .unwrap();

        assert_eq!(report.valid_elements, 2);
        assert_eq!(report.added, 2);
        assert_eq!(report.size, 2);
        assert_eq!(
            elements(&connection, "full/kkr"),
            BTreeSet::from(["Si".to_owned(), "O".to_owned()])
        );
    }

    #[test]
    fn union_with_prior_destination_is_idempotent() {
        let connection = store();
        let (_, nodes) =
            structures_group(&connection, "full", &[("Si", "XO"), ("Fe", "XO"), ("O", "X2O")]);
        let (subgroup, _) = connection.get_or_create_group("full/kkr").unwrap();
        // Si was selected by an earlier run
        connection.add_nodes(&subgroup, &[nodes[0].id]).unwrap();

        let allowed = ["Si".to_owned(), "O".to_owned()];
        let first = create_subgroup(&connection, &allowed, "full", "full/kkr").unwrap();
        let second = create_subgroup(&connection, &allowed, "full", "full/kkr").unwrap();

        assert_eq!(first.added, 1);
        assert_eq!(second.added, 0);
        assert_eq!(second.size, 2);
        assert_eq!(
            elements(&connection, "full/kkr"),
            BTreeSet::from(["Si".to_owned(), "O".to_owned()])
        );
    }

    #[test]
    fn missing_source_group_fails_without_creating_destination() {
        let connection = store();

        assert!(matches!(
            create_subgroup(&connection, &["Si".to_owned()], "full", "full/kkr"),
            Err(ConnectionError::GroupNotFound(_))
        ));
        assert!(connection.group("full/kkr").unwrap().is_none());
    }
}
