//! Usage filter for destructive operations
//!
//! Before an agent deletes or moves a dataset it passes the candidates through
//! [`NotInUseDatasets`]. A dataset is in use on this node when a local
//! application has it attached, or when this node holds its lease. A lease held
//! by another node does not make the dataset busy here.
//!
//! Application-based usage is the older signal; leases are the one going
//! forward. Both are honoured until applications stop being tracked.

use std::borrow::Cow;
use std::collections::BTreeSet;

use steward_core::{Application, Dataset, DatasetId, Leases, Manifestation, NodeId, Result};

/// Anything that names a dataset by its textual id.
pub trait DatasetReference {
    /// The raw dataset id, before parsing.
    fn dataset_ref(&self) -> Cow<'_, str>;
}

impl DatasetReference for Dataset {
    fn dataset_ref(&self) -> Cow<'_, str> {
        Cow::Owned(self.dataset_id.to_string())
    }
}

impl DatasetReference for Manifestation {
    fn dataset_ref(&self) -> Cow<'_, str> {
        self.dataset.dataset_ref()
    }
}

impl DatasetReference for DatasetId {
    fn dataset_ref(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }
}

impl DatasetReference for str {
    fn dataset_ref(&self) -> Cow<'_, str> {
        Cow::Borrowed(self)
    }
}

impl DatasetReference for String {
    fn dataset_ref(&self) -> Cow<'_, str> {
        Cow::Borrowed(self.as_str())
    }
}

impl<T: DatasetReference + ?Sized> DatasetReference for &T {
    fn dataset_ref(&self) -> Cow<'_, str> {
        (**self).dataset_ref()
    }
}

/// Drops datasets that are in use on a node.
#[derive(Debug, Clone)]
pub struct NotInUseDatasets<'a> {
    node_id: NodeId,
    in_use_datasets: BTreeSet<DatasetId>,
    leases: &'a Leases,
}

impl<'a> NotInUseDatasets<'a> {
    /// Build a filter for `node_id`.
    ///
    /// `local_applications` are the applications running on that node; the
    /// datasets they reference are collected once, here.
    pub fn new<'b>(
        node_id: NodeId,
        local_applications: impl IntoIterator<Item = &'b Application>,
        leases: &'a Leases,
    ) -> Self {
        let in_use_datasets = local_applications
            .into_iter()
            .filter_map(Application::dataset_id)
            .collect();
        Self {
            node_id,
            in_use_datasets,
            leases,
        }
    }

    /// Whether `dataset_id` is busy on this node.
    pub fn is_in_use(&self, dataset_id: &DatasetId) -> bool {
        self.in_use_datasets.contains(dataset_id) || self.leases.is_held_by(dataset_id, self.node_id)
    }

    /// Filter `objects` using their [`DatasetReference`].
    pub fn filter<T: DatasetReference>(&self, objects: impl IntoIterator<Item = T>) -> Result<Vec<T>> {
        self.filter_by(objects, |object| object.dataset_ref().into_owned())
    }

    /// Filter `objects`, extracting each raw dataset id with `get_dataset_id`.
    ///
    /// Order is preserved. A raw id that is not a UUID fails the whole call
    /// with [`StewardError::MalformedIdentifier`](steward_core::StewardError::MalformedIdentifier).
    pub fn filter_by<T, F, S>(
        &self,
        objects: impl IntoIterator<Item = T>,
        get_dataset_id: F,
    ) -> Result<Vec<T>>
    where
        F: Fn(&T) -> S,
        S: AsRef<str>,
    {
        let mut result = Vec::new();
        for object in objects {
            let dataset_id = DatasetId::parse(get_dataset_id(&object).as_ref())?;
            if self.is_in_use(&dataset_id) {
                continue;
            }
            result.push(object);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use steward_core::{AttachedVolume, Lease, StewardError};
    use uuid::Uuid;

    fn node(n: u128) -> NodeId {
        NodeId::from_uuid(Uuid::from_u128(n))
    }

    fn dataset(n: u128) -> DatasetId {
        DatasetId::from_uuid(Uuid::from_u128(n))
    }

    fn app_using(name: &str, dataset_id: Option<DatasetId>) -> Application {
        Application {
            name: name.into(),
            image: "busybox".into(),
            volume: dataset_id.map(|id| AttachedVolume {
                manifestation: Manifestation::primary(Dataset::new(id)),
                mountpoint: format!("/data/{name}").into(),
            }),
            running: true,
        }
    }

    fn leases(entries: &[(u128, u128)]) -> Leases {
        entries
            .iter()
            .map(|(d, n)| Lease {
                dataset_id: dataset(*d),
                node_id: node(*n),
                expiration: None,
            })
            .collect()
    }

    const NODE_A: u128 = 0xA;
    const NODE_B: u128 = 0xB;

    #[test]
    fn local_use_and_own_leases_are_filtered() {
        let apps = vec![app_using("app", Some(dataset(1))), app_using("idle", None)];
        let leases = leases(&[(2, NODE_A), (3, NODE_B)]);
        let filter = NotInUseDatasets::new(node(NODE_A), &apps, &leases);

        let candidates: Vec<Dataset> = (1..=4).map(|n| Dataset::new(dataset(n))).collect();
        let remaining = filter.filter(candidates).unwrap();

        let ids: Vec<_> = remaining.iter().map(|d| d.dataset_id).collect();
        assert_eq!(ids, vec![dataset(3), dataset(4)]);
    }

    #[test]
    fn custom_extractor_works_on_raw_strings() {
        let apps = vec![app_using("app", Some(dataset(1)))];
        let leases = Leases::new();
        let filter = NotInUseDatasets::new(node(NODE_A), &apps, &leases);

        let candidates = vec![
            ("one", dataset(1).to_string()),
            ("two", dataset(2).to_string()),
        ];
        let remaining = filter
            .filter_by(candidates, |(_, id)| id.clone())
            .unwrap();
        assert_eq!(remaining, vec![("two", dataset(2).to_string())]);
    }

    #[test]
    fn non_canonical_spelling_is_still_matched() {
        let apps = vec![app_using("app", Some(dataset(1)))];
        let leases = Leases::new();
        let filter = NotInUseDatasets::new(node(NODE_A), &apps, &leases);

        let upper = dataset(1).to_string().to_uppercase();
        assert!(filter.filter(vec![upper]).unwrap().is_empty());
    }

    #[test]
    fn malformed_identifier_fails_loudly() {
        let leases = Leases::new();
        let filter = NotInUseDatasets::new(node(NODE_A), &Vec::<Application>::new(), &leases);

        let err = filter
            .filter(vec![dataset(4).to_string(), "d1".to_string()])
            .unwrap_err();
        assert_eq!(err, StewardError::malformed_identifier("d1"));
    }

    #[test]
    fn in_use_set_is_fixed_at_construction() {
        let leases = Leases::new();
        let filter = {
            let apps = vec![app_using("app", Some(dataset(1)))];
            NotInUseDatasets::new(node(NODE_A), &apps, &leases)
        };

        assert!(filter.is_in_use(&dataset(1)));
    }

    proptest! {
        #[test]
        fn filtering_is_idempotent(
            used in prop::collection::vec(0u128..16, 0..6),
            leased in prop::collection::vec((0u128..16, prop::bool::ANY), 0..6),
            candidates in prop::collection::vec(0u128..16, 0..12),
        ) {
            let apps: Vec<_> = used
                .iter()
                .enumerate()
                .map(|(i, d)| app_using(&format!("app{i}"), Some(dataset(*d))))
                .collect();
            let leases: Leases = leased
                .iter()
                .map(|(d, mine)| Lease {
                    dataset_id: dataset(*d),
                    node_id: if *mine { node(NODE_A) } else { node(NODE_B) },
                    expiration: None,
                })
                .collect();
            let filter = NotInUseDatasets::new(node(NODE_A), &apps, &leases);

            let ids: Vec<DatasetId> = candidates.iter().map(|d| dataset(*d)).collect();
            let once = filter.filter(ids).unwrap();
            let twice = filter.filter(once.clone()).unwrap();
            prop_assert_eq!(&once, &twice);
            for id in &once {
                prop_assert!(!filter.is_in_use(id));
            }
        }
    }
}
