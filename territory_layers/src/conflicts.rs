// Copyright 2025 the Territory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Conflict detection: codes owned by more than one layer.
//!
//! Conflicts are informational. Nothing here blocks or changes an assignment;
//! resolution is an operator decision.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use territory_spatial::RegionCode;

use crate::ids::LayerId;
use crate::model::Layer;

/// One owning layer of a conflicting code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerOwner {
    /// Owning layer.
    pub layer_id: LayerId,
    /// Its name.
    pub name: String,
    /// Its color.
    pub color: String,
}

/// A code assigned to two or more layers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictingCode {
    /// The contested code.
    pub code: RegionCode,
    /// Owners, in the order the layers were given.
    pub owners: Vec<LayerOwner>,
}

/// Report every code held by at least two of `layers`, sorted by code.
pub fn detect_conflicts<'a>(
    layers: impl IntoIterator<Item = (&'a Layer, &'a BTreeSet<RegionCode>)>,
) -> Vec<ConflictingCode> {
    let mut owners: BTreeMap<&RegionCode, Vec<&Layer>> = BTreeMap::new();
    for (layer, codes) in layers {
        for code in codes {
            let list = owners.entry(code).or_default();
            if !list.iter().any(|l| l.id == layer.id) {
                list.push(layer);
            }
        }
    }
    owners
        .into_iter()
        .filter(|(_, list)| list.len() >= 2)
        .map(|(code, list)| ConflictingCode {
            code: code.clone(),
            owners: list
                .into_iter()
                .map(|l| LayerOwner {
                    layer_id: l.id,
                    name: l.name.clone(),
                    color: l.color.clone(),
                })
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::AreaId;
    use proptest::prelude::*;

    fn layer(id: u64) -> Layer {
        Layer {
            id: LayerId(id),
            area_id: AreaId(1),
            name: format!("L{id}"),
            color: format!("#00000{id}"),
            opacity: 50,
            visible: true,
            order_index: 0,
        }
    }

    fn set(codes: &[&str]) -> BTreeSet<RegionCode> {
        codes.iter().map(|&c| RegionCode::from(c)).collect()
    }

    #[test]
    fn shared_codes_report_all_owners() {
        let (a, b, c) = (layer(1), layer(2), layer(3));
        let (sa, sb, sc) = (
            set(&["80331", "80333"]),
            set(&["80333", "80335"]),
            set(&["80333", "80335", "80336"]),
        );
        let report = detect_conflicts([(&a, &sa), (&b, &sb), (&c, &sc)]);
        assert_eq!(report.len(), 2);
        assert_eq!(report[0].code.as_str(), "80333");
        assert_eq!(
            report[0].owners.iter().map(|o| o.layer_id).collect::<Vec<_>>(),
            vec![LayerId(1), LayerId(2), LayerId(3)]
        );
        assert_eq!(report[1].code.as_str(), "80335");
        assert_eq!(report[1].owners[0].name, "L2");
        assert_eq!(report[1].owners[1].color, "#000003");
    }

    #[test]
    fn single_owner_is_never_reported() {
        let (a, b) = (layer(1), layer(2));
        let (sa, sb) = (set(&["1", "2"]), set(&["3"]));
        assert!(detect_conflicts([(&a, &sa), (&b, &sb)]).is_empty());
    }

    proptest! {
        #[test]
        fn reported_iff_two_owners(
            sets in proptest::collection::vec(
                proptest::collection::btree_set(0_u8..20, 0..10),
                1..5,
            )
        ) {
            let layers: Vec<Layer> = (0..sets.len()).map(|i| layer(i as u64 + 1)).collect();
            let code_sets: Vec<BTreeSet<RegionCode>> = sets
                .iter()
                .map(|s| s.iter().map(|n| RegionCode::new(n.to_string())).collect())
                .collect();
            let report = detect_conflicts(layers.iter().zip(code_sets.iter()));
            let reported: BTreeSet<RegionCode> = report.iter().map(|c| c.code.clone()).collect();
            for n in 0_u8..20 {
                let code = RegionCode::new(n.to_string());
                let owners = code_sets.iter().filter(|s| s.contains(&code)).count();
                prop_assert_eq!(reported.contains(&code), owners >= 2);
            }
        }
    }
}
