// Copyright 2025 the Territory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Typed identifiers.

use core::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(
            Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

id_type!(
    /// Identifier of an [`Area`](crate::Area).
    AreaId,
    "area#"
);
id_type!(
    /// Identifier of a [`Layer`](crate::Layer).
    LayerId,
    "layer#"
);
id_type!(
    /// Identifier of a [`ChangeRecord`](crate::ChangeRecord).
    ChangeId,
    "change#"
);
id_type!(
    /// Identifier of a [`VersionSnapshot`](crate::VersionSnapshot).
    VersionId,
    "version#"
);
