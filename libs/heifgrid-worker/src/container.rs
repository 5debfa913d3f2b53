// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Container reader seam.
//!
//! Box/item parsing of the media container is a consumed collaborator, not
//! something this crate reimplements. The render path only needs the
//! surface below: the primary item, item lookup by id, item payloads,
//! typed references and the codec configuration header. A real HEIF box
//! parser plugs in via [`ContainerOpener`]; [`memory`] provides the
//! in-tree reference implementation used by the default binary and the
//! test suite.

use heifgrid_wire::RemoteError;

/// Item type of an HEVC-coded picture.
pub const ITEM_TYPE_HVC1: &str = "hvc1";
/// Item type of a tile-composite grid.
pub const ITEM_TYPE_GRID: &str = "grid";
/// Reference kind linking a grid item to its tile items.
pub const REF_DERIVED_IMAGE: &str = "dimg";

/// One typed item inside a container.
pub trait ContainerItem {
    fn id(&self) -> u32;
    fn item_type(&self) -> &str;
    /// Declared display size, when the container carries one.
    fn spatial_extents(&self) -> Option<(u32, u32)>;
    /// Ordered ids of the items this item references with `kind`.
    fn references(&self, kind: &str) -> Vec<u32>;
    /// Decoder configuration record, already converted to pushable NAL form.
    fn hevc_config_header(&self) -> Option<Vec<u8>>;
}

/// A parsed container.
pub trait Container {
    fn primary_item(&self) -> Result<&dyn ContainerItem, RemoteError>;
    fn item_by_id(&self, id: u32) -> Result<&dyn ContainerItem, RemoteError>;
    fn item_data(&self, item: &dyn ContainerItem) -> Result<Vec<u8>, RemoteError>;
}

/// Parses raw container bytes. The seam where a real HEIF reader plugs in.
pub trait ContainerOpener: Send + Sync {
    fn open(&self, data: &[u8]) -> Result<Box<dyn Container>, RemoteError>;
}

pub mod memory {
    //! MessagePack-encoded in-memory container: a flat item table plus a
    //! primary id. Functionally a strict subset of what a HEIF reader
    //! exposes, which is exactly what makes it usable as the reference
    //! implementation behind the [`ContainerOpener`] seam.

    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct MemoryItem {
        pub id: u32,
        pub item_type: String,
        pub extents: Option<(u32, u32)>,
        pub config_header: Option<Vec<u8>>,
        pub data: Vec<u8>,
        /// Ordered `dimg` references (grid items).
        pub derived_refs: Vec<u32>,
    }

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    pub struct MemoryContainer {
        pub primary: u32,
        pub items: Vec<MemoryItem>,
    }

    impl MemoryContainer {
        pub fn from_bytes(data: &[u8]) -> Result<Self, RemoteError> {
            rmp_serde::from_slice(data)
                .map_err(|e| RemoteError::Container(format!("unreadable container: {e}")))
        }

        pub fn to_bytes(&self) -> Vec<u8> {
            // serialization of a plain value table cannot fail
            rmp_serde::to_vec(self).unwrap_or_default()
        }
    }

    impl ContainerItem for MemoryItem {
        fn id(&self) -> u32 {
            self.id
        }

        fn item_type(&self) -> &str {
            &self.item_type
        }

        fn spatial_extents(&self) -> Option<(u32, u32)> {
            self.extents
        }

        fn references(&self, kind: &str) -> Vec<u32> {
            if kind == REF_DERIVED_IMAGE {
                self.derived_refs.clone()
            } else {
                Vec::new()
            }
        }

        fn hevc_config_header(&self) -> Option<Vec<u8>> {
            self.config_header.clone()
        }
    }

    impl Container for MemoryContainer {
        fn primary_item(&self) -> Result<&dyn ContainerItem, RemoteError> {
            self.item_by_id(self.primary)
        }

        fn item_by_id(&self, id: u32) -> Result<&dyn ContainerItem, RemoteError> {
            self.items
                .iter()
                .find(|item| item.id == id)
                .map(|item| item as &dyn ContainerItem)
                .ok_or_else(|| RemoteError::Container(format!("no item with id {id}")))
        }

        fn item_data(&self, item: &dyn ContainerItem) -> Result<Vec<u8>, RemoteError> {
            self.items
                .iter()
                .find(|i| i.id == item.id())
                .map(|i| i.data.clone())
                .ok_or_else(|| RemoteError::Container(format!("no item with id {}", item.id())))
        }
    }

    /// Opener for [`MemoryContainer`] bytes.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct MemoryContainerOpener;

    impl ContainerOpener for MemoryContainerOpener {
        fn open(&self, data: &[u8]) -> Result<Box<dyn Container>, RemoteError> {
            Ok(Box::new(MemoryContainer::from_bytes(data)?))
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_round_trip_and_lookup() {
            let container = MemoryContainer {
                primary: 7,
                items: vec![MemoryItem {
                    id: 7,
                    item_type: ITEM_TYPE_HVC1.to_string(),
                    extents: Some((64, 48)),
                    config_header: Some(vec![1, 2, 3]),
                    data: vec![9, 9],
                    derived_refs: vec![],
                }],
            };

            let opened = MemoryContainerOpener.open(&container.to_bytes()).unwrap();
            let primary = opened.primary_item().unwrap();
            assert_eq!(primary.item_type(), ITEM_TYPE_HVC1);
            assert_eq!(primary.spatial_extents(), Some((64, 48)));
            assert_eq!(opened.item_data(primary).unwrap(), vec![9, 9]);
            assert!(opened.item_by_id(8).is_err());
        }

        #[test]
        fn test_unreadable_bytes() {
            assert!(matches!(
                MemoryContainerOpener.open(b"not a container"),
                Err(RemoteError::Container(_))
            ));
        }
    }
}
