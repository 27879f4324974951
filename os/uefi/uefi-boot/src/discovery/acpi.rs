//! # Root/Extended System Description Pointer

use crate::firmware::ConfigurationTable;
use uefi::{Guid, guid};

/// Configuration table GUID of the ACPI 2.0+ RSDP.
pub const ACPI2_TABLE_GUID: Guid = guid!("8868e871-e4f1-11d3-bc22-0080c73c8881");

/// Configuration table GUID of the ACPI 1.0 RSDP.
pub const ACPI1_TABLE_GUID: Guid = guid!("eb9d2d30-2d88-11d3-9a16-0090273fc14d");

/// Returns the physical address of the RSDP if present.
///
/// Prefers the ACPI 2.0 entry and falls back to ACPI 1.0; for each GUID the
/// first entry in table order wins.
#[must_use]
pub fn find_rsdp_addr(tables: &[ConfigurationTable]) -> Option<u64> {
    let find = |guid: Guid| {
        tables
            .iter()
            .find(|entry| entry.guid == guid && entry.address != 0)
            .map(|entry| entry.address)
    };

    find(ACPI2_TABLE_GUID).or_else(|| find(ACPI1_TABLE_GUID))
}
