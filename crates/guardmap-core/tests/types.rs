//! Tests for the address and region types

use guardmap_core::types::{Address, MemoryRegion, Protection, RegionState, RegionType};

#[test]
fn test_address_from_u64()
{
    let address = Address::from(0x40_1000);
    assert_eq!(address.value(), 0x40_1000);
    let value: u64 = address.into();
    assert_eq!(value, 0x40_1000);
}

#[test]
fn test_address_parse_debugger_forms()
{
    let plain: Address = "7ff812340000".parse().unwrap();
    let prefixed: Address = "0x7ff812340000".parse().unwrap();
    let split: Address = "00007ff8`12340000".parse().unwrap();

    assert_eq!(plain, prefixed);
    assert_eq!(plain, split);
    assert!("0x7ff8zz".parse::<Address>().is_err());
}

#[test]
fn test_address_ordering()
{
    let low = Address::new(0x1000);
    let high = Address::new(0x2000);
    assert!(low < high);
    assert_eq!(low + 0x1000, high);
    assert_eq!(high - 0x1000, low);
}

#[test]
fn test_memory_region_bounds()
{
    let region = MemoryRegion::new(
        Address::new(0x1000),
        Address::new(0x1000),
        0x2000,
        RegionState::Commit,
        Protection::READWRITE,
        RegionType::Private,
    );

    assert_eq!(region.end(), Address::new(0x3000));
    assert!(region.contains(Address::new(0x1000)));
    assert!(region.contains(Address::new(0x2fff)));
    assert!(!region.contains(Address::new(0x3000)));
    assert!(region.is_readable());
}

#[test]
fn test_guard_pages_are_not_readable()
{
    let region = MemoryRegion::new(
        Address::new(0x1000),
        Address::new(0x1000),
        0x1000,
        RegionState::Commit,
        Protection::READWRITE | Protection::GUARD,
        RegionType::Private,
    );
    assert!(region.is_committed());
    assert!(!region.is_readable());
}

#[test]
fn test_protection_round_trips_through_text()
{
    let protect = Protection::EXECUTE_READ | Protection::GUARD;
    let text = protect.to_string();
    assert_eq!(text, "EXECUTE_READ|GUARD");
    assert_eq!(text.parse::<Protection>().unwrap(), protect);
    assert_eq!(Protection::empty().to_string(), "-");
}

#[test]
fn test_region_kinds_from_raw()
{
    assert_eq!(RegionState::from_raw(0x1000), RegionState::Commit);
    assert_eq!(RegionType::from_raw(0x4_0000), RegionType::Mapped);
    assert_eq!(RegionType::from_raw(0x100_0000).to_string(), "image");
    assert_eq!(RegionState::from_raw(0x1234), RegionState::Unknown(0x1234));
}
