//! Tests for address-to-module resolution

use std::env;

use faultline_core::failure::ModuleName;
use faultline_core::resolver::{ModuleResolver, MODULE_CAPACITY};
use faultline_core::types::Address;

fn current_exe_name() -> ModuleName
{
    ModuleName::from_path(&env::current_exe().unwrap())
}

#[inline(never)]
fn probe() -> usize
{
    std::hint::black_box(41) + 1
}

#[test]
fn test_function_resolves_to_test_binary()
{
    let address = Address::from_ptr(probe as *const ());
    assert_eq!(ModuleResolver::resolve(address), current_exe_name());
}

#[test]
fn test_unmapped_address_is_empty()
{
    assert!(ModuleResolver::resolve(Address::ZERO).is_empty());
    assert!(ModuleResolver::resolve(Address::new(u64::MAX - 0xFFF)).is_empty());
}

#[test]
fn test_loaded_modules_contains_executable()
{
    let modules = ModuleResolver::loaded_modules();
    assert!(!modules.is_empty());
    assert!(modules.len() <= MODULE_CAPACITY);
    assert!(!modules.is_truncated());

    let exe = current_exe_name();
    let address = Address::from_ptr(probe as *const ());
    let module = modules.find(address).unwrap();
    assert_eq!(module.name(), exe);
    assert!(module.contains(address));
    assert!(!module.contains(module.end()));
}

#[test]
fn test_resolution_is_stable()
{
    ModuleResolver::warm_up();
    let address = Address::from_ptr(probe as *const ());
    assert_eq!(ModuleResolver::resolve(address), ModuleResolver::resolve(address));
}
