//! Case variable tests
//!
//! Register/update/find semantics and `$index` name translation.

use audioqa::audio::Buffer;
use audioqa::task::{CaseVariables, Value};
use regex::Regex;

/// Test: Register then find
/// Given an empty namespace
/// When a value is registered under a key
/// Then find with the same key returns it
#[test]
fn test_register_then_find() {
    let mut vars = CaseVariables::new();
    assert!(vars.register_value("rms", Value::Double(12.5)));
    assert_eq!(vars.find_value("rms"), Some(Value::Double(12.5)));
}

/// Test: Register does not overwrite
/// Given a key already registered
/// When it is registered again
/// Then registration fails and the first value stays
#[test]
fn test_register_existing_fails() {
    let mut vars = CaseVariables::new();
    assert!(vars.register_value("n", Value::Int(1)));
    assert!(!vars.register_value("n", Value::Int(2)));
    assert_eq!(vars.find_value("n"), Some(Value::Int(1)));
}

/// Test: Update needs an existing key
#[test]
fn test_update_semantics() {
    let mut vars = CaseVariables::new();
    assert!(!vars.update_value("n", Value::Int(1)));
    assert_eq!(vars.find_value("n"), None);

    vars.register_value("n", Value::Int(1));
    assert!(vars.update_value("n", Value::Int(5)));
    assert_eq!(vars.find_value("n"), Some(Value::Int(5)));
}

/// Test: Buffers follow the same rules
#[test]
fn test_buffer_table() {
    let mut vars = CaseVariables::new();
    let a = Buffer::from_samples(&[1], false).into_shared();
    let b = Buffer::from_samples(&[2], false).into_shared();

    assert!(vars.register_buffer("tone", a.clone()));
    assert!(!vars.register_buffer("tone", b.clone()));
    assert_eq!(vars.find_buffer("tone").unwrap().to_i16(), vec![1]);

    assert!(vars.update_buffer("tone", b));
    assert_eq!(vars.find_buffer("tone").unwrap().to_i16(), vec![2]);
}

/// Test: Translate indexed names
/// Given indices i=1 and j=2
/// Then "hello_$i_$j" becomes "hello_1_2"
#[test]
fn test_translate_var_name() {
    let mut vars = CaseVariables::new();
    vars.register_index("i", 1);
    vars.register_index("j", 2);

    assert_eq!(vars.translate_var_name("hello_$i_$j").as_deref(), Some("hello_1_2"));
    assert_eq!(vars.translate_var_name("no_refs").as_deref(), Some("no_refs"));
    assert_eq!(vars.translate_var_name("hello_$k"), None);
}

/// Test: Lookups go through translation
/// Given index i=3 and a value registered as "rms_$i"
/// Then it is found as "rms_3" and, while i is 3, as "rms_$i"
#[test]
fn test_lookup_uses_current_index() {
    let mut vars = CaseVariables::new();
    vars.register_index("i", 3);
    vars.register_value("rms_$i", Value::Int(9));

    assert_eq!(vars.find_value("rms_3"), Some(Value::Int(9)));
    assert_eq!(vars.find_value("rms_$i"), Some(Value::Int(9)));

    vars.update_index("i", 4);
    assert_eq!(vars.find_value("rms_$i"), None);
}

/// Test: Pattern search returns matches in name order, or nothing
#[test]
fn test_find_by_pattern() {
    let mut vars = CaseVariables::new();
    vars.set_index("i", 0);
    vars.set_index("loop", 2);
    for name in ["rec_2", "rec_0", "tone"] {
        vars.register_buffer(name, Buffer::new(0, false).into_shared());
    }

    let names: Vec<String> = vars
        .find_buffers(&Regex::new("^rec_").unwrap())
        .into_iter()
        .map(|(n, _)| n)
        .collect();
    assert_eq!(names, vec!["rec_0", "rec_2"]);

    assert!(vars.find_buffers(&Regex::new("^none$").unwrap()).is_empty());
    assert_eq!(vars.find_indices(&Regex::new("^l").unwrap()), vec![("loop".to_string(), 2)]);
}
