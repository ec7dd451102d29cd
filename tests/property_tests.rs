//! Property-based tests for values, parameters and binding using proptest

use proptest::prelude::*;
use rust_db_command::backends::scripted::{Call, ScriptedConnection};
use rust_db_command::prelude::*;

// ============================================================================
// Value Read Tests
// ============================================================================

proptest! {
    /// Integers read back at every width that can hold them
    #[test]
    fn test_int_reads_widen(value in any::<i32>()) {
        let val = SqlValue::from(value);
        prop_assert_eq!(val.get::<i32>().unwrap(), value);
        prop_assert_eq!(val.get::<i64>().unwrap(), i64::from(value));
        prop_assert_eq!(val.type_name(), "int");
    }

    /// Out of range integers are rejected instead of truncated
    #[test]
    fn test_narrowing_out_of_range_fails(value in (i64::from(i32::MAX) + 1)..i64::MAX) {
        let val = SqlValue::BigInt(value);
        prop_assert!(val.get::<i32>().is_err());
        prop_assert!(val.get::<i16>().is_err());
    }

    /// Text is never read as a number
    #[test]
    fn test_numeric_text_is_not_a_number(value in any::<i64>()) {
        let val = SqlValue::from(value.to_string());
        prop_assert!(val.get::<i64>().is_err());
        prop_assert!(val.get::<f64>().is_err());
        prop_assert_eq!(val.get::<String>().unwrap(), value.to_string());
    }

    /// Null reads as None for any optional type
    #[test]
    fn test_option_maps_null(value in proptest::option::of(any::<i64>())) {
        let val = SqlValue::from(value);
        prop_assert_eq!(val.is_null(), value.is_none());
        prop_assert_eq!(val.get::<Option<i64>>().unwrap(), value);
    }

    /// Decimal text form parses back to the same value
    #[test]
    fn test_decimal_text_form(mantissa in any::<i64>(), scale in 0u8..=18) {
        let decimal = Decimal::new(i128::from(mantissa), scale);
        let parsed: Decimal = decimal.to_string().parse().unwrap();
        prop_assert_eq!(parsed, decimal);
    }
}

// ============================================================================
// Parameter Tests
// ============================================================================

proptest! {
    /// The last value given for a name wins and keeps its first position
    #[test]
    fn test_builder_last_value_wins(first in any::<i32>(), second in any::<i32>()) {
        let command = Command::text("SELECT @a, @b")
            .param("a", first)
            .param("b", 0)
            .param("a", second)
            .build();
        prop_assert_eq!(command.params().len(), 2);
        prop_assert_eq!(command.params().get("a"), Some(&SqlValue::Int(second)));
        let names: Vec<&str> = command.params().iter().map(|(name, _)| name).collect();
        prop_assert_eq!(names, vec!["a", "b"]);
    }

    /// Parameters reach the driver exactly as given
    #[test]
    fn test_parameters_reach_driver_unchanged(
        names in proptest::collection::btree_set("[a-z]{1,8}", 1..6),
        text in ".*",
    ) {
        let mut builder = Command::text("UPDATE t SET v = 1");
        for name in &names {
            builder = builder.param(name.as_str(), text.as_str());
        }
        let mut conn = ScriptedConnection::new();
        builder.build().exec(&mut conn).unwrap();

        let expected: Vec<(String, SqlValue)> = names
            .iter()
            .map(|name| (name.clone(), SqlValue::String(text.clone())))
            .collect();
        prop_assert_eq!(
            conn.calls(),
            &[Call::Execute("UPDATE t SET v = 1".to_string(), expected)]
        );
    }
}

// ============================================================================
// SQLite Binding Tests
// ============================================================================

#[cfg(feature = "sqlite")]
proptest! {
    /// Strings bind as TEXT and integers as INTEGER, whatever their content
    #[test]
    fn test_sqlite_binding_keeps_kind(value in any::<i64>()) {
        use rust_db_command::backends::sqlite::to_sqlite_value;
        use rusqlite::types::Value;

        prop_assert_eq!(to_sqlite_value(&SqlValue::from(value)), Value::Integer(value));
        prop_assert_eq!(
            to_sqlite_value(&SqlValue::from(value.to_string())),
            Value::Text(value.to_string())
        );
    }

    /// Text survives a trip through SQLite byte for byte
    #[test]
    fn test_sqlite_text_round_trip(text in "\\PC*") {
        let mut conn = SqliteConnection::open_in_memory().unwrap();
        let read: String = Command::text("SELECT @v")
            .param("v", text.as_str())
            .build()
            .scalar(&mut conn)
            .unwrap();
        prop_assert_eq!(read, text);
    }
}
