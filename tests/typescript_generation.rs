//! TypeScript Generation Tests
//!
//! Validates that the link's serializable types can be exported to TypeScript
//! when the tauri feature is enabled.

#[cfg(feature = "tauri")]
#[test]
fn test_core_types_implement_specta_type() {
    use specta::Type;

    // If this compiles, all types are properly configured for TypeScript export.
    fn assert_type<T: Type>() {}

    assert_type::<goose_link::UpdateRate>();
    assert_type::<goose_link::EventKind>();
    assert_type::<goose_link::TelemetryFrame>();
    assert_type::<goose_link::CommandReply>();
}

#[cfg(not(feature = "tauri"))]
#[test]
fn test_tauri_feature_disabled() {
    // Types still compile without specta::Type
    let _ = goose_link::UpdateRate::Native;
    let _ = goose_link::EventKind::Telemetry;
}
