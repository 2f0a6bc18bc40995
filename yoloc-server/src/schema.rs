//! Diesel schema definitions for the yoloc server.

diesel::table! {
    persisted_runs (key) {
        key -> Text,
        blob -> Text,
        stored_at -> Timestamp,
    }
}
