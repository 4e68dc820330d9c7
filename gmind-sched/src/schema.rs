diesel::table! {
    scheduled_commands (id) {
        id -> Integer,
        greenhouse_id -> Text,
        field_index -> Integer,
        device -> Text,
        action -> Text,
        scheduled_time -> Timestamp,
        executed -> Bool,
    }
}
