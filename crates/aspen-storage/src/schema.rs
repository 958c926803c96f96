//! Diesel schema definitions.

diesel::table! {
    devices (id) {
        id -> Text,
        identity_cert -> Nullable<Binary>,
        serial_number -> Nullable<Text>,
        topic -> Nullable<Text>,
        push_token -> Nullable<Binary>,
        push_magic -> Nullable<Text>,
        unlock_token -> Nullable<Binary>,
        authenticate_plist -> Nullable<Binary>,
        token_update_plist -> Nullable<Binary>,
        token_update_tally -> Integer,
        bootstrap_token -> Nullable<Binary>,
        enabled -> Bool,
        last_seen_at -> Timestamp,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    users (id) {
        id -> Text,
        device_id -> Text,
        user_short_name -> Nullable<Text>,
        user_long_name -> Nullable<Text>,
        topic -> Nullable<Text>,
        push_token -> Nullable<Binary>,
        push_magic -> Nullable<Text>,
        token_update_plist -> Nullable<Binary>,
        token_update_tally -> Integer,
        bootstrap_token -> Nullable<Binary>,
        enabled -> Bool,
        last_seen_at -> Timestamp,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    cert_auth_associations (id, sha256) {
        id -> Text,
        sha256 -> Text,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    commands (command_uuid) {
        command_uuid -> Text,
        request_type -> Text,
        command -> Binary,
        created_at -> Timestamp,
    }
}

diesel::table! {
    enrollment_queue (enroll_id, command_uuid) {
        enroll_id -> Text,
        command_uuid -> Text,
        status -> Nullable<Text>,
        result -> Nullable<Binary>,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::joinable!(users -> devices (device_id));
diesel::joinable!(enrollment_queue -> commands (command_uuid));

diesel::allow_tables_to_appear_in_same_query!(
    devices,
    users,
    cert_auth_associations,
    commands,
    enrollment_queue,
);
