//! Database models.

use diesel::prelude::*;

use crate::schema::{cert_auth_associations, commands, devices, enrollment_queue, users};

/// Device enrollment for insertion.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = devices)]
pub struct NewDevice<'a> {
    pub id: &'a str,
    pub identity_cert: Option<&'a [u8]>,
    pub serial_number: Option<&'a str>,
    pub topic: Option<&'a str>,
    pub push_token: Option<&'a [u8]>,
    pub push_magic: Option<&'a str>,
    pub unlock_token: Option<&'a [u8]>,
    pub authenticate_plist: Option<&'a [u8]>,
    pub token_update_plist: Option<&'a [u8]>,
    pub token_update_tally: i32,
    pub enabled: bool,
    pub last_seen_at: chrono::NaiveDateTime,
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: chrono::NaiveDateTime,
}

/// User-channel enrollment for insertion.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser<'a> {
    pub id: &'a str,
    pub device_id: &'a str,
    pub user_short_name: Option<&'a str>,
    pub user_long_name: Option<&'a str>,
    pub topic: Option<&'a str>,
    pub push_token: Option<&'a [u8]>,
    pub push_magic: Option<&'a str>,
    pub token_update_plist: Option<&'a [u8]>,
    pub token_update_tally: i32,
    pub enabled: bool,
    pub last_seen_at: chrono::NaiveDateTime,
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: chrono::NaiveDateTime,
}

/// Cert-hash association for insertion.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = cert_auth_associations)]
pub struct NewCertAuthAssociation<'a> {
    pub id: &'a str,
    pub sha256: &'a str,
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: chrono::NaiveDateTime,
}

/// Command body for insertion.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = commands)]
pub struct NewCommandRow<'a> {
    pub command_uuid: &'a str,
    pub request_type: &'a str,
    pub command: &'a [u8],
    pub created_at: chrono::NaiveDateTime,
}

/// Queue entry for insertion.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = enrollment_queue)]
pub struct NewQueueEntry<'a> {
    pub enroll_id: &'a str,
    pub command_uuid: &'a str,
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: chrono::NaiveDateTime,
}

/// Push-info projection of an enrollment row.
#[derive(Debug, Clone, Queryable)]
pub struct PushRow {
    pub id: String,
    pub topic: Option<String>,
    pub push_token: Option<Vec<u8>>,
    pub push_magic: Option<String>,
    pub enabled: bool,
}

/// Migration projection of a device row.
#[derive(Debug, Clone, Queryable)]
pub struct DeviceCheckinRow {
    pub id: String,
    pub authenticate_plist: Option<Vec<u8>>,
    pub token_update_plist: Option<Vec<u8>>,
}

/// Migration projection of a user row.
#[derive(Debug, Clone, Queryable)]
pub struct UserCheckinRow {
    pub id: String,
    pub device_id: String,
    pub token_update_plist: Option<Vec<u8>>,
}
