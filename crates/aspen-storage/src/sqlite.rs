//! SQLite storage implementation.

use color_eyre::eyre::WrapErr as _;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::sqlite::SqliteConnection;

use aspen_core::{
    Authenticate, BootstrapToken, Command, CommandResults, EnrollId, EnrollType, Error, PushInfo,
    PushInfoError, Request, SetBootstrapToken, TokenUpdate,
};

use crate::models::*;
use crate::schema::*;
use crate::traits::*;

type SqlitePool = Pool<ConnectionManager<SqliteConnection>>;
type SqlitePooled = PooledConnection<ConnectionManager<SqliteConnection>>;

/// Diesel-backed relational storage.
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a new storage from a database URL.
    pub fn new(database_url: &str) -> color_eyre::eyre::Result<Self> {
        let manager = ConnectionManager::<SqliteConnection>::new(database_url);
        let pool = Pool::builder()
            .max_size(10)
            .build(manager)
            .wrap_err("failed to create connection pool")?;

        Ok(Self { pool })
    }

    /// Run pending migrations.
    pub fn run_migrations(&self) -> color_eyre::eyre::Result<()> {
        use diesel_migrations::MigrationHarness as _;

        let mut conn = self
            .pool
            .get()
            .wrap_err("failed to get connection for migrations")?;

        conn.run_pending_migrations(crate::MIGRATIONS)
            .map_err(|e| color_eyre::eyre::eyre!("migration failed: {}", e))?;

        Ok(())
    }

    fn conn(&self) -> color_eyre::eyre::Result<SqlitePooled> {
        self.pool
            .get()
            .wrap_err("failed to get database connection")
    }
}

fn now() -> chrono::NaiveDateTime {
    chrono::Utc::now().naive_utc()
}

/// Refresh `last_seen_at` on the enrollment's row.
fn touch_last_seen(
    conn: &mut SqliteConnection,
    id: &EnrollId,
) -> diesel::QueryResult<()> {
    let ts = now();
    if id.parent_id.is_some() {
        diesel::update(users::table.filter(users::id.eq(&id.id)))
            .set(users::last_seen_at.eq(ts))
            .execute(conn)?;
    } else {
        diesel::update(devices::table.filter(devices::id.eq(&id.id)))
            .set(devices::last_seen_at.eq(ts))
            .execute(conn)?;
    }
    Ok(())
}

fn require_device(conn: &mut SqliteConnection, device_id: &str) -> color_eyre::eyre::Result<()> {
    let count: i64 = devices::table
        .filter(devices::id.eq(device_id))
        .count()
        .get_result(conn)?;
    if count == 0 {
        return Err(Error::InvalidEnrollment(format!(
            "user channel has no device enrollment {device_id}"
        ))
        .into());
    }
    Ok(())
}

impl CheckinStore for SqliteStorage {
    fn store_authenticate(
        &self,
        req: &Request,
        msg: &Authenticate,
    ) -> color_eyre::eyre::Result<()> {
        let id = req.enroll_id()?;
        id.validate()?;
        let mut conn = self.conn()?;
        let ts = now();

        conn.transaction::<_, color_eyre::eyre::Report, _>(|conn| {
            match &id.parent_id {
                Some(parent) => {
                    require_device(conn, parent)?;
                    let new_user = NewUser {
                        id: &id.id,
                        device_id: parent,
                        user_short_name: msg.enrollment.user_short_name.as_deref(),
                        user_long_name: msg.enrollment.user_long_name.as_deref(),
                        topic: Some(&msg.topic),
                        push_token: None,
                        push_magic: None,
                        token_update_plist: None,
                        token_update_tally: 0,
                        enabled: false,
                        last_seen_at: ts,
                        created_at: ts,
                        updated_at: ts,
                    };
                    diesel::insert_into(users::table)
                        .values(&new_user)
                        .on_conflict(users::id)
                        .do_update()
                        .set((
                            users::user_short_name
                                .eq(msg.enrollment.user_short_name.as_deref()),
                            users::user_long_name.eq(msg.enrollment.user_long_name.as_deref()),
                            users::topic.eq(&msg.topic),
                            users::last_seen_at.eq(ts),
                            users::updated_at.eq(ts),
                        ))
                        .execute(conn)?;
                }
                None => {
                    let new_device = NewDevice {
                        id: &id.id,
                        identity_cert: req.certificate.as_deref(),
                        serial_number: msg.serial_number.as_deref(),
                        topic: Some(&msg.topic),
                        push_token: None,
                        push_magic: None,
                        unlock_token: None,
                        authenticate_plist: Some(&msg.raw),
                        token_update_plist: None,
                        token_update_tally: 0,
                        enabled: false,
                        last_seen_at: ts,
                        created_at: ts,
                        updated_at: ts,
                    };
                    diesel::insert_into(devices::table)
                        .values(&new_device)
                        .on_conflict(devices::id)
                        .do_update()
                        .set((
                            devices::identity_cert.eq(req.certificate.as_deref()),
                            devices::serial_number.eq(msg.serial_number.as_deref()),
                            devices::topic.eq(&msg.topic),
                            devices::authenticate_plist.eq(Some(msg.raw.as_slice())),
                            devices::last_seen_at.eq(ts),
                            devices::updated_at.eq(ts),
                        ))
                        .execute(conn)?;
                }
            }
            Ok(())
        })
        .wrap_err("failed to store authenticate")
    }

    fn store_token_update(
        &self,
        req: &Request,
        msg: &TokenUpdate,
    ) -> color_eyre::eyre::Result<()> {
        let id = req.enroll_id()?;
        id.validate()?;
        let mut conn = self.conn()?;
        let ts = now();

        conn.transaction::<_, color_eyre::eyre::Report, _>(|conn| {
            match &id.parent_id {
                Some(parent) => {
                    require_device(conn, parent)?;
                    let new_user = NewUser {
                        id: &id.id,
                        device_id: parent,
                        user_short_name: msg.enrollment.user_short_name.as_deref(),
                        user_long_name: msg.enrollment.user_long_name.as_deref(),
                        topic: Some(&msg.topic),
                        push_token: Some(&msg.token),
                        push_magic: Some(&msg.push_magic),
                        token_update_plist: Some(&msg.raw),
                        token_update_tally: 1,
                        enabled: true,
                        last_seen_at: ts,
                        created_at: ts,
                        updated_at: ts,
                    };
                    diesel::insert_into(users::table)
                        .values(&new_user)
                        .on_conflict(users::id)
                        .do_update()
                        .set((
                            users::topic.eq(&msg.topic),
                            users::push_token.eq(Some(msg.token.as_slice())),
                            users::push_magic.eq(&msg.push_magic),
                            users::token_update_plist.eq(Some(msg.raw.as_slice())),
                            users::token_update_tally.eq(users::token_update_tally + 1),
                            users::enabled.eq(true),
                            users::last_seen_at.eq(ts),
                            users::updated_at.eq(ts),
                        ))
                        .execute(conn)?;
                }
                None => {
                    let new_device = NewDevice {
                        id: &id.id,
                        identity_cert: req.certificate.as_deref(),
                        serial_number: None,
                        topic: Some(&msg.topic),
                        push_token: Some(&msg.token),
                        push_magic: Some(&msg.push_magic),
                        unlock_token: msg.unlock_token.as_deref(),
                        authenticate_plist: None,
                        token_update_plist: Some(&msg.raw),
                        token_update_tally: 1,
                        enabled: true,
                        last_seen_at: ts,
                        created_at: ts,
                        updated_at: ts,
                    };
                    diesel::insert_into(devices::table)
                        .values(&new_device)
                        .on_conflict(devices::id)
                        .do_update()
                        .set((
                            devices::topic.eq(&msg.topic),
                            devices::push_token.eq(Some(msg.token.as_slice())),
                            devices::push_magic.eq(&msg.push_magic),
                            devices::unlock_token.eq(msg.unlock_token.as_deref()),
                            devices::token_update_plist.eq(Some(msg.raw.as_slice())),
                            devices::token_update_tally.eq(devices::token_update_tally + 1),
                            devices::enabled.eq(true),
                            devices::last_seen_at.eq(ts),
                            devices::updated_at.eq(ts),
                        ))
                        .execute(conn)?;
                }
            }

            // Trust-on-first-use: commit the cert binding together
            // with the enablement. Keyed on the device channel,
            // which both channels' certs identify.
            if let Some(cert) = &req.certificate {
                let auth_id = id.device_channel();
                let bound: i64 = cert_auth_associations::table
                    .filter(cert_auth_associations::id.eq(&auth_id.id))
                    .count()
                    .get_result(conn)?;
                if bound == 0 {
                    let hash = aspen_crypto::cert_hash(cert);
                    let association = NewCertAuthAssociation {
                        id: &auth_id.id,
                        sha256: &hash,
                        created_at: ts,
                        updated_at: ts,
                    };
                    diesel::insert_into(cert_auth_associations::table)
                        .values(&association)
                        .on_conflict((
                            cert_auth_associations::id,
                            cert_auth_associations::sha256,
                        ))
                        .do_update()
                        .set(cert_auth_associations::updated_at.eq(ts))
                        .execute(conn)?;
                }
            }
            Ok(())
        })
        .wrap_err("failed to store token update")
    }

    fn disable(&self, req: &Request) -> color_eyre::eyre::Result<()> {
        let id = req.enroll_id()?;
        let mut conn = self.conn()?;
        let ts = now();

        conn.transaction::<_, color_eyre::eyre::Report, _>(|conn| {
            if id.parent_id.is_some() {
                diesel::update(users::table.filter(users::id.eq(&id.id)))
                    .set((users::enabled.eq(false), users::updated_at.eq(ts)))
                    .execute(conn)?;
            } else {
                diesel::update(devices::table.filter(devices::id.eq(&id.id)))
                    .set((devices::enabled.eq(false), devices::updated_at.eq(ts)))
                    .execute(conn)?;
                diesel::update(users::table.filter(users::device_id.eq(&id.id)))
                    .set((users::enabled.eq(false), users::updated_at.eq(ts)))
                    .execute(conn)?;
            }
            Ok(())
        })
        .wrap_err("failed to disable enrollment")
    }

    fn store_bootstrap_token(
        &self,
        req: &Request,
        msg: &SetBootstrapToken,
    ) -> color_eyre::eyre::Result<()> {
        let id = req.enroll_id()?;
        let mut conn = self.conn()?;
        let ts = now();

        let affected = if id.parent_id.is_some() {
            diesel::update(users::table.filter(users::id.eq(&id.id)))
                .set((
                    users::bootstrap_token.eq(Some(msg.bootstrap_token.as_slice())),
                    users::last_seen_at.eq(ts),
                    users::updated_at.eq(ts),
                ))
                .execute(&mut conn)
        } else {
            diesel::update(devices::table.filter(devices::id.eq(&id.id)))
                .set((
                    devices::bootstrap_token.eq(Some(msg.bootstrap_token.as_slice())),
                    devices::last_seen_at.eq(ts),
                    devices::updated_at.eq(ts),
                ))
                .execute(&mut conn)
        }
        .wrap_err("failed to store bootstrap token")?;

        if affected == 0 {
            return Err(Error::InvalidEnrollment(format!("no enrollment {id}")).into());
        }
        Ok(())
    }

    fn retrieve_bootstrap_token(
        &self,
        req: &Request,
    ) -> color_eyre::eyre::Result<Option<BootstrapToken>> {
        let id = req.enroll_id()?;
        let mut conn = self.conn()?;

        let token: Option<Option<Vec<u8>>> = if id.parent_id.is_some() {
            users::table
                .filter(users::id.eq(&id.id))
                .select(users::bootstrap_token)
                .first(&mut conn)
                .optional()
        } else {
            devices::table
                .filter(devices::id.eq(&id.id))
                .select(devices::bootstrap_token)
                .first(&mut conn)
                .optional()
        }
        .wrap_err("failed to retrieve bootstrap token")?;

        Ok(token
            .flatten()
            .map(|bootstrap_token| BootstrapToken { bootstrap_token }))
    }
}

impl CommandStore for SqliteStorage {
    fn store_command_report(
        &self,
        req: &Request,
        results: &CommandResults,
    ) -> color_eyre::eyre::Result<()> {
        let id = req.enroll_id()?;
        let mut conn = self.conn()?;

        conn.transaction::<_, color_eyre::eyre::Report, _>(|conn| {
            touch_last_seen(conn, id)?;
            if !results.command_uuid.is_empty() {
                diesel::update(
                    enrollment_queue::table
                        .filter(enrollment_queue::enroll_id.eq(&id.id))
                        .filter(enrollment_queue::command_uuid.eq(&results.command_uuid)),
                )
                .set((
                    enrollment_queue::status.eq(results.status.to_string()),
                    enrollment_queue::result.eq(Some(results.raw.as_slice())),
                    enrollment_queue::updated_at.eq(now()),
                ))
                .execute(conn)?;
            }
            Ok(())
        })
        .wrap_err("failed to store command report")
    }

    fn retrieve_next_command(
        &self,
        req: &Request,
        skip_not_now: bool,
    ) -> color_eyre::eyre::Result<Option<Command>> {
        let id = req.enroll_id()?;
        let mut conn = self.conn()?;

        let mut query = enrollment_queue::table
            .inner_join(commands::table)
            .select((
                commands::command_uuid,
                commands::request_type,
                commands::command,
            ))
            .filter(enrollment_queue::enroll_id.eq(&id.id))
            .order(enrollment_queue::created_at.asc())
            .into_boxed();

        query = if skip_not_now {
            query.filter(enrollment_queue::status.is_null())
        } else {
            query.filter(
                enrollment_queue::status
                    .is_null()
                    .or(enrollment_queue::status.eq("NotNow")),
            )
        };

        let row: Option<(String, String, Vec<u8>)> = query
            .first(&mut conn)
            .optional()
            .wrap_err("failed to retrieve next command")?;

        Ok(row.map(|(command_uuid, request_type, raw)| Command {
            command_uuid,
            request_type,
            raw,
        }))
    }

    fn clear_queue(&self, req: &Request) -> color_eyre::eyre::Result<()> {
        let id = req.enroll_id()?;
        let mut conn = self.conn()?;

        // One statement so device and user-channel entries go
        // together.
        diesel::delete(
            enrollment_queue::table.filter(
                enrollment_queue::enroll_id.eq(&id.id).or(
                    enrollment_queue::enroll_id.eq_any(
                        users::table
                            .filter(users::device_id.eq(&id.id))
                            .select(users::id),
                    ),
                ),
            ),
        )
        .execute(&mut conn)
        .wrap_err("failed to clear command queue")?;

        Ok(())
    }

    fn enqueue_command(
        &self,
        ids: &[EnrollId],
        command: &Command,
    ) -> color_eyre::eyre::Result<()> {
        let mut conn = self.conn()?;
        let ts = now();

        conn.transaction::<_, color_eyre::eyre::Report, _>(|conn| {
            let new_command = NewCommandRow {
                command_uuid: &command.command_uuid,
                request_type: &command.request_type,
                command: &command.raw,
                created_at: ts,
            };
            diesel::insert_into(commands::table)
                .values(&new_command)
                .on_conflict(commands::command_uuid)
                .do_nothing()
                .execute(conn)?;

            for id in ids {
                id.validate()?;
                let entry = NewQueueEntry {
                    enroll_id: &id.id,
                    command_uuid: &command.command_uuid,
                    created_at: ts,
                    updated_at: ts,
                };
                diesel::insert_into(enrollment_queue::table)
                    .values(&entry)
                    .execute(conn)?;
            }
            Ok(())
        })
        .wrap_err("failed to enqueue command")
    }
}

impl CertAuthStore for SqliteStorage {
    fn has_cert_hash(&self, _req: &Request, hash: &str) -> color_eyre::eyre::Result<bool> {
        let mut conn = self.conn()?;
        let count: i64 = cert_auth_associations::table
            .filter(cert_auth_associations::sha256.eq(hash.to_lowercase()))
            .count()
            .get_result(&mut conn)
            .wrap_err("failed to check cert hash")?;
        Ok(count > 0)
    }

    fn enrollment_has_cert_hash(&self, req: &Request) -> color_eyre::eyre::Result<bool> {
        let id = req.enroll_id()?;
        let mut conn = self.conn()?;
        let count: i64 = cert_auth_associations::table
            .filter(cert_auth_associations::id.eq(&id.id))
            .count()
            .get_result(&mut conn)
            .wrap_err("failed to check enrollment cert hash")?;
        Ok(count > 0)
    }

    fn is_cert_hash_associated(
        &self,
        req: &Request,
        hash: &str,
    ) -> color_eyre::eyre::Result<bool> {
        let id = req.enroll_id()?;
        let mut conn = self.conn()?;
        let count: i64 = cert_auth_associations::table
            .filter(cert_auth_associations::id.eq(&id.id))
            .filter(cert_auth_associations::sha256.eq(hash.to_lowercase()))
            .count()
            .get_result(&mut conn)
            .wrap_err("failed to check cert association")?;
        Ok(count > 0)
    }

    fn associate_cert_hash(&self, req: &Request, hash: &str) -> color_eyre::eyre::Result<()> {
        let id = req.enroll_id()?;
        let mut conn = self.conn()?;
        let ts = now();
        let hash = hash.to_lowercase();

        let association = NewCertAuthAssociation {
            id: &id.id,
            sha256: &hash,
            created_at: ts,
            updated_at: ts,
        };
        diesel::insert_into(cert_auth_associations::table)
            .values(&association)
            .on_conflict((cert_auth_associations::id, cert_auth_associations::sha256))
            .do_update()
            .set(cert_auth_associations::updated_at.eq(ts))
            .execute(&mut conn)
            .wrap_err("failed to associate cert hash")?;

        Ok(())
    }

    fn enrollment_from_hash(&self, hash: &str) -> color_eyre::eyre::Result<Option<String>> {
        let mut conn = self.conn()?;
        cert_auth_associations::table
            .filter(cert_auth_associations::sha256.eq(hash.to_lowercase()))
            .select(cert_auth_associations::id)
            .first(&mut conn)
            .optional()
            .wrap_err("failed to look up enrollment from hash")
    }

    fn retire_cert_hashes(
        &self,
        req: &Request,
        keep_hash: &str,
    ) -> color_eyre::eyre::Result<()> {
        let id = req.enroll_id()?;
        let mut conn = self.conn()?;

        diesel::delete(
            cert_auth_associations::table
                .filter(cert_auth_associations::id.eq(&id.id))
                .filter(cert_auth_associations::sha256.ne(keep_hash.to_lowercase())),
        )
        .execute(&mut conn)
        .wrap_err("failed to retire cert hashes")?;

        Ok(())
    }
}

impl PushStore for SqliteStorage {
    fn retrieve_push_info(&self, ids: &[EnrollId]) -> color_eyre::eyre::Result<PushInfoLookup> {
        let wanted: Vec<&str> = ids.iter().map(|id| id.id.as_str()).collect();
        let mut conn = self.conn()?;

        let mut rows: Vec<PushRow> = devices::table
            .filter(devices::id.eq_any(&wanted))
            .select((
                devices::id,
                devices::topic,
                devices::push_token,
                devices::push_magic,
                devices::enabled,
            ))
            .load(&mut conn)
            .wrap_err("failed to load device push info")?;
        rows.extend(
            users::table
                .filter(users::id.eq_any(&wanted))
                .select((
                    users::id,
                    users::topic,
                    users::push_token,
                    users::push_magic,
                    users::enabled,
                ))
                .load::<PushRow>(&mut conn)
                .wrap_err("failed to load user push info")?,
        );

        let mut lookup = PushInfoLookup::new();
        for row in rows {
            let result = if !row.enabled {
                Err(PushInfoError::NotEnabled)
            } else {
                match (row.push_token, row.push_magic, row.topic) {
                    (Some(token), Some(push_magic), Some(topic)) => Ok(PushInfo {
                        token,
                        push_magic,
                        topic,
                    }),
                    _ => Err(PushInfoError::MissingToken),
                }
            };
            lookup.insert(row.id, result);
        }
        for id in ids {
            lookup
                .entry(id.id.clone())
                .or_insert(Err(PushInfoError::NotFound));
        }
        Ok(lookup)
    }
}

impl MigrationStore for SqliteStorage {
    fn retrieve_migration_checkins(
        &self,
        sink: &mut MigrationSink<'_>,
    ) -> color_eyre::eyre::Result<()> {
        let mut conn = self.conn()?;

        let device_rows: Vec<DeviceCheckinRow> = devices::table
            .order(devices::id.asc())
            .select((
                devices::id,
                devices::authenticate_plist,
                devices::token_update_plist,
            ))
            .load(&mut conn)
            .wrap_err("failed to load device check-ins")?;

        let user_rows: Vec<UserCheckinRow> = users::table
            .order((users::device_id.asc(), users::id.asc()))
            .select((users::id, users::device_id, users::token_update_plist))
            .load(&mut conn)
            .wrap_err("failed to load user check-ins")?;

        for device in &device_rows {
            let id = EnrollId {
                enroll_type: EnrollType::Device,
                id: device.id.clone(),
                parent_id: None,
            };
            for raw in [&device.authenticate_plist, &device.token_update_plist] {
                if let Some(raw) = raw {
                    sink(MigrationCheckin {
                        enroll_id: id.clone(),
                        raw: raw.clone(),
                    })?;
                }
            }
            for user in user_rows.iter().filter(|u| u.device_id == device.id) {
                if let Some(raw) = &user.token_update_plist {
                    sink(MigrationCheckin {
                        enroll_id: EnrollId {
                            enroll_type: EnrollType::User,
                            id: user.id.clone(),
                            parent_id: Some(user.device_id.clone()),
                        },
                        raw: raw.clone(),
                    })?;
                }
            }
        }
        Ok(())
    }
}
