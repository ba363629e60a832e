use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use futures_util::TryStreamExt;
use sqlx::{FromRow, MySqlConnection, MySqlPool};
use tracing::debug;

use super::{Store, StoreError, StoreResult};
use crate::model::{
    attendance::{
        Attendance, AttendanceFilter, AttendanceId, AttendanceResponse, NewAttendance, ShiftSlot,
    },
    device::{Device, DeviceId},
    permission::{Permission, PermissionEntry},
    role::{Role, RoleId},
    shift::Shift,
    user::{NewUser, User, UserId},
};
use crate::models::{PageRequest, Paged};

const USER_COLUMNS: &str = "id, username, rfid_code, full_name, role_id";
const ATTENDANCE_COLUMNS: &str =
    "id, user_id, date, shift, location, time_in, time_out, on_time";

pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct RoleRow {
    id: RoleId,
    name: String,
}

#[derive(FromRow)]
struct AttendanceRow {
    id: AttendanceId,
    user_id: UserId,
    date: NaiveDate,
    shift: String,
    location: String,
    time_in: NaiveTime,
    time_out: Option<NaiveTime>,
    on_time: bool,
}

impl TryFrom<AttendanceRow> for Attendance {
    type Error = StoreError;

    fn try_from(row: AttendanceRow) -> Result<Self, Self::Error> {
        Ok(Attendance {
            id: row.id,
            user_id: row.user_id,
            date: row.date,
            shift: parse_shift(&row.shift)?,
            location: row.location,
            time_in: row.time_in,
            time_out: row.time_out,
            on_time: row.on_time,
        })
    }
}

#[derive(FromRow)]
struct AttendanceResponseRow {
    id: AttendanceId,
    rfid_code: String,
    full_name: String,
    username: String,
    date: NaiveDate,
    shift: String,
    location: String,
    time_in: NaiveTime,
    time_out: Option<NaiveTime>,
    on_time: bool,
}

impl TryFrom<AttendanceResponseRow> for AttendanceResponse {
    type Error = StoreError;

    fn try_from(row: AttendanceResponseRow) -> Result<Self, Self::Error> {
        Ok(AttendanceResponse {
            id: row.id,
            rfid_code: row.rfid_code,
            full_name: row.full_name,
            username: row.username,
            date: row.date,
            shift: parse_shift(&row.shift)?,
            location: row.location,
            time_in: row.time_in,
            time_out: row.time_out,
            on_time: row.on_time,
        })
    }
}

// Helper enum for typed SQLx binding
enum FilterValue {
    Date(NaiveDate),
    Str(String),
}

fn parse_shift(value: &str) -> StoreResult<Shift> {
    value
        .parse()
        .map_err(|_| StoreError::Corrupt(format!("unknown shift '{value}'")))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation())
}

const LIKE_ESCAPE: char = '!';

/// `LIKE` pattern matching `text` anywhere, with wildcards in `text` taken
/// literally. Pair with `ESCAPE '!'`.
fn contains_pattern(text: &str) -> String {
    let mut pattern = String::with_capacity(text.len() + 2);
    pattern.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_') || c == LIKE_ESCAPE {
            pattern.push(LIKE_ESCAPE);
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn permissions_from_ids(ids: impl IntoIterator<Item = u32>) -> StoreResult<BTreeSet<Permission>> {
    ids.into_iter()
        .map(|id| {
            Permission::from_id(id)
                .ok_or_else(|| StoreError::Corrupt(format!("unknown permission id {id}")))
        })
        .collect()
}

/// Reads a role and its permissions on one connection. Callers wrap this in a
/// transaction so both reads come from the same snapshot.
async fn load_role(conn: &mut MySqlConnection, id: RoleId) -> StoreResult<Option<Role>> {
    let row = sqlx::query_as::<_, RoleRow>("SELECT id, name FROM roles WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let permission_ids = sqlx::query_scalar::<_, u32>(
        "SELECT permission_id FROM role_permissions WHERE role_id = ?",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(Some(Role {
        id: row.id,
        name: row.name,
        permissions: permissions_from_ids(permission_ids)?,
    }))
}

async fn lock_role(conn: &mut MySqlConnection, id: RoleId) -> StoreResult<()> {
    sqlx::query_scalar::<_, RoleId>("SELECT id FROM roles WHERE id = ? FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .map(|_| ())
        .ok_or_else(|| StoreError::not_found("role", id))
}

async fn load_attendance(
    conn: &mut MySqlConnection,
    id: AttendanceId,
) -> StoreResult<Option<Attendance>> {
    let sql = format!("SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE id = ?");
    sqlx::query_as::<_, AttendanceRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .map(Attendance::try_from)
        .transpose()
}

#[async_trait]
impl Store for MySqlStore {
    async fn ensure_permission_catalog(&self, entries: &[PermissionEntry]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        for entry in entries {
            sqlx::query("INSERT IGNORE INTO permissions (id, name) VALUES (?, ?)")
                .bind(entry.id)
                .bind(&entry.name)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        debug!(count = entries.len(), "Permission catalog synchronised");
        Ok(())
    }

    async fn list_roles(&self, name: Option<&str>, page: PageRequest) -> StoreResult<Paged<Role>> {
        let where_sql = if name.is_some() {
            " WHERE LOWER(name) LIKE LOWER(?) ESCAPE '!'"
        } else {
            ""
        };

        let mut tx = self.pool.begin().await?;

        let count_sql = format!("SELECT COUNT(*) FROM roles{where_sql}");
        let mut count_q = sqlx::query_scalar::<_, i64>(&count_sql);
        let pattern = name.map(contains_pattern);
        if let Some(pattern) = &pattern {
            count_q = count_q.bind(pattern.as_str());
        }
        let total = count_q.fetch_one(&mut *tx).await?;

        let data_sql = format!("SELECT id, name FROM roles{where_sql} ORDER BY id LIMIT ? OFFSET ?");
        let mut data_q = sqlx::query_as::<_, RoleRow>(&data_sql);
        if let Some(pattern) = &pattern {
            data_q = data_q.bind(pattern.as_str());
        }
        let rows = data_q
            .bind(page.size as i64)
            .bind(page.offset() as i64)
            .fetch_all(&mut *tx)
            .await?;

        let mut grants: BTreeMap<RoleId, Vec<u32>> = BTreeMap::new();
        if !rows.is_empty() {
            let grant_sql = format!(
                "SELECT role_id, permission_id FROM role_permissions WHERE role_id IN ({})",
                placeholders(rows.len())
            );
            let mut grant_q = sqlx::query_as::<_, (RoleId, u32)>(&grant_sql);
            for row in &rows {
                grant_q = grant_q.bind(row.id);
            }
            for (role_id, permission_id) in grant_q.fetch_all(&mut *tx).await? {
                grants.entry(role_id).or_default().push(permission_id);
            }
        }
        tx.commit().await?;

        let data = rows
            .into_iter()
            .map(|row| -> StoreResult<Role> {
                Ok(Role {
                    permissions: permissions_from_ids(grants.remove(&row.id).unwrap_or_default())?,
                    id: row.id,
                    name: row.name,
                })
            })
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(Paged {
            data,
            page: page.page,
            size: page.size,
            total: total.max(0) as u64,
        })
    }

    async fn get_role(&self, id: RoleId) -> StoreResult<Option<Role>> {
        let mut tx = self.pool.begin().await?;
        let role = load_role(&mut tx, id).await?;
        tx.commit().await?;
        Ok(role)
    }

    async fn find_role_by_name(&self, name: &str) -> StoreResult<Option<Role>> {
        let mut tx = self.pool.begin().await?;
        let id = sqlx::query_scalar::<_, RoleId>("SELECT id FROM roles WHERE name = ?")
            .bind(name)
            .fetch_optional(&mut *tx)
            .await?;
        let role = match id {
            Some(id) => load_role(&mut tx, id).await?,
            None => None,
        };
        tx.commit().await?;
        Ok(role)
    }

    async fn insert_role(&self, name: &str, permissions: &BTreeSet<Permission>) -> StoreResult<Role> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("INSERT INTO roles (name) VALUES (?)")
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::Conflict(format!("role name '{name}' already exists"))
                } else {
                    StoreError::Database(e)
                }
            })?;
        let id = result.last_insert_id() as RoleId;

        for permission in permissions {
            sqlx::query("INSERT INTO role_permissions (role_id, permission_id) VALUES (?, ?)")
                .bind(id)
                .bind(permission.id())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        Ok(Role {
            id,
            name: name.to_string(),
            permissions: permissions.clone(),
        })
    }

    async fn rename_role(&self, id: RoleId, name: &str) -> StoreResult<Role> {
        let mut tx = self.pool.begin().await?;
        lock_role(&mut tx, id).await?;

        sqlx::query("UPDATE roles SET name = ? WHERE id = ?")
            .bind(name)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::Conflict(format!("role name '{name}' already exists"))
                } else {
                    StoreError::Database(e)
                }
            })?;

        let role = load_role(&mut tx, id)
            .await?
            .ok_or_else(|| StoreError::not_found("role", id))?;
        tx.commit().await?;
        Ok(role)
    }

    async fn delete_role(&self, id: RoleId) -> StoreResult<Option<u64>> {
        let mut tx = self.pool.begin().await?;

        let detached = sqlx::query("UPDATE users SET role_id = NULL WHERE role_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        sqlx::query("DELETE FROM role_permissions WHERE role_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let deleted = sqlx::query("DELETE FROM roles WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if deleted == 0 {
            tx.rollback().await?;
            return Ok(None);
        }
        tx.commit().await?;
        Ok(Some(detached))
    }

    async fn add_role_permissions(
        &self,
        id: RoleId,
        permissions: &BTreeSet<Permission>,
    ) -> StoreResult<Role> {
        let mut tx = self.pool.begin().await?;
        lock_role(&mut tx, id).await?;

        for permission in permissions {
            sqlx::query("INSERT IGNORE INTO role_permissions (role_id, permission_id) VALUES (?, ?)")
                .bind(id)
                .bind(permission.id())
                .execute(&mut *tx)
                .await?;
        }

        let role = load_role(&mut tx, id)
            .await?
            .ok_or_else(|| StoreError::not_found("role", id))?;
        tx.commit().await?;
        Ok(role)
    }

    async fn remove_role_permissions(
        &self,
        id: RoleId,
        permissions: &BTreeSet<Permission>,
    ) -> StoreResult<Role> {
        let mut tx = self.pool.begin().await?;
        lock_role(&mut tx, id).await?;

        for permission in permissions {
            sqlx::query("DELETE FROM role_permissions WHERE role_id = ? AND permission_id = ?")
                .bind(id)
                .bind(permission.id())
                .execute(&mut *tx)
                .await?;
        }

        let role = load_role(&mut tx, id)
            .await?
            .ok_or_else(|| StoreError::not_found("role", id))?;
        tx.commit().await?;
        Ok(role)
    }

    async fn insert_user(&self, user: NewUser) -> StoreResult<User> {
        let result = sqlx::query(
            "INSERT INTO users (username, rfid_code, full_name, role_id) VALUES (?, ?, ?, ?)",
        )
        .bind(&user.username)
        .bind(&user.rfid_code)
        .bind(&user.full_name)
        .bind(user.role_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict(format!(
                    "username '{}' or RFID code '{}' is already registered",
                    user.username, user.rfid_code
                ))
            } else if is_foreign_key_violation(&e) {
                StoreError::not_found("role", user.role_id.unwrap_or_default())
            } else {
                StoreError::Database(e)
            }
        })?;

        Ok(User {
            id: result.last_insert_id(),
            username: user.username,
            rfid_code: user.rfid_code,
            full_name: user.full_name,
            role_id: user.role_id,
        })
    }

    async fn get_user(&self, id: UserId) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_user_by_rfid(&self, rfid_code: &str) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE rfid_code = ?");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(rfid_code)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn set_user_role(&self, id: UserId, role_id: Option<RoleId>) -> StoreResult<User> {
        sqlx::query("UPDATE users SET role_id = ? WHERE id = ?")
            .bind(role_id)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    StoreError::not_found("role", role_id.unwrap_or_default())
                } else {
                    StoreError::Database(e)
                }
            })?;

        self.get_user(id)
            .await?
            .ok_or_else(|| StoreError::not_found("user", id))
    }

    async fn list_rfid_codes(&self) -> StoreResult<Vec<String>> {
        let mut stream = sqlx::query_scalar::<_, String>("SELECT rfid_code FROM users").fetch(&self.pool);

        let mut codes = Vec::new();
        while let Some(code) = stream.try_next().await? {
            codes.push(code);
        }
        Ok(codes)
    }

    async fn insert_device(&self, location: &str) -> StoreResult<Device> {
        let result = sqlx::query("INSERT INTO devices (location) VALUES (?)")
            .bind(location)
            .execute(&self.pool)
            .await?;

        Ok(Device {
            id: result.last_insert_id(),
            location: location.to_string(),
        })
    }

    async fn get_device(&self, id: DeviceId) -> StoreResult<Option<Device>> {
        Ok(
            sqlx::query_as::<_, Device>("SELECT id, location FROM devices WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn find_slot_attendance(&self, slot: &ShiftSlot) -> StoreResult<Vec<Attendance>> {
        let sql = format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM attendance \
             WHERE user_id = ? AND date = ? AND shift = ? ORDER BY id"
        );
        sqlx::query_as::<_, AttendanceRow>(&sql)
            .bind(slot.user_id)
            .bind(slot.date)
            .bind(slot.shift.as_str())
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Attendance::try_from)
            .collect()
    }

    async fn insert_attendance(&self, new: NewAttendance) -> StoreResult<Attendance> {
        let result = sqlx::query(
            "INSERT INTO attendance (user_id, date, shift, location, time_in, on_time) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(new.user_id)
        .bind(new.date)
        .bind(new.shift.as_str())
        .bind(&new.location)
        .bind(new.time_in)
        .bind(new.on_time)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict(format!(
                    "attendance for user {} on {} ({}) at '{}' already exists",
                    new.user_id, new.date, new.shift, new.location
                ))
            } else {
                StoreError::Database(e)
            }
        })?;

        Ok(Attendance {
            id: result.last_insert_id(),
            user_id: new.user_id,
            date: new.date,
            shift: new.shift,
            location: new.location,
            time_in: new.time_in,
            time_out: None,
            on_time: new.on_time,
        })
    }

    async fn close_attendance(
        &self,
        id: AttendanceId,
        time_out: NaiveTime,
    ) -> StoreResult<Option<Attendance>> {
        let mut conn = self.pool.acquire().await?;
        let updated = sqlx::query(
            "UPDATE attendance SET time_out = ? WHERE id = ? AND time_out IS NULL",
        )
        .bind(time_out)
        .bind(id)
        .execute(&mut *conn)
        .await?
        .rows_affected();

        let record = load_attendance(&mut conn, id)
            .await?
            .ok_or_else(|| StoreError::not_found("attendance", id))?;
        Ok((updated > 0).then_some(record))
    }

    async fn reset_time_in(
        &self,
        id: AttendanceId,
        time_in: NaiveTime,
        on_time: bool,
    ) -> StoreResult<Option<Attendance>> {
        let mut conn = self.pool.acquire().await?;
        let updated = sqlx::query(
            "UPDATE attendance SET time_in = ?, on_time = ? WHERE id = ? AND time_out IS NULL",
        )
        .bind(time_in)
        .bind(on_time)
        .bind(id)
        .execute(&mut *conn)
        .await?
        .rows_affected();

        let record = load_attendance(&mut conn, id)
            .await?
            .ok_or_else(|| StoreError::not_found("attendance", id))?;
        Ok((updated > 0).then_some(record))
    }

    async fn filter_attendance(
        &self,
        filter: &AttendanceFilter,
        page: PageRequest,
    ) -> StoreResult<Paged<AttendanceResponse>> {
        let mut where_sql = String::from(" WHERE 1=1");
        let mut args: Vec<FilterValue> = Vec::new();

        if let Some(start) = filter.start_date {
            where_sql.push_str(" AND a.date >= ?");
            args.push(FilterValue::Date(start));
        }
        if let Some(end) = filter.end_date {
            where_sql.push_str(" AND a.date <= ?");
            args.push(FilterValue::Date(end));
        }
        if let Some(shift) = filter.shift {
            where_sql.push_str(" AND a.shift = ?");
            args.push(FilterValue::Str(shift.as_str().to_string()));
        }
        if let Some(username) = &filter.username {
            where_sql.push_str(" AND LOWER(u.username) LIKE LOWER(?) ESCAPE '!'");
            args.push(FilterValue::Str(contains_pattern(username)));
        }
        if let Some(location) = &filter.location {
            where_sql.push_str(" AND a.location LIKE ? ESCAPE '!'");
            args.push(FilterValue::Str(contains_pattern(location)));
        }

        let count_sql = format!(
            "SELECT COUNT(*) FROM attendance a JOIN users u ON u.id = a.user_id{where_sql}"
        );
        let mut count_q = sqlx::query_scalar::<_, i64>(&count_sql);
        for arg in &args {
            count_q = match arg {
                FilterValue::Date(d) => count_q.bind(*d),
                FilterValue::Str(s) => count_q.bind(s.as_str()),
            };
        }
        let total = count_q.fetch_one(&self.pool).await?;

        let data_sql = format!(
            r#"
            SELECT a.id, u.rfid_code, u.full_name, u.username, a.date, a.shift,
                   a.location, a.time_in, a.time_out, a.on_time
            FROM attendance a
            JOIN users u ON u.id = a.user_id
            {where_sql}
            ORDER BY a.date DESC, a.id ASC
            LIMIT ? OFFSET ?
            "#
        );
        let mut data_q = sqlx::query_as::<_, AttendanceResponseRow>(&data_sql);
        for arg in &args {
            data_q = match arg {
                FilterValue::Date(d) => data_q.bind(*d),
                FilterValue::Str(s) => data_q.bind(s.as_str()),
            };
        }
        let rows = data_q
            .bind(page.size as i64)
            .bind(page.offset() as i64)
            .fetch_all(&self.pool)
            .await?;

        let data = rows
            .into_iter()
            .map(AttendanceResponse::try_from)
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(Paged {
            data,
            page: page.page,
            size: page.size,
            total: total.max(0) as u64,
        })
    }

    fn backend_name(&self) -> &'static str {
        "mysql"
    }

    fn is_shared(&self) -> bool {
        true
    }
}
