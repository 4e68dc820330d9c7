use chrono::{NaiveDateTime, TimeDelta};
use diesel::deserialize::FromSql;
use diesel::serialize::ToSql;
use diesel::{deserialize::FromSqlRow, expression::AsExpression, prelude::*};

use diesel::{
    backend::Backend,
    deserialize, serialize,
    sql_types::Text,
    sqlite::Sqlite,
};
use serde::Serialize;

use gmind_model::{Device as DeviceKind, DeviceAction as ActionKind, FieldId, GreenhouseId};

/// Column wrapper so the shared [`DeviceKind`] vocabulary can live in
/// `gmind-model` without that crate depending on diesel. Stored as
/// the control service's lowercase text form
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
#[serde(transparent)]
pub struct Device(pub DeviceKind);

impl FromSql<Text, Sqlite> for Device {
    fn from_sql(bytes: <Sqlite as Backend>::RawValue<'_>) -> deserialize::Result<Self> {
        let text = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
        text.parse::<DeviceKind>()
            .map(Device)
            .map_err(|e| e.to_string().into())
    }
}

impl ToSql<Text, Sqlite> for Device {
    fn to_sql<'b>(&'b self, out: &mut serialize::Output<'b, '_, Sqlite>) -> serialize::Result {
        out.set_value(self.0.as_str().to_string());
        Ok(serialize::IsNull::No)
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
#[serde(transparent)]
pub struct Action(pub ActionKind);

impl FromSql<Text, Sqlite> for Action {
    fn from_sql(bytes: <Sqlite as Backend>::RawValue<'_>) -> deserialize::Result<Self> {
        let text = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
        text.parse::<ActionKind>()
            .map(Action)
            .map_err(|e| e.to_string().into())
    }
}

impl ToSql<Text, Sqlite> for Action {
    fn to_sql<'b>(&'b self, out: &mut serialize::Output<'b, '_, Sqlite>) -> serialize::Result {
        out.set_value(self.0.as_str().to_string());
        Ok(serialize::IsNull::No)
    }
}

/// [`ScheduledCommand`] is the persistent record of a future device
/// action. The dispatcher is the only mutator: it flips `executed`
/// after a successful control call. Records are never deleted; they
/// stay behind as the audit trail of what was driven when
#[derive(Debug, Clone, PartialEq, Serialize, Queryable, QueryableByName, Selectable)]
#[diesel(table_name = crate::schema::scheduled_commands)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ScheduledCommand {
    pub id: i32,
    pub greenhouse_id: GreenhouseId,
    pub field_index: FieldId,
    pub device: Device,
    pub action: Action,
    pub scheduled_time: NaiveDateTime,
    pub executed: bool,
}

impl ScheduledCommand {
    pub fn device_kind(&self) -> DeviceKind {
        self.device.0
    }

    pub fn action_kind(&self) -> ActionKind {
        self.action.0
    }

    /// Time elapsed past the scheduled moment; negative when the
    /// command is not yet due
    pub fn age(&self, now: NaiveDateTime) -> TimeDelta {
        now - self.scheduled_time
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::scheduled_commands)]
pub struct NewScheduledCommand {
    pub greenhouse_id: GreenhouseId,
    pub field_index: FieldId,
    pub device: Device,
    pub action: Action,
    pub scheduled_time: NaiveDateTime,
    pub executed: bool,
}

impl NewScheduledCommand {
    pub fn new(
        greenhouse_id: GreenhouseId,
        field_index: FieldId,
        device: DeviceKind,
        action: ActionKind,
        scheduled_time: NaiveDateTime,
    ) -> Self {
        Self {
            greenhouse_id,
            field_index,
            device: Device(device),
            action: Action(action),
            scheduled_time,
            executed: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn age_is_relative_to_now() {
        let cmd = ScheduledCommand {
            id: 1,
            greenhouse_id: "g1".to_string(),
            field_index: 0,
            device: Device(DeviceKind::Pump),
            action: Action(ActionKind::On),
            scheduled_time: at(12, 0),
            executed: false,
        };
        assert_eq!(cmd.age(at(12, 25)), TimeDelta::minutes(25));
        assert_eq!(cmd.age(at(11, 55)), TimeDelta::minutes(-5));
    }
}
