use chrono::NaiveDateTime;
use std::sync::Arc;
use thiserror::Error;

use crate::{
    catalog::{CatalogError, GreenhouseCatalog},
    models::{NewScheduledCommand, ScheduledCommand},
    store::{CommandStore, CommandStoreError},
};
use gmind_model::{Device, DeviceAction, FieldId, GreenhouseId};

#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("scheduling target not found: greenhouse {greenhouse}, field {field:?}")]
    TargetNotFound {
        greenhouse: GreenhouseId,
        field: Option<FieldId>,
    },
    #[error("Catalog Error")]
    Catalog(#[from] CatalogError),
    #[error("Command store Error")]
    Store(#[from] CommandStoreError),
}

/// The scheduling request surface: validates the target against live
/// greenhouse/field state, then persists a pending command for the
/// dispatcher to pick up once due.
pub struct ScheduleService {
    catalog: Arc<dyn GreenhouseCatalog>,
    store: Arc<dyn CommandStore>,
}

impl ScheduleService {
    pub fn new(catalog: Arc<dyn GreenhouseCatalog>, store: Arc<dyn CommandStore>) -> Self {
        Self { catalog, store }
    }

    pub async fn schedule(
        &self,
        greenhouse: GreenhouseId,
        field: FieldId,
        device: Device,
        action: DeviceAction,
        scheduled_time: NaiveDateTime,
    ) -> Result<ScheduledCommand, ScheduleError> {
        if !self.catalog.greenhouse_exists(&greenhouse).await? {
            return Err(ScheduleError::TargetNotFound {
                greenhouse,
                field: None,
            });
        }
        if !self.catalog.field_exists(&greenhouse, field).await? {
            return Err(ScheduleError::TargetNotFound {
                greenhouse,
                field: Some(field),
            });
        }

        let command = self
            .store
            .create(NewScheduledCommand::new(
                greenhouse,
                field,
                device,
                action,
                scheduled_time,
            ))
            .await?;

        log::info!(
            "scheduled {} {} on greenhouse {} field {} for {}",
            command.device_kind(),
            command.action_kind(),
            command.greenhouse_id,
            command.field_index,
            command.scheduled_time
        );
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StaticCatalog;
    use crate::store::InMemoryCommandStore;
    use chrono::NaiveDate;

    fn service() -> (ScheduleService, Arc<InMemoryCommandStore>) {
        let store = Arc::new(InMemoryCommandStore::new());
        let catalog = Arc::new(StaticCatalog::new().with_greenhouse("g2".to_string(), 1));
        (
            ScheduleService::new(catalog, store.clone()),
            store,
        )
    }

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[tokio::test]
    async fn scheduling_a_valid_target_persists_pending() {
        let (service, store) = service();
        let command = service
            .schedule(
                "g2".to_string(),
                0,
                Device::Pump,
                DeviceAction::On,
                noon(),
            )
            .await
            .unwrap();
        assert!(!command.executed);

        let due = store.due_unexecuted(noon()).await.unwrap();
        assert_eq!(due, vec![command]);
    }

    #[tokio::test]
    async fn unknown_greenhouse_is_rejected() {
        let (service, store) = service();
        let res = service
            .schedule(
                "missing".to_string(),
                0,
                Device::Fan,
                DeviceAction::Off,
                noon(),
            )
            .await;
        assert!(matches!(
            res,
            Err(ScheduleError::TargetNotFound { field: None, .. })
        ));
        assert!(store.due_unexecuted(noon()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn out_of_range_field_is_rejected() {
        let (service, _store) = service();
        let res = service
            .schedule(
                "g2".to_string(),
                5,
                Device::Led,
                DeviceAction::On,
                noon(),
            )
            .await;
        assert!(matches!(
            res,
            Err(ScheduleError::TargetNotFound {
                field: Some(5),
                ..
            })
        ));
    }
}
