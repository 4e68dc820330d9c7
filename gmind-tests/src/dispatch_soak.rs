//! Harness for the command dispatcher: schedules a mix of fresh,
//! stale, and future commands against an in-memory store and a
//! device fake that fails intermittently, then steps simulated
//! cycles and checks the at-least-once / staleness policies hold

use chrono::{Local, TimeDelta};
use gmind_model::{Device, DeviceAction, FieldId, GreenhouseId};
use gmind_sched::{
    CommandDispatcher, CommandStore, DeviceClient, DeviceControlError, DispatcherConfig,
    InMemoryCommandStore, ScheduleService, StaticCatalog,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::time::Duration;

/// Fails every third call, so retries across cycles eventually win
#[derive(Default)]
struct FlakyDevice {
    calls: AtomicUsize,
}

#[async_trait::async_trait]
impl DeviceClient for FlakyDevice {
    async fn control(
        &self,
        greenhouse: &GreenhouseId,
        field: FieldId,
        device: Device,
        action: DeviceAction,
    ) -> Result<(), DeviceControlError> {
        let n = self.calls.fetch_add(1, Ordering::Relaxed);
        if n % 3 == 2 {
            log::debug!("dropping control {device} {action} for {greenhouse}/{field}");
            return Err(DeviceControlError::Rejected("simulated outage".to_string()));
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let store = Arc::new(InMemoryCommandStore::new());
    let catalog = Arc::new(
        StaticCatalog::new()
            .with_greenhouse("g1".to_string(), 2)
            .with_greenhouse("g2".to_string(), 1),
    );
    let service = ScheduleService::new(catalog, store.clone());
    let device = FlakyDevice::default();

    let config = DispatcherConfig {
        poll_period: Duration::from_secs(60),
        staleness: TimeDelta::minutes(20),
        control_timeout: Duration::from_secs(1),
    };

    let t0 = Local::now().naive_local();

    // one already stale, several fresh, one not yet due
    let stale = service
        .schedule(
            "g1".to_string(),
            0,
            Device::Led,
            DeviceAction::Off,
            t0 - TimeDelta::minutes(25),
        )
        .await?;
    for field in 0..2 {
        service
            .schedule(
                "g1".to_string(),
                field,
                Device::Pump,
                DeviceAction::On,
                t0 - TimeDelta::minutes(field as i64 + 1),
            )
            .await?;
    }
    let future = service
        .schedule(
            "g2".to_string(),
            0,
            Device::Fan,
            DeviceAction::On,
            t0 + TimeDelta::minutes(3),
        )
        .await?;

    // a bad target never makes it into the store
    if service
        .schedule(
            "greenhouse-nowhere".to_string(),
            0,
            Device::Fan,
            DeviceAction::On,
            t0,
        )
        .await
        .is_ok()
    {
        return Err("scheduling against an unknown greenhouse succeeded".into());
    }

    // step five simulated one-minute cycles
    for minute in 0..5 {
        let now = t0 + TimeDelta::minutes(minute);
        let report = CommandDispatcher::run_cycle(&*store, &device, &config, now).await;
        log::info!(
            "cycle at t0+{minute}m: {} executed, {} expired, {} failed",
            report.executed,
            report.expired,
            report.failed
        );
    }

    let end = t0 + TimeDelta::minutes(5);
    let pending = store.due_unexecuted(end).await?;
    log::info!("pending after soak: {pending:?}");

    // everything fresh should have executed by now despite the
    // flaky device; only the stale command may remain pending, and
    // the future one only if its time has not yet arrived
    for command in &pending {
        if command.id != stale.id && command.id != future.id {
            return Err(format!("command {} never executed", command.id).into());
        }
    }

    log::info!("dispatch soak complete");
    Ok(())
}
