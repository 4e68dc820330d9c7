use chrono::{Local, NaiveDateTime, TimeDelta};
use std::sync::Arc;
use tokio::time::{Duration, MissedTickBehavior};

use crate::{control::DeviceClient, models::ScheduledCommand, store::CommandStore};

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Fixed polling period between cycles
    pub poll_period: Duration,
    /// Commands older than this past their scheduled time are
    /// abandoned instead of executed
    pub staleness: TimeDelta,
    /// Bound on each individual device-control call
    pub control_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_period: Duration::from_secs(60),
            staleness: TimeDelta::minutes(20),
            control_timeout: Duration::from_secs(10),
        }
    }
}

/// Per-cycle outcome counts, logged by the dispatch loop. Failures
/// are already contained per command by the time they land here
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub executed: usize,
    pub expired: usize,
    pub failed: usize,
}

impl CycleReport {
    pub fn attempted(&self) -> usize {
        self.executed + self.expired + self.failed
    }
}

enum CommandOutcome {
    Executed,
    Expired,
    Failed,
}

/// [`CommandDispatcher`] runs the recurring dispatch task: each
/// cycle reads the due pending commands and drives each one to
/// executed, expired, or left-pending-for-retry. One cycle at a
/// time; a cycle that overruns the period makes the loop skip the
/// missed tick rather than queue it.
///
/// Per-command failures (device call errors, timeouts, persistence
/// errors while flipping `executed`) are logged and absorbed so one
/// bad command never prevents processing of its siblings, and the
/// task itself never dies from them.
pub struct CommandDispatcher {
    cycle_handle: Option<tokio::task::JoinHandle<()>>,
}

impl CommandDispatcher {
    pub fn start(
        store: Arc<dyn CommandStore>,
        device: Arc<dyn DeviceClient>,
        config: DispatcherConfig,
    ) -> Self {
        let handle = tokio::spawn(async move {
            log::info!(
                "starting command dispatcher, polling every {:?}",
                config.poll_period
            );

            let mut tick = tokio::time::interval(config.poll_period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tick.tick().await;

                let now = Local::now().naive_local();
                let report = Self::run_cycle(&*store, &*device, &config, now).await;
                if report.attempted() > 0 {
                    log::info!(
                        "dispatch cycle: {} executed, {} expired, {} failed",
                        report.executed,
                        report.expired,
                        report.failed
                    );
                }
            }
        });

        Self {
            cycle_handle: Some(handle),
        }
    }

    /// One full dispatch cycle against the provided clock. Never
    /// errors: a store read failure just yields an empty cycle
    pub async fn run_cycle(
        store: &dyn CommandStore,
        device: &dyn DeviceClient,
        config: &DispatcherConfig,
        now: NaiveDateTime,
    ) -> CycleReport {
        let due = match store.due_unexecuted(now).await {
            Ok(due) => due,
            Err(e) => {
                log::error!("failed to read due commands: {e:}");
                return CycleReport::default();
            }
        };

        let mut report = CycleReport::default();
        for command in due {
            match Self::execute_one(store, device, config, &command, now).await {
                CommandOutcome::Executed => report.executed += 1,
                CommandOutcome::Expired => report.expired += 1,
                CommandOutcome::Failed => report.failed += 1,
            }
        }
        report
    }

    async fn execute_one(
        store: &dyn CommandStore,
        device: &dyn DeviceClient,
        config: &DispatcherConfig,
        command: &ScheduledCommand,
        now: NaiveDateTime,
    ) -> CommandOutcome {
        let age = command.age(now);
        if age > config.staleness {
            // Left pending on purpose: the record keeps its audit
            // value and every later cycle re-checks age and skips
            log::warn!(
                "command {} for greenhouse {} is {} min past due, skipping",
                command.id,
                command.greenhouse_id,
                age.num_minutes()
            );
            return CommandOutcome::Expired;
        }

        let call = device.control(
            &command.greenhouse_id,
            command.field_index,
            command.device_kind(),
            command.action_kind(),
        );

        match tokio::time::timeout(config.control_timeout, call).await {
            Ok(Ok(())) => match store.mark_executed(command.id).await {
                Ok(true) => {
                    log::info!(
                        "executed command {}: {} {} on greenhouse {} field {}",
                        command.id,
                        command.device_kind(),
                        command.action_kind(),
                        command.greenhouse_id,
                        command.field_index
                    );
                    CommandOutcome::Executed
                }
                Ok(false) => {
                    log::warn!("command {} was already marked executed", command.id);
                    CommandOutcome::Executed
                }
                Err(e) => {
                    log::error!(
                        "executed command {} but could not persist the flag, \
                        will retry: {e:}",
                        command.id
                    );
                    CommandOutcome::Failed
                }
            },
            Ok(Err(e)) => {
                log::error!(
                    "device control failed for command {}: {e:}, leaving pending",
                    command.id
                );
                CommandOutcome::Failed
            }
            Err(_) => {
                log::error!(
                    "device control timed out for command {}, leaving pending",
                    command.id
                );
                CommandOutcome::Failed
            }
        }
    }
}

impl Drop for CommandDispatcher {
    fn drop(&mut self) {
        if let Some(cycle) = &self.cycle_handle {
            cycle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::DeviceControlError;
    use crate::models::NewScheduledCommand;
    use crate::store::InMemoryCommandStore;
    use chrono::NaiveDate;
    use gmind_model::{Device, DeviceAction, FieldId, GreenhouseId};
    use std::sync::Mutex;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn test_config() -> DispatcherConfig {
        DispatcherConfig {
            poll_period: Duration::from_secs(60),
            staleness: TimeDelta::minutes(20),
            control_timeout: Duration::from_millis(100),
        }
    }

    fn pump_on(greenhouse: &str, when: NaiveDateTime) -> NewScheduledCommand {
        NewScheduledCommand::new(
            greenhouse.to_string(),
            0,
            Device::Pump,
            DeviceAction::On,
            when,
        )
    }

    /// Device that records calls and fails for configured
    /// greenhouses
    #[derive(Default)]
    struct ScriptedDevice {
        failing: Vec<GreenhouseId>,
        calls: Mutex<Vec<(GreenhouseId, FieldId, Device, DeviceAction)>>,
    }

    impl ScriptedDevice {
        fn failing(greenhouses: &[&str]) -> Self {
            Self {
                failing: greenhouses.iter().map(|g| g.to_string()).collect(),
                calls: Mutex::new(vec![]),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait::async_trait]
    impl DeviceClient for ScriptedDevice {
        async fn control(
            &self,
            greenhouse: &GreenhouseId,
            field: FieldId,
            device: Device,
            action: DeviceAction,
        ) -> Result<(), DeviceControlError> {
            self.calls
                .lock()
                .unwrap()
                .push((greenhouse.clone(), field, device, action));
            if self.failing.contains(greenhouse) {
                return Err(DeviceControlError::Rejected("device offline".to_string()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn stale_command_is_skipped_and_stays_pending() {
        let store = InMemoryCommandStore::new();
        let device = ScriptedDevice::default();
        // 25 minutes past due, over the 20 minute threshold
        let cmd = store.create(pump_on("g1", at(12, 0))).await.unwrap();

        let report =
            CommandDispatcher::run_cycle(&store, &device, &test_config(), at(12, 25)).await;
        assert_eq!(report.expired, 1);
        assert_eq!(device.call_count(), 0);

        let due = store.due_unexecuted(at(12, 25)).await.unwrap();
        assert_eq!(due, vec![cmd]);

        // later cycles keep skipping it
        let report =
            CommandDispatcher::run_cycle(&store, &device, &test_config(), at(12, 30)).await;
        assert_eq!(report.expired, 1);
        assert_eq!(device.call_count(), 0);
    }

    #[tokio::test]
    async fn fresh_command_executes_and_is_not_reinvoked() {
        let store = InMemoryCommandStore::new();
        let device = ScriptedDevice::default();
        // 5 minutes past due, well within the threshold
        store.create(pump_on("g2", at(12, 0))).await.unwrap();

        let report =
            CommandDispatcher::run_cycle(&store, &device, &test_config(), at(12, 5)).await;
        assert_eq!(report.executed, 1);
        assert_eq!(device.call_count(), 1);

        // second cycle a minute later sees nothing due
        let report =
            CommandDispatcher::run_cycle(&store, &device, &test_config(), at(12, 6)).await;
        assert_eq!(report.attempted(), 0);
        assert_eq!(device.call_count(), 1);
    }

    #[tokio::test]
    async fn failed_control_call_is_retried_next_cycle() {
        let store = InMemoryCommandStore::new();
        let device = ScriptedDevice::failing(&["g1"]);
        store.create(pump_on("g1", at(12, 0))).await.unwrap();

        let report =
            CommandDispatcher::run_cycle(&store, &device, &test_config(), at(12, 1)).await;
        assert_eq!(report.failed, 1);

        // still pending, so the next cycle re-attempts it
        let report =
            CommandDispatcher::run_cycle(&store, &device, &test_config(), at(12, 2)).await;
        assert_eq!(report.failed, 1);
        assert_eq!(device.call_count(), 2);
    }

    #[tokio::test]
    async fn one_failing_command_does_not_block_the_batch() {
        let store = InMemoryCommandStore::new();
        let device = ScriptedDevice::failing(&["bad"]);
        store.create(pump_on("bad", at(12, 0))).await.unwrap();
        let good = store.create(pump_on("good", at(12, 0))).await.unwrap();

        let report =
            CommandDispatcher::run_cycle(&store, &device, &test_config(), at(12, 1)).await;
        assert_eq!(report.failed, 1);
        assert_eq!(report.executed, 1);

        let due = store.due_unexecuted(at(12, 1)).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_ne!(due[0].id, good.id);
    }

    #[tokio::test]
    async fn hung_device_is_bounded_by_the_control_timeout() {
        struct HungDevice;

        #[async_trait::async_trait]
        impl DeviceClient for HungDevice {
            async fn control(
                &self,
                _greenhouse: &GreenhouseId,
                _field: FieldId,
                _device: Device,
                _action: DeviceAction,
            ) -> Result<(), DeviceControlError> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
        }

        let store = InMemoryCommandStore::new();
        store.create(pump_on("g1", at(12, 0))).await.unwrap();

        let report =
            CommandDispatcher::run_cycle(&store, &HungDevice, &test_config(), at(12, 1)).await;
        assert_eq!(report.failed, 1);

        // command stays pending for the next cycle
        assert_eq!(store.due_unexecuted(at(12, 2)).await.unwrap().len(), 1);
    }
}
