//! Action dispatch.
//!
//! The OS-level effect of an action is an opaque capability behind
//! [`ActionDispatcher`]. [`RateLimitedDispatcher`] wraps any dispatcher
//! and owns the cooldown between performed actions.

use crate::core::decision::Trigger;
use crate::registry::GestureAction;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::process::Command;
use std::time::{Duration, Instant};

/// Something that can perform a named device-control action.
pub trait ActionDispatcher: Send {
    /// Perform `action`. Returns whether it was carried out.
    fn perform(&mut self, action: GestureAction) -> bool;
}

impl ActionDispatcher for Box<dyn ActionDispatcher> {
    fn perform(&mut self, action: GestureAction) -> bool {
        (**self).perform(action)
    }
}

/// Logs and records every action without side effects.
#[derive(Debug, Default, Clone)]
pub struct LogDispatcher {
    performed: Vec<(GestureAction, DateTime<Utc>)>,
}

impl LogDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Actions performed so far, oldest first.
    pub fn performed(&self) -> Vec<GestureAction> {
        self.performed.iter().map(|(a, _)| *a).collect()
    }

    pub fn history(&self) -> &[(GestureAction, DateTime<Utc>)] {
        &self.performed
    }
}

impl ActionDispatcher for LogDispatcher {
    fn perform(&mut self, action: GestureAction) -> bool {
        tracing::info!(action = %action, "Performing action");
        self.performed.push((action, Utc::now()));
        true
    }
}

/// Runs a configured command line for each action.
#[derive(Debug, Clone, Default)]
pub struct CommandDispatcher {
    commands: BTreeMap<GestureAction, Vec<String>>,
}

impl CommandDispatcher {
    pub fn new(commands: BTreeMap<GestureAction, Vec<String>>) -> Self {
        Self { commands }
    }

    pub fn has_command(&self, action: GestureAction) -> bool {
        self.commands
            .get(&action)
            .map(|argv| !argv.is_empty())
            .unwrap_or(false)
    }
}

impl ActionDispatcher for CommandDispatcher {
    fn perform(&mut self, action: GestureAction) -> bool {
        let Some((program, args)) = self.commands.get(&action).and_then(|argv| argv.split_first())
        else {
            tracing::debug!(action = %action, "No command configured for action");
            return false;
        };

        match Command::new(program).args(args).status() {
            Ok(status) if status.success() => {
                tracing::info!(action = %action, program = %program, "Performed action");
                true
            }
            Ok(status) => {
                tracing::warn!(
                    action = %action,
                    program = %program,
                    %status,
                    "Action command failed"
                );
                false
            }
            Err(e) => {
                tracing::warn!(
                    action = %action,
                    program = %program,
                    error = %e,
                    "Could not run action command"
                );
                false
            }
        }
    }
}

/// Dispatcher for a configured action table: commands when any are
/// configured, logging otherwise or on a dry run.
pub fn dispatcher_for(
    actions: &BTreeMap<GestureAction, Vec<String>>,
    dry_run: bool,
) -> Box<dyn ActionDispatcher> {
    if dry_run || actions.is_empty() {
        Box::new(LogDispatcher::new())
    } else {
        Box::new(CommandDispatcher::new(actions.clone()))
    }
}

/// What happened to a trigger handed to the rate limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Performed(GestureAction),
    /// Suppressed; the previous action is still within its cooldown
    CoolingDown { remaining: Duration },
    /// The dispatcher declined or failed; the cooldown was not started
    Failed(GestureAction),
}

/// Enforces at most one performed action per cooldown window.
#[derive(Debug)]
pub struct RateLimitedDispatcher<D> {
    inner: D,
    last_action_at: Option<Instant>,
}

impl<D: ActionDispatcher> RateLimitedDispatcher<D> {
    pub fn new(inner: D) -> Self {
        Self {
            inner,
            last_action_at: None,
        }
    }

    /// Perform the trigger's action unless the last performed action is
    /// still within the trigger's cooldown.
    pub fn dispatch(&mut self, trigger: &Trigger, now: Instant) -> DispatchOutcome {
        if let Some(last) = self.last_action_at {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < trigger.cooldown {
                return DispatchOutcome::CoolingDown {
                    remaining: trigger.cooldown - elapsed,
                };
            }
        }

        if self.inner.perform(trigger.action) {
            self.last_action_at = Some(now);
            DispatchOutcome::Performed(trigger.action)
        } else {
            DispatchOutcome::Failed(trigger.action)
        }
    }

    pub fn last_action_at(&self) -> Option<Instant> {
        self.last_action_at
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut D {
        &mut self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trigger(action: GestureAction) -> Trigger {
        Trigger {
            label: "fist".into(),
            action,
            cooldown: Duration::from_millis(1500),
        }
    }

    struct Refusing;

    impl ActionDispatcher for Refusing {
        fn perform(&mut self, _action: GestureAction) -> bool {
            false
        }
    }

    #[test]
    fn test_cooldown_suppresses_repeats() {
        let mut dispatcher = RateLimitedDispatcher::new(LogDispatcher::new());
        let t0 = Instant::now();
        let t = trigger(GestureAction::Mute);

        assert_eq!(dispatcher.dispatch(&t, t0), DispatchOutcome::Performed(GestureAction::Mute));
        assert_eq!(
            dispatcher.dispatch(&t, t0 + Duration::from_millis(500)),
            DispatchOutcome::CoolingDown {
                remaining: Duration::from_millis(1000)
            }
        );
        assert_eq!(
            dispatcher.dispatch(&t, t0 + Duration::from_millis(1500)),
            DispatchOutcome::Performed(GestureAction::Mute)
        );
        assert_eq!(dispatcher.inner().performed(), vec![GestureAction::Mute; 2]);
    }

    #[test]
    fn test_cooldown_spans_actions() {
        let mut dispatcher = RateLimitedDispatcher::new(LogDispatcher::new());
        let t0 = Instant::now();
        dispatcher.dispatch(&trigger(GestureAction::Mute), t0);
        let outcome = dispatcher.dispatch(
            &trigger(GestureAction::NextSlide),
            t0 + Duration::from_millis(10),
        );
        assert!(matches!(outcome, DispatchOutcome::CoolingDown { .. }));
    }

    #[test]
    fn test_failure_does_not_start_cooldown() {
        let mut dispatcher = RateLimitedDispatcher::new(Refusing);
        let outcome = dispatcher.dispatch(&trigger(GestureAction::Mute), Instant::now());
        assert_eq!(outcome, DispatchOutcome::Failed(GestureAction::Mute));
        assert!(dispatcher.last_action_at().is_none());
    }

    #[test]
    fn test_unconfigured_command_declines() {
        let mut dispatcher = CommandDispatcher::new(BTreeMap::new());
        assert!(!dispatcher.has_command(GestureAction::LockScreen));
        assert!(!dispatcher.perform(GestureAction::LockScreen));
    }

    #[cfg(unix)]
    #[test]
    fn test_dispatcher_for_prefers_configured_commands() {
        let mut commands = BTreeMap::new();
        commands.insert(GestureAction::Mute, vec!["false".to_string()]);

        assert!(!dispatcher_for(&commands, false).perform(GestureAction::Mute));
        assert!(dispatcher_for(&commands, true).perform(GestureAction::Mute));
        assert!(dispatcher_for(&BTreeMap::new(), false).perform(GestureAction::Mute));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_exit_status() {
        let mut commands = BTreeMap::new();
        commands.insert(GestureAction::Mute, vec!["true".to_string()]);
        commands.insert(GestureAction::PlayPause, vec!["false".to_string()]);
        let mut dispatcher = CommandDispatcher::new(commands);

        assert!(dispatcher.perform(GestureAction::Mute));
        assert!(!dispatcher.perform(GestureAction::PlayPause));
    }
}
