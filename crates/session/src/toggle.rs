#![forbid(unsafe_code)]

use metrics::counter;
use tideline_api::{FeedError, FeedResult};
use tideline_core::{ActionKind, ControlId, TargetId};
use tracing::{debug, info, warn};

use crate::lock::Gesture;
use crate::model::{SessionEvent, SessionMsg};
use crate::ViewSession;

/// Presentation state of one toggle control. Written only by the
/// coordinator; `seq` tags in-flight mutations so a stale completion is
/// discarded instead of applied.
pub(crate) struct ToggleEntry {
    pub kind: ActionKind,
    pub target: TargetId,
    pub state: bool,
    pub pending: bool,
    pub seq: u64,
}

impl ViewSession {
    pub(crate) fn on_register_toggle(
        &mut self,
        control: ControlId,
        kind: ActionKind,
        target: TargetId,
        state: bool,
    ) {
        debug!(%control, kind = ?kind, target, state, "toggle: registered");
        self.toggles.insert(control, ToggleEntry { kind, target, state, pending: false, seq: 0 });
    }

    /// One optimistic state transition. Rapid re-triggers while the lock is
    /// held are dropped, not queued.
    pub(crate) fn on_toggle_clicked(&mut self, control: ControlId) {
        let (kind, target, old_state) = match self.toggles.get(&control) {
            Some(e) => (e.kind, e.target, e.state),
            None => {
                warn!(%control, "toggle: unknown control");
                return;
            }
        };
        if self.locks.held(&control, Gesture::Click) {
            debug!(%control, "toggle: re-entrant click dropped");
            counter!("toggle_clicks_dropped_total", 1u64);
            return;
        }
        // at most one pending mutation per (kind, target), across controls
        if self.pending_actions.contains(&(kind, target)) {
            debug!(kind = ?kind, target, "toggle: action already pending, dropped");
            counter!("toggle_clicks_dropped_total", 1u64);
            return;
        }

        let new_state = !old_state;
        self.locks.acquire(&control, Gesture::Click);
        self.pending_actions.insert((kind, target));
        let seq = match self.toggles.get_mut(&control) {
            Some(e) => {
                e.state = new_state;
                e.pending = true;
                e.seq += 1;
                e.seq
            }
            None => return,
        };
        // optimistic: flip presentation before the request is even built
        self.presenter.apply_visual_state(&control, kind, new_state);
        info!(kind = ?kind, target, new_state, "toggle: mutation start");

        let api = self.api.clone();
        let tx = self.tx.clone();
        let timeout = self.cfg.mutate_timeout;
        tokio::spawn(async move {
            let result = match tokio::time::timeout(timeout, api.mutate(kind, target, new_state))
                .await
            {
                Ok(r) => r,
                // a timeout is an ordinary failure, same rollback path
                Err(_) => Err(FeedError::Timeout),
            };
            let _ = tx.send(SessionMsg::MutationDone {
                control,
                seq,
                kind,
                target,
                old_state,
                new_state,
                result,
            });
        });
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn on_mutation_done(
        &mut self,
        control: ControlId,
        seq: u64,
        kind: ActionKind,
        target: TargetId,
        old_state: bool,
        new_state: bool,
        result: FeedResult<()>,
    ) {
        let release = SessionMsg::ReleaseLock { control: control.clone(), gesture: Gesture::Click };
        let entry = match self.toggles.get_mut(&control) {
            Some(e) => e,
            None => {
                // control unregistered while the request was in flight
                debug!(%control, "toggle: completion for unregistered control");
                self.pending_actions.remove(&(kind, target));
                let _ = self.tx.send(release);
                return;
            }
        };
        if entry.seq != seq {
            debug!(%control, seq, current = entry.seq, "toggle: stale completion discarded");
            return;
        }
        entry.pending = false;
        self.pending_actions.remove(&(kind, target));
        // release on the next tick so a click queued this turn stays dropped
        let _ = self.tx.send(release);

        match result {
            Ok(()) => {
                info!(kind = ?kind, target, new_state, "toggle: mutation ok");
                counter!("toggle_mutations_total", 1u64);
                debug!(event = kind.event_name(), new_state, "toggle: state-change emitted");
                let _ = self.events.send(SessionEvent::StateChange { kind, target, state: new_state });
                if kind == ActionKind::Block && new_state {
                    self.cascade_block(target);
                }
            }
            Err(err) => {
                warn!(kind = ?kind, target, error = %err, "toggle: mutation failed, reverting");
                entry.state = old_state;
                self.presenter.apply_visual_state(&control, kind, old_state);
                match err {
                    FeedError::OverCapacity(message) => {
                        self.presenter.render_upgrade_prompt(&message, &self.cfg.upgrade_url);
                    }
                    _ => {
                        self.presenter.render_error(&kind.failure_phrase(new_state));
                    }
                }
            }
        }
    }

    /// Blocking a user implies no longer following them: reset every follow
    /// toggle for the same target once the block is confirmed.
    fn cascade_block(&mut self, target: TargetId) {
        for (control, entry) in self.toggles.iter_mut() {
            if entry.kind == ActionKind::Follow && entry.target == target && entry.state {
                debug!(%control, target, "toggle: follow reset by block");
                entry.state = false;
                self.presenter.apply_visual_state(control, ActionKind::Follow, false);
            }
        }
    }
}
