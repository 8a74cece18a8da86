use crate::state::LoopState;

/// Post-step bookkeeping. Apart from the step counter, running it twice is
/// the same as running it once.
pub fn reconcile(state: &mut LoopState) {
    state.step_count = state.step_count.saturating_add(1);
    state.evidence.canonicalize();
    state.pending_action = None;
}
