//! Call matching
//!
//! Pairs a caller with an idle operator. When several operators are idle the
//! choice is whichever the registry yields first; iteration order over the
//! registry is unspecified, so this is neither round-robin nor stable.

use std::sync::Arc;

use crate::channel::MessageChannel;
use crate::error::{BrokerError, Result};
use crate::session::{BrokerState, SessionRegistry};
use crate::types::CallId;

/// Result of trying to place a call
#[derive(Debug)]
pub enum MatchOutcome {
    /// Both parties are now ringing
    Matched {
        call_id: CallId,
        operator: String,
        operator_channel: Arc<dyn MessageChannel>,
    },
    /// No eligible operator; nothing was changed
    NoOperator {
        caller_channel: Arc<dyn MessageChannel>,
    },
}

/// Find an idle operator for `caller`.
///
/// With `preferred` set only that identity is considered; it must be registered.
pub fn select_operator<'a>(
    registry: &'a SessionRegistry,
    caller: &str,
    preferred: Option<&str>,
) -> Result<Option<&'a str>> {
    if let Some(target) = preferred {
        let session = registry.lookup(target)?;
        let eligible = session.is_idle_operator() && session.identity != caller;
        return Ok(eligible.then_some(session.identity.as_str()));
    }

    Ok(registry
        .iter()
        .find(|s| s.is_idle_operator() && s.identity != caller)
        .map(|s| s.identity.as_str()))
}

/// Match `caller` with an operator and bind both into a ringing call
pub fn place_call(
    state: &mut BrokerState,
    caller: &str,
    sdp_offer: String,
    preferred: Option<&str>,
) -> Result<MatchOutcome> {
    let caller_session = state.sessions.lookup(caller)?;
    if caller_session.is_busy() {
        return Err(BrokerError::invalid_state(format!(
            "{} is already in a call",
            caller
        )));
    }
    let caller_channel = caller_session.channel.clone();

    let operator = match select_operator(&state.sessions, caller, preferred)? {
        Some(operator) => operator.to_string(),
        None => return Ok(MatchOutcome::NoOperator { caller_channel }),
    };

    let call_id = CallId::new();
    let operator_session = state.sessions.lookup_mut(&operator)?;
    operator_session.bind_call(caller, call_id);
    let operator_channel = operator_session.channel.clone();

    let caller_session = state.sessions.lookup_mut(caller)?;
    caller_session.bind_call(&operator, call_id);
    caller_session.pending_sdp_offer = Some(sdp_offer);

    // Leftovers from an earlier call must not reach the new endpoints
    state.candidates.clear(caller);
    state.candidates.clear(&operator);

    Ok(MatchOutcome::Matched {
        call_id,
        operator,
        operator_channel,
    })
}
